use anyhow::Context;
use cancel_risk_core::{
    config::{Config, MissingPolicy},
    pipeline::RiskCore,
    schema::RiskOutcome,
};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Print predicted cancellation risk by lead time for one hotel")]
struct Args {
    /// 工件目录（模型 / 编码器 / 数据集）
    #[arg(long)]
    artifacts_dir: Option<PathBuf>,

    /// JSON 配置文件；命令行参数优先
    #[arg(long)]
    config: Option<PathBuf>,

    /// 酒店名称（编码器里的 label）；不传则取第一个
    #[arg(long)]
    hotel: Option<String>,

    #[arg(long)]
    min: Option<i64>,

    #[arg(long)]
    max: Option<i64>,

    /// subset_mean | passthrough
    #[arg(long)]
    missing_policy: Option<MissingPolicy>,

    /// 只列出可选酒店
    #[arg(long, default_value_t = false)]
    list: bool,

    /// 输出 JSON 而不是表格
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    // 日志走 stderr，stdout 留给结果
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(p) => Config::load(p)?,
        None => Config::default(),
    };
    if let Some(dir) = &args.artifacts_dir {
        cfg.artifacts_dir = dir.clone();
    }
    if let Some(policy) = args.missing_policy {
        cfg.missing_policy = policy;
    }

    let core = RiskCore::load(cfg)?;

    if args.list {
        for label in core.hotel_labels() {
            println!("{label}");
        }
        return Ok(());
    }

    let hotel = match &args.hotel {
        Some(h) => h.clone(),
        None => core
            .hotel_labels()
            .first()
            .cloned()
            .context("dataset has no hotels")?,
    };

    let outcome = core.risk_view(&hotel, args.min, args.max)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        RiskOutcome::NoData { .. } => {
            println!("No data found for the selected hotel.");
        }
        RiskOutcome::Series(r) => {
            println!(
                "hotel={hotel} rows={} lead_time=[{}, {}] policy={:?}",
                r.rows, r.bounds.min, r.bounds.max, core.cfg.missing_policy
            );
            if let Some(range) = r.range {
                println!("range=[{}, {}]", range.min, range.max);
            }
            println!("{:>10}  {:>10}", "lead_time", "risk");
            for p in r.series.points() {
                println!("{:>10}  {:>10.6}", p.lead_time, p.risk);
            }
        }
    }

    Ok(())
}
