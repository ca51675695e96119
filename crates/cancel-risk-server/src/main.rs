use axum::{routing::get, Router};
use cancel_risk_core::{
    config::{Config, MissingPolicy},
    pipeline::RiskCore,
};
use clap::Parser;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod render;

#[derive(Parser, Debug)]
#[command(author, version, about = "Hotel cancellation risk dashboard")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// 工件目录（覆盖配置文件）
    #[arg(long)]
    artifacts_dir: Option<PathBuf>,

    /// JSON 配置文件
    #[arg(long)]
    config: Option<PathBuf>,

    /// subset_mean | passthrough
    #[arg(long)]
    missing_policy: Option<MissingPolicy>,
}

#[derive(Clone)]
pub struct AppState {
    core: Arc<RiskCore>,
    prom: PrometheusHandle,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(api::index))
        .route("/api/hotels", get(api::hotels))
        .route("/api/risk", get(api::risk))
        .route("/chart.svg", get(api::chart))
        .route("/metrics", get(api::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(p) => Config::load(p)?,
        None => Config::default(),
    };
    if let Some(dir) = args.artifacts_dir {
        cfg.artifacts_dir = dir;
    }
    if let Some(policy) = args.missing_policy {
        cfg.missing_policy = policy;
    }

    // metrics recorder（进程内全局一次）
    let prom = PrometheusBuilder::new().install_recorder()?;

    // 工件不一致（编码器和数据对不上等）直接启动失败
    let core = Arc::new(RiskCore::load(cfg)?);
    tracing::info!(
        hotels = core.hotel_labels().len(),
        policy = ?core.cfg.missing_policy,
        "risk core ready"
    );

    let app = router(AppState { core, prom });

    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    tracing::info!("cancel-risk-server listening on http://{}", args.addr);
    axum::serve(listener, app).await?;

    Ok(())
}
