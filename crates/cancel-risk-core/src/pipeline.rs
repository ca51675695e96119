use crate::{
    codec::LookupError,
    config::{Config, MissingPolicy},
    context::ArtifactContext,
    dataset::Dataset,
    model::Classifier,
    schema::{LeadTimeRange, RiskOutcome, RiskPoint, RiskReport, RiskSeries, TimingsUs},
    util::now_us,
};

use anyhow::{anyhow, ensure, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    pub missing_policy: MissingPolicy,
    /// 闭区间截取；None = 整条序列
    pub lead_time_range: Option<LeadTimeRange>,
}

/// 数据集列 -> 模型特征顺序的下标映射
#[derive(Debug, Clone)]
pub struct FeatureLayout {
    idx: Vec<usize>,
}

impl FeatureLayout {
    pub fn resolve(columns: &[String], wanted: &[String]) -> Result<Self> {
        let idx = wanted
            .iter()
            .map(|name| {
                columns
                    .iter()
                    .position(|c| c == name)
                    .ok_or_else(|| anyhow!("feature `{name}` not found in dataset columns"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { idx })
    }

    #[inline]
    pub fn project(&self, features: &[f32]) -> Vec<f32> {
        self.idx.iter().map(|&i| features[i]).collect()
    }
}

/// 过滤酒店 -> 构造特征（可选均值填补）-> 批量推理 -> 按 lead_time 求均值 -> 可选截取。
///
/// 子集为空时返回 `RiskOutcome::NoData`，不做推理。
pub fn compute_risk_series(
    dataset: &Dataset,
    hotel_code: u32,
    classifier: &dyn Classifier,
    opts: &PipelineOptions,
) -> Result<RiskOutcome> {
    let t0 = Instant::now();
    let mut timings = TimingsUs::default();

    // filter
    let t_filter = Instant::now();
    let subset: Vec<_> = dataset.rows_for_hotel(hotel_code).collect();
    timings.filter = now_us(t_filter);
    metrics::histogram!("stage_filter_us").record(timings.filter as f64);

    if subset.is_empty() {
        tracing::warn!(hotel_code, "no bookings for selected hotel");
        metrics::counter!("pipeline_no_data_total").increment(1);
        return Ok(RiskOutcome::NoData { hotel_code });
    }

    // feature build（投影到模型列顺序 + 缺失处理）
    let t_feat = Instant::now();
    let layout = FeatureLayout::resolve(dataset.columns(), classifier.feature_names())?;
    let mut rows: Vec<Vec<f32>> = subset.iter().map(|r| layout.project(&r.features)).collect();
    if opts.missing_policy == MissingPolicy::SubsetMean {
        impute_subset_mean(&mut rows);
    }
    timings.feature = now_us(t_feat);
    metrics::histogram!("stage_feature_us").record(timings.feature as f64);

    // predict
    let t_pred = Instant::now();
    let risks = classifier.predict_proba_batch(&rows)?;
    ensure!(
        risks.len() == rows.len(),
        "classifier returned {} probabilities for {} rows",
        risks.len(),
        rows.len()
    );
    for (i, p) in risks.iter().enumerate() {
        ensure!(
            p.is_finite() && (0.0..=1.0).contains(p),
            "classifier returned probability {p} for row {i}, expected [0,1]"
        );
    }
    timings.predict = now_us(t_pred);
    metrics::histogram!("stage_predict_us").record(timings.predict as f64);

    // aggregate
    let t_agg = Instant::now();
    let lead_times: Vec<i64> = subset.iter().map(|r| r.lead_time).collect();
    let full = aggregate_by_lead_time(&lead_times, &risks);
    let bounds = full
        .bounds()
        .ok_or_else(|| anyhow!("non-empty subset produced an empty series"))?;
    let series = match opts.lead_time_range {
        Some(range) => full.restrict(range),
        None => full,
    };
    timings.aggregate = now_us(t_agg);
    metrics::histogram!("stage_aggregate_us").record(timings.aggregate as f64);

    metrics::histogram!("e2e_us").record(now_us(t0) as f64);
    tracing::debug!(
        hotel_code,
        rows = subset.len(),
        points = series.len(),
        ?bounds,
        range = ?opts.lead_time_range,
        "risk series computed"
    );

    Ok(RiskOutcome::Series(RiskReport {
        trace_id: Uuid::new_v4(),
        hotel_code,
        rows: subset.len(),
        bounds,
        range: opts.lead_time_range,
        series,
        timings_us: timings,
    }))
}

/// 每列 NaN 用该列在当前子集上的均值替换（均值本身跳过 NaN）；整列缺失则保持 NaN
fn impute_subset_mean(rows: &mut [Vec<f32>]) {
    let width = rows.first().map_or(0, Vec::len);
    for j in 0..width {
        let (sum, n) = rows
            .iter()
            .map(|r| r[j])
            .filter(|v| !v.is_nan())
            .fold((0f64, 0usize), |(s, n), v| (s + v as f64, n + 1));
        if n == 0 || n == rows.len() {
            continue;
        }
        let mean = (sum / n as f64) as f32;
        for r in rows.iter_mut() {
            if r[j].is_nan() {
                r[j] = mean;
            }
        }
    }
}

/// 精确按 lead_time 分组求均值，BTreeMap 保证升序
fn aggregate_by_lead_time(lead_times: &[i64], risks: &[f64]) -> RiskSeries {
    let mut groups: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
    for (&lt, &p) in lead_times.iter().zip(risks) {
        let g = groups.entry(lt).or_insert((0.0, 0));
        g.0 += p;
        g.1 += 1;
    }
    RiskSeries::from_sorted(
        groups
            .into_iter()
            .map(|(lead_time, (sum, n))| RiskPoint {
                lead_time,
                risk: sum / n as f64,
            })
            .collect(),
    )
}

/// 面向展示层的入口：持有只读工件和配置，每次交互完整重算。
#[derive(Debug, Clone)]
pub struct RiskCore {
    pub cfg: Config,
    ctx: Arc<ArtifactContext>,
}

impl RiskCore {
    pub fn new(cfg: Config, ctx: Arc<ArtifactContext>) -> Self {
        Self { cfg, ctx }
    }

    pub fn load(cfg: Config) -> Result<Self> {
        let ctx = Arc::new(ArtifactContext::load(&cfg)?);
        Ok(Self::new(cfg, ctx))
    }

    pub fn context(&self) -> &ArtifactContext {
        &self.ctx
    }

    pub fn hotel_labels(&self) -> &[String] {
        self.ctx.hotel_labels()
    }

    pub fn encode_hotel(&self, label: &str) -> Result<u32, LookupError> {
        self.ctx.hotel_codec().encode(label)
    }

    pub fn options(&self, range: Option<LeadTimeRange>) -> PipelineOptions {
        PipelineOptions {
            missing_policy: self.cfg.missing_policy,
            lead_time_range: range,
        }
    }

    /// 展示层用：先算整条序列（拿到 bounds），再按可能只给了一端的范围截取。
    /// 显式 min > max 以 `InvalidRange` 返回（可 downcast）
    pub fn risk_view(&self, label: &str, min: Option<i64>, max: Option<i64>) -> Result<RiskOutcome> {
        Ok(match self.risk_for_hotel(label, None)? {
            RiskOutcome::Series(r) => match LeadTimeRange::from_partial(r.bounds, min, max)? {
                Some(range) => RiskOutcome::Series(r.restricted(range)),
                None => RiskOutcome::Series(r),
            },
            no_data => no_data,
        })
    }

    /// label -> code -> 风险序列。未注册的 label 以 `LookupError` 返回（可 downcast）
    pub fn risk_for_hotel(&self, label: &str, range: Option<LeadTimeRange>) -> Result<RiskOutcome> {
        let code = self.encode_hotel(label)?;
        compute_risk_series(
            self.ctx.dataset(),
            code,
            self.ctx.classifier(),
            &self.options(range),
        )
    }
}
