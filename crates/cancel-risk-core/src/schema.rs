// crates/cancel-risk-core/src/schema.rs
use anyhow::ensure;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid lead time range: min {min} > max {max}")]
pub struct InvalidRange {
    pub min: i64,
    pub max: i64,
}

/// 闭区间 [min, max]（天）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadTimeRange {
    pub min: i64,
    pub max: i64,
}

impl LeadTimeRange {
    pub fn new(min: i64, max: i64) -> Result<Self, InvalidRange> {
        if min > max {
            return Err(InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }

    /// 只给了一端时用 bounds 补另一端；两端都没给返回 None。
    /// 补出来的一端不会越过给定的一端，所以落在数据之外的单边范围得到空序列而不是错误；
    /// 只有调用方同时给出 min > max 才是 `InvalidRange`
    pub fn from_partial(
        bounds: LeadTimeRange,
        min: Option<i64>,
        max: Option<i64>,
    ) -> Result<Option<Self>, InvalidRange> {
        match (min, max) {
            (None, None) => Ok(None),
            (Some(lo), Some(hi)) => Self::new(lo, hi).map(Some),
            (Some(lo), None) => Ok(Some(Self { min: lo, max: bounds.max.max(lo) })),
            (None, Some(hi)) => Ok(Some(Self { min: bounds.min.min(hi), max: hi })),
        }
    }

    #[inline]
    pub fn contains(&self, lead_time: i64) -> bool {
        self.min <= lead_time && lead_time <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskPoint {
    pub lead_time: i64,
    /// 该 lead_time 下预测取消概率的均值
    pub risk: f64,
}

/// 按 lead_time 严格升序、无重复键的风险序列
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskSeries {
    points: Vec<RiskPoint>,
}

impl RiskSeries {
    pub fn new(points: Vec<RiskPoint>) -> anyhow::Result<Self> {
        ensure!(
            points.windows(2).all(|w| w[0].lead_time < w[1].lead_time),
            "risk series must be strictly ascending by lead_time"
        );
        Ok(Self { points })
    }

    /// 调用方保证已按 lead_time 严格升序（pipeline 里由 BTreeMap 保证）
    pub(crate) fn from_sorted(points: Vec<RiskPoint>) -> Self {
        debug_assert!(points.windows(2).all(|w| w[0].lead_time < w[1].lead_time));
        Self { points }
    }

    pub fn points(&self) -> &[RiskPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 观测到的 lead_time 范围（滑块默认值用）；空序列返回 None
    pub fn bounds(&self) -> Option<LeadTimeRange> {
        match (self.points.first(), self.points.last()) {
            (Some(a), Some(b)) => Some(LeadTimeRange {
                min: a.lead_time,
                max: b.lead_time,
            }),
            _ => None,
        }
    }

    /// 只保留落在 range 内的点；结果可以为空
    pub fn restrict(&self, range: LeadTimeRange) -> RiskSeries {
        Self {
            points: self
                .points
                .iter()
                .filter(|p| range.contains(p.lead_time))
                .copied()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TimingsUs {
    pub filter: u64,
    pub feature: u64,
    pub predict: u64,
    pub aggregate: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReport {
    pub trace_id: Uuid,
    pub hotel_code: u32,
    /// 该酒店参与推理的行数
    pub rows: usize,
    /// 未截取前序列的 lead_time 范围
    pub bounds: LeadTimeRange,
    /// 实际应用的截取范围
    pub range: Option<LeadTimeRange>,
    pub series: RiskSeries,
    pub timings_us: TimingsUs,
}

impl RiskReport {
    /// 在已算好的整条序列上截取，避免为调整范围重新推理
    pub fn restricted(mut self, range: LeadTimeRange) -> Self {
        self.series = self.series.restrict(range);
        self.range = Some(range);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RiskOutcome {
    Series(RiskReport),
    /// 所选酒店没有任何行：非致命，调用方提示用户即可
    NoData { hotel_code: u32 },
}

impl RiskOutcome {
    pub fn report(&self) -> Option<&RiskReport> {
        match self {
            RiskOutcome::Series(r) => Some(r),
            RiskOutcome::NoData { .. } => None,
        }
    }
}
