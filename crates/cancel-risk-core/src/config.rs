use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 缺失值策略：固定配置，不随调用方变化。
///
/// - `SubsetMean`：用当前酒店子集内该列的均值填补 NaN（默认）
/// - `Passthrough`：NaN 原样交给分类器，由模型自己的输入约定处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    #[default]
    SubsetMean,
    Passthrough,
}

impl std::str::FromStr for MissingPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "subset_mean" | "mean" => Ok(Self::SubsetMean),
            "passthrough" | "raw" => Ok(Self::Passthrough),
            other => anyhow::bail!(
                "unknown missing policy {other:?} (expect subset_mean or passthrough)"
            ),
        }
    }
}

/// 运行时配置：默认值对应训练脚本导出的目录布局，可以用 JSON 文件覆盖。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 模型 / 编码器 / 数据集所在目录
    pub artifacts_dir: PathBuf,

    /// 为 None 时按 cancellation_model.json > cancellation_model_v{N}.json 自动选择
    pub model_file: Option<String>,
    pub encoders_file: Option<String>,
    pub dataset_file: String,

    pub hotel_field: String,
    pub lead_time_field: String,
    /// 历史结果列（is_canceled），推理时从特征里剔除
    pub outcome_field: String,

    pub missing_policy: MissingPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
            model_file: None,
            encoders_file: None,
            dataset_file: "bookings.csv".to_string(),
            hotel_field: "hotel".to_string(),
            lead_time_field: "lead_time".to_string(),
            outcome_field: "is_canceled".to_string(),
            missing_policy: MissingPolicy::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let s = fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        let cfg: Config = serde_json::from_str(&s)
            .with_context(|| format!("parse config: {}", path.display()))?;
        Ok(cfg)
    }

    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = dir.into();
        self
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.artifacts_dir.join(&self.dataset_file)
    }
}
