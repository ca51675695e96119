use crate::codec::{CategoryCodec, CodecSet};
use crate::config::Config;
use crate::dataset::Dataset;
use crate::model::{load_classifier, Classifier};
use crate::pipeline::FeatureLayout;

use anyhow::{Context, Result};
use std::fmt;

/// 启动时一次性加载的只读工件：数据集 + 分类器 + 类别编码器。
///
/// 构造时做两项一致性检查，任何一项失败都视为配置错误：
/// - 模型需要的特征列在数据集中都存在
/// - 数据集中出现的每个酒店编码都能在 hotel 编码器里解码
pub struct ArtifactContext {
    dataset: Dataset,
    classifier: Box<dyn Classifier>,
    hotel_codec: CategoryCodec,
    hotel_labels: Vec<String>,
}

impl fmt::Debug for ArtifactContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactContext")
            .field("rows", &self.dataset.len())
            .field("features", &self.classifier.feature_names().len())
            .field("hotel_field", &self.hotel_codec.field())
            .field("hotel_labels", &self.hotel_labels)
            .finish()
    }
}

impl ArtifactContext {
    pub fn load(cfg: &Config) -> Result<Self> {
        let dir = cfg.artifacts_dir.as_path();
        // 编码器先加载：数据集里的字符串类别要靠它编码
        let codecs = CodecSet::load_from_dir(dir, cfg.encoders_file.as_deref())?;
        let classifier = load_classifier(dir, cfg.model_file.as_deref())?;
        let dataset = Dataset::load(cfg, &codecs)?;
        Self::from_parts(dataset, classifier, codecs, cfg)
    }

    pub fn from_parts(
        dataset: Dataset,
        classifier: Box<dyn Classifier>,
        codecs: CodecSet,
        cfg: &Config,
    ) -> Result<Self> {
        FeatureLayout::resolve(dataset.columns(), classifier.feature_names())
            .context("classifier features do not match dataset columns")?;

        let hotel_codec = codecs.get(&cfg.hotel_field)?.clone();
        let hotel_labels = hotel_codec
            .decode_all(dataset.hotel_codes())
            .context("dataset contains a hotel code the encoder never saw")?;

        tracing::info!(hotels = ?hotel_labels, "artifacts ready");
        Ok(Self {
            dataset,
            classifier,
            hotel_codec,
            hotel_labels,
        })
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn hotel_codec(&self) -> &CategoryCodec {
        &self.hotel_codec
    }

    /// 数据中出现的酒店，按编码升序解码
    pub fn hotel_labels(&self) -> &[String] {
        &self.hotel_labels
    }
}
