use crate::util::{clamp01, sigmoid};

use anyhow::{anyhow, bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 取消概率分类器：特征行进，正类（取消）概率出。
///
/// 行按 `feature_names()` 的顺序排列，缺失为 NaN；NaN 怎么处理由各实现自己约定。
pub trait Classifier: Send + Sync {
    fn feature_names(&self) -> &[String];

    fn predict_proba(&self, row: &[f32]) -> Result<f64>;

    fn predict_proba_batch(&self, rows: &[Vec<f32>]) -> Result<Vec<f64>> {
        rows.iter().map(|r| self.predict_proba(r)).collect()
    }
}

/// 逻辑回归：p = sigmoid(bias + Σ w_i·x_i)
///
/// 输入约定与 sklearn 一致：不接受缺失值。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    pub feature_names: Vec<String>,
    pub bias: f64,
    pub weights: Vec<f64>,
}

impl LogisticModel {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.weights.len() == self.feature_names.len(),
            "logistic model: {} weights for {} features",
            self.weights.len(),
            self.feature_names.len()
        );
        Ok(())
    }
}

impl Classifier for LogisticModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_proba(&self, row: &[f32]) -> Result<f64> {
        ensure!(
            row.len() == self.weights.len(),
            "row width {} != model width {}",
            row.len(),
            self.weights.len()
        );
        let mut z = self.bias;
        for (i, (w, x)) in self.weights.iter().zip(row).enumerate() {
            if x.is_nan() {
                bail!(
                    "logistic model does not accept missing values (feature `{}`)",
                    self.feature_names[i]
                );
            }
            z += w * (*x as f64);
        }
        Ok(clamp01(sigmoid(z)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// 随机森林：叶子即概率，取平均
    Mean,
    /// GBDT：sigmoid(base_score + Σ leaf)
    Logit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
        #[serde(default)]
        missing_left: bool,
    },
    Leaf {
        value: f32,
    },
}

/// 扁平数组存储的一棵树，0 号为根；子节点下标必须大于父节点（保证无环）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    fn validate(&self, n_features: usize) -> Result<()> {
        ensure!(!self.nodes.is_empty(), "empty tree");
        for (i, node) in self.nodes.iter().enumerate() {
            if let Node::Split { feature, left, right, .. } = *node {
                ensure!(feature < n_features, "node {i}: feature index {feature} out of range");
                for child in [left, right] {
                    ensure!(
                        child > i && child < self.nodes.len(),
                        "node {i}: child {child} out of range"
                    );
                }
            }
        }
        Ok(())
    }

    /// x < threshold 走左；NaN 走 missing 分支
    fn leaf_value(&self, row: &[f32]) -> f32 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split { feature, threshold, left, right, missing_left } => {
                    let x = row[feature];
                    let go_left = if x.is_nan() { missing_left } else { x < threshold };
                    idx = if go_left { left } else { right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub feature_names: Vec<String>,
    pub aggregation: Aggregation,
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.trees.is_empty(), "tree ensemble has no trees");
        for (t, tree) in self.trees.iter().enumerate() {
            tree.validate(self.feature_names.len())
                .with_context(|| format!("tree {t}"))?;
        }
        Ok(())
    }
}

impl Classifier for TreeEnsemble {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_proba(&self, row: &[f32]) -> Result<f64> {
        ensure!(
            row.len() == self.feature_names.len(),
            "row width {} != model width {}",
            row.len(),
            self.feature_names.len()
        );
        let sum: f64 = self.trees.iter().map(|t| t.leaf_value(row) as f64).sum();
        let p = match self.aggregation {
            Aggregation::Mean => sum / self.trees.len() as f64,
            Aggregation::Logit => sigmoid(self.base_score + sum),
        };
        Ok(clamp01(p))
    }
}

/// 模型文件格式（按 `kind` 区分）。`feature_names` 可以不写，
/// 此时从同目录的 feature_names.json / features.txt 读。
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ModelArtifact {
    Logistic {
        feature_names: Option<Vec<String>>,
        bias: f64,
        weights: Vec<f64>,
    },
    TreeEnsemble {
        feature_names: Option<Vec<String>>,
        aggregation: Aggregation,
        #[serde(default)]
        base_score: f64,
        trees: Vec<Tree>,
    },
}

pub fn load_classifier(dir: &Path, file: Option<&str>) -> Result<Box<dyn Classifier>> {
    let path = match file {
        Some(name) => dir.join(name),
        None => select_model_file(dir).ok_or_else(|| {
            anyhow!(
                "missing model in artifacts_dir={}, expected cancellation_model.json or cancellation_model_v{{N}}.json",
                dir.display()
            )
        })?,
    };

    let s = fs::read_to_string(&path)
        .with_context(|| format!("read model: {}", path.display()))?;
    let artifact: ModelArtifact = serde_json::from_str(&s)
        .with_context(|| format!("parse model: {}", path.display()))?;

    let model: Box<dyn Classifier> = match artifact {
        ModelArtifact::Logistic { feature_names, bias, weights } => {
            let m = LogisticModel {
                feature_names: resolve_feature_names(dir, feature_names)?,
                bias,
                weights,
            };
            m.validate()
                .with_context(|| format!("invalid model: {}", path.display()))?;
            Box::new(m)
        }
        ModelArtifact::TreeEnsemble { feature_names, aggregation, base_score, trees } => {
            let m = TreeEnsemble {
                feature_names: resolve_feature_names(dir, feature_names)?,
                aggregation,
                base_score,
                trees,
            };
            m.validate()
                .with_context(|| format!("invalid model: {}", path.display()))?;
            Box::new(m)
        }
    };

    tracing::info!(
        path = %path.display(),
        features = model.feature_names().len(),
        "loaded cancellation classifier"
    );
    Ok(model)
}

/// cancellation_model.json 优先；否则取版本号最大的 cancellation_model_v{N}.json
fn select_model_file(dir: &Path) -> Option<PathBuf> {
    let p0 = dir.join("cancellation_model.json");
    if p0.exists() {
        return Some(p0);
    }

    let mut cands: Vec<(u32, PathBuf)> = vec![];
    if let Ok(rd) = fs::read_dir(dir) {
        for ent in rd.flatten() {
            let path = ent.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
            if let Some(rest) = name.strip_prefix("cancellation_model_v") {
                if let Some(rest) = rest.strip_suffix(".json") {
                    if let Ok(v) = rest.parse::<u32>() {
                        cands.push((v, path));
                    }
                }
            }
        }
    }
    cands.sort_by_key(|(v, _)| *v);
    cands.pop().map(|(_, p)| p)
}

fn resolve_feature_names(dir: &Path, inline: Option<Vec<String>>) -> Result<Vec<String>> {
    match inline {
        Some(names) => Ok(names),
        None => load_feature_names(dir),
    }
}

fn load_feature_names(dir: &Path) -> Result<Vec<String>> {
    let json_path = dir.join("feature_names.json");
    if json_path.exists() {
        let s = fs::read_to_string(&json_path)
            .with_context(|| format!("read feature_names.json: {}", json_path.display()))?;
        let names: Vec<String> = serde_json::from_str(&s)
            .with_context(|| format!("parse feature_names.json: {}", json_path.display()))?;
        return Ok(names);
    }

    let txt_path = dir.join("features.txt");
    if txt_path.exists() {
        let s = fs::read_to_string(&txt_path)
            .with_context(|| format!("read features.txt: {}", txt_path.display()))?;
        return Ok(s
            .lines()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect());
    }

    Err(anyhow!(
        "model has no feature_names and artifacts_dir={} has neither feature_names.json nor features.txt",
        dir.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_logistic_score_and_nan_rejected() {
        let m = LogisticModel {
            feature_names: names(&["lead_time", "adr"]),
            bias: -1.0,
            weights: vec![0.01, 0.0],
        };
        let p = m.predict_proba(&[100.0, 50.0]).unwrap();
        assert!((p - 0.5).abs() < 1e-6);

        let err = m.predict_proba(&[f32::NAN, 50.0]).unwrap_err();
        assert!(err.to_string().contains("lead_time"));
    }

    fn stump(missing_left: bool) -> Tree {
        Tree {
            nodes: vec![
                Node::Split { feature: 0, threshold: 30.0, left: 1, right: 2, missing_left },
                Node::Leaf { value: 0.2 },
                Node::Leaf { value: 0.8 },
            ],
        }
    }

    #[test]
    fn test_forest_mean_and_missing_branch() {
        let m = TreeEnsemble {
            feature_names: names(&["lead_time"]),
            aggregation: Aggregation::Mean,
            base_score: 0.0,
            trees: vec![stump(true), stump(false)],
        };
        m.validate().unwrap();
        assert!((m.predict_proba(&[10.0]).unwrap() - 0.2).abs() < 1e-6);
        assert!((m.predict_proba(&[30.0]).unwrap() - 0.8).abs() < 1e-6);
        // 一棵走左一棵走右
        assert!((m.predict_proba(&[f32::NAN]).unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_boosted_logit() {
        let m = TreeEnsemble {
            feature_names: names(&["lead_time"]),
            aggregation: Aggregation::Logit,
            base_score: -0.2,
            trees: vec![stump(true)],
        };
        // sigmoid(-0.2 + 0.2) = 0.5
        assert!((m.predict_proba(&[0.0]).unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_tree_validation_rejects_back_edges() {
        let bad = TreeEnsemble {
            feature_names: names(&["lead_time"]),
            aggregation: Aggregation::Mean,
            base_score: 0.0,
            trees: vec![Tree {
                nodes: vec![
                    Node::Split { feature: 0, threshold: 1.0, left: 0, right: 1, missing_left: false },
                    Node::Leaf { value: 0.1 },
                ],
            }],
        };
        assert!(bad.validate().is_err());

        let bad_feature = TreeEnsemble {
            feature_names: names(&["lead_time"]),
            aggregation: Aggregation::Mean,
            base_score: 0.0,
            trees: vec![Tree {
                nodes: vec![
                    Node::Split { feature: 3, threshold: 1.0, left: 1, right: 2, missing_left: false },
                    Node::Leaf { value: 0.1 },
                    Node::Leaf { value: 0.9 },
                ],
            }],
        };
        assert!(bad_feature.validate().is_err());
    }

    #[test]
    fn test_artifact_json_shapes() {
        let json = r#"{
            "kind": "tree_ensemble",
            "feature_names": ["lead_time"],
            "aggregation": "mean",
            "trees": [{"nodes": [
                {"feature": 0, "threshold": 30.0, "left": 1, "right": 2},
                {"value": 0.1},
                {"value": 0.7}
            ]}]
        }"#;
        let a: ModelArtifact = serde_json::from_str(json).unwrap();
        match a {
            ModelArtifact::TreeEnsemble { trees, base_score, .. } => {
                assert_eq!(trees[0].nodes.len(), 3);
                assert_eq!(base_score, 0.0);
                assert!(matches!(trees[0].nodes[0], Node::Split { missing_left: false, .. }));
            }
            other => panic!("unexpected artifact {other:?}"),
        }
    }
}
