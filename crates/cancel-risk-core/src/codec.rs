use anyhow::{bail, Context};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// 类别编码查表失败：说明数据集和编码器不是同一次训练导出的。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("field `{field}`: code {code} has no registered label")]
    UnknownCode { field: String, code: u32 },
    #[error("field `{field}`: label {label:?} is not registered")]
    UnknownLabel { field: String, label: String },
    #[error("no category codec registered for field `{0}`")]
    UnknownField(String),
}

/// 单个类别字段的双向映射 label <-> code
#[derive(Debug, Clone)]
pub struct CategoryCodec {
    field: String,
    to_code: HashMap<String, u32>,
    to_label: HashMap<u32, String>,
}

impl CategoryCodec {
    /// label encoder 约定：classes[i] 的编码就是 i
    pub fn from_classes(field: &str, classes: Vec<String>) -> anyhow::Result<Self> {
        let map = classes
            .into_iter()
            .enumerate()
            .map(|(i, label)| (label, i as u32))
            .collect::<Vec<_>>();
        Self::from_pairs(field, map)
    }

    pub fn from_map(field: &str, map: HashMap<String, u32>) -> anyhow::Result<Self> {
        Self::from_pairs(field, map.into_iter().collect())
    }

    fn from_pairs(field: &str, pairs: Vec<(String, u32)>) -> anyhow::Result<Self> {
        let mut to_code = HashMap::with_capacity(pairs.len());
        let mut to_label = HashMap::with_capacity(pairs.len());
        for (label, code) in pairs {
            if let Some(prev) = to_label.insert(code, label.clone()) {
                bail!("codec `{field}`: code {code} assigned to both {prev:?} and {label:?}");
            }
            if to_code.insert(label.clone(), code).is_some() {
                bail!("codec `{field}`: label {label:?} listed twice");
            }
        }
        Ok(Self {
            field: field.to_string(),
            to_code,
            to_label,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn len(&self) -> usize {
        self.to_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_code.is_empty()
    }

    pub fn decode(&self, code: u32) -> Result<&str, LookupError> {
        self.to_label
            .get(&code)
            .map(String::as_str)
            .ok_or_else(|| LookupError::UnknownCode {
                field: self.field.clone(),
                code,
            })
    }

    /// 去重后按 code 升序解码，给下拉框用
    pub fn decode_all<I>(&self, codes: I) -> Result<Vec<String>, LookupError>
    where
        I: IntoIterator<Item = u32>,
    {
        let distinct: BTreeSet<u32> = codes.into_iter().collect();
        distinct
            .into_iter()
            .map(|c| self.decode(c).map(str::to_string))
            .collect()
    }

    pub fn encode(&self, label: &str) -> Result<u32, LookupError> {
        self.to_code
            .get(label)
            .copied()
            .ok_or_else(|| LookupError::UnknownLabel {
                field: self.field.clone(),
                label: label.to_string(),
            })
    }

    /// 全部已注册 label，按 code 升序
    pub fn labels(&self) -> Vec<&str> {
        let mut pairs: Vec<(&u32, &String)> = self.to_label.iter().collect();
        pairs.sort_by_key(|(c, _)| **c);
        pairs.into_iter().map(|(_, l)| l.as_str()).collect()
    }
}

/// 编码器文件里每个字段两种写法都接受：
/// - `["City Hotel", "Resort Hotel"]`（classes_ 顺序即编码）
/// - `{"City Hotel": 0, "Resort Hotel": 1}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EncoderSpec {
    Classes(Vec<String>),
    Mapping(HashMap<String, u32>),
}

#[derive(Debug, Clone, Default)]
pub struct CodecSet {
    codecs: HashMap<String, CategoryCodec>,
}

impl CodecSet {
    pub fn new(codecs: impl IntoIterator<Item = CategoryCodec>) -> Self {
        Self {
            codecs: codecs
                .into_iter()
                .map(|c| (c.field().to_string(), c))
                .collect(),
        }
    }

    pub fn get(&self, field: &str) -> Result<&CategoryCodec, LookupError> {
        self.codecs
            .get(field)
            .ok_or_else(|| LookupError::UnknownField(field.to_string()))
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    pub fn from_json_reader<R: std::io::Read>(rdr: R) -> anyhow::Result<Self> {
        let raw: HashMap<String, EncoderSpec> = serde_json::from_reader(rdr)?;
        let mut codecs = Vec::with_capacity(raw.len());
        for (field, spec) in raw {
            let codec = match spec {
                EncoderSpec::Classes(classes) => CategoryCodec::from_classes(&field, classes)?,
                EncoderSpec::Mapping(map) => CategoryCodec::from_map(&field, map)?,
            };
            codecs.push(codec);
        }
        Ok(Self::new(codecs))
    }

    /// 兼容: label_encoders.json / label_encoders.json.gz
    pub fn load_from_dir(dir: &Path, file: Option<&str>) -> anyhow::Result<Self> {
        let path = match file {
            Some(name) => dir.join(name),
            None => select_encoders_file(dir).with_context(|| {
                format!(
                    "missing encoders in artifacts_dir={}, expected label_encoders.json or label_encoders.json.gz",
                    dir.display()
                )
            })?,
        };

        let f = fs::File::open(&path)
            .with_context(|| format!("open encoders: {}", path.display()))?;
        let set = if path.extension().is_some_and(|e| e == "gz") {
            Self::from_json_reader(flate2::read::GzDecoder::new(f))
        } else {
            Self::from_json_reader(std::io::BufReader::new(f))
        }
        .with_context(|| format!("parse encoders: {}", path.display()))?;

        tracing::info!(path = %path.display(), fields = set.len(), "loaded category codecs");
        Ok(set)
    }
}

fn select_encoders_file(dir: &Path) -> Option<PathBuf> {
    ["label_encoders.json", "label_encoders.json.gz"]
        .iter()
        .map(|n| dir.join(n))
        .find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hotel_codec() -> CategoryCodec {
        CategoryCodec::from_map(
            "hotel",
            HashMap::from([("Resort Hotel".to_string(), 0), ("City Hotel".to_string(), 1)]),
        )
        .unwrap()
    }

    #[test]
    fn test_encode_decode_hotel() {
        let c = hotel_codec();
        assert_eq!(c.encode("Resort Hotel").unwrap(), 0);
        assert_eq!(c.encode("City Hotel").unwrap(), 1);
        assert_eq!(c.decode(1).unwrap(), "City Hotel");
        assert_eq!(c.labels(), vec!["Resort Hotel", "City Hotel"]);
    }

    #[test]
    fn test_decode_all_dedups_and_sorts_by_code() {
        let c = hotel_codec();
        let labels = c.decode_all([1, 0, 1, 1, 0]).unwrap();
        assert_eq!(labels, vec!["Resort Hotel".to_string(), "City Hotel".to_string()]);
    }

    #[test]
    fn test_unknown_code_and_label_are_lookup_errors() {
        let c = hotel_codec();
        assert_eq!(
            c.decode_all([0, 7]).unwrap_err(),
            LookupError::UnknownCode { field: "hotel".into(), code: 7 }
        );
        assert_eq!(
            c.encode("Motel").unwrap_err(),
            LookupError::UnknownLabel { field: "hotel".into(), label: "Motel".into() }
        );
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let err = CategoryCodec::from_map(
            "hotel",
            HashMap::from([("A".to_string(), 0), ("B".to_string(), 0)]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("code 0"));

        assert!(CategoryCodec::from_classes("hotel", vec!["A".into(), "A".into()]).is_err());
    }

    #[test]
    fn test_codec_set_accepts_both_encoder_shapes() {
        let json = r#"{
            "hotel": ["City Hotel", "Resort Hotel"],
            "meal": {"BB": 0, "HB": 1, "FB": 2}
        }"#;
        let set = CodecSet::from_json_reader(json.as_bytes()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("hotel").unwrap().encode("Resort Hotel").unwrap(), 1);
        assert_eq!(set.get("meal").unwrap().decode(2).unwrap(), "FB");
        assert_eq!(
            set.get("country").unwrap_err(),
            LookupError::UnknownField("country".into())
        );
    }
}
