use crate::codec::{CategoryCodec, CodecSet};
use crate::config::Config;
use crate::util::is_missing_marker;

use anyhow::{anyhow, bail, ensure, Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::io::Read;

/// 数据集中的一行预订记录（加载后只读）
#[derive(Debug, Clone)]
pub struct BookingRecord {
    pub hotel: u32,
    /// 预订日到入住日的天数
    pub lead_time: i64,
    pub canceled: bool,
    /// 与 `Dataset::columns()` 对齐；缺失为 NaN
    pub features: Vec<f32>,
}

/// 预处理后的宽表。`columns` 是除结果列外的全部列（文件顺序），
/// hotel / lead_time 本身也是模型特征，保留在里面。
#[derive(Debug, Clone)]
pub struct Dataset {
    columns: Vec<String>,
    records: Vec<BookingRecord>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, records: Vec<BookingRecord>) -> Result<Self> {
        for (i, r) in records.iter().enumerate() {
            ensure!(
                r.features.len() == columns.len(),
                "record {i}: feature width {} != column count {}",
                r.features.len(),
                columns.len()
            );
        }
        Ok(Self { columns, records })
    }

    pub fn load(cfg: &Config, codecs: &CodecSet) -> Result<Self> {
        let path = cfg.dataset_path();
        let f = fs::File::open(&path)
            .with_context(|| format!("open dataset: {}", path.display()))?;
        let ds = Self::from_csv_reader(f, cfg, codecs)
            .with_context(|| format!("load dataset: {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            rows = ds.len(),
            columns = ds.columns.len(),
            "loaded booking dataset"
        );
        Ok(ds)
    }

    pub fn from_csv_reader<R: Read>(rdr: R, cfg: &Config, codecs: &CodecSet) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(rdr);

        let headers: Vec<String> = rdr
            .headers()
            .context("read csv header")?
            .iter()
            .map(str::to_string)
            .collect();

        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| anyhow!("dataset is missing required column `{name}`"))
        };
        let outcome_src = find(cfg.outcome_field.as_str())?;
        let hotel_src = find(cfg.hotel_field.as_str())?;
        let lead_src = find(cfg.lead_time_field.as_str())?;

        // 特征列 = 去掉结果列后的全部列
        let feature_src: Vec<usize> = (0..headers.len()).filter(|&i| i != outcome_src).collect();
        let columns: Vec<String> = feature_src.iter().map(|&i| headers[i].clone()).collect();
        let col_codecs: Vec<Option<&CategoryCodec>> = columns
            .iter()
            .map(|c| codecs.get(c).ok())
            .collect();
        let hotel_col = columns
            .iter()
            .position(|c| c == &cfg.hotel_field)
            .ok_or_else(|| anyhow!("hotel column `{}` not among features", cfg.hotel_field))?;
        let lead_col = columns
            .iter()
            .position(|c| c == &cfg.lead_time_field)
            .ok_or_else(|| anyhow!("lead time column `{}` not among features", cfg.lead_time_field))?;
        debug_assert_eq!(feature_src[hotel_col], hotel_src);
        debug_assert_eq!(feature_src[lead_col], lead_src);

        let mut records = Vec::new();
        for (n, rec) in rdr.records().enumerate() {
            // header 占第 1 行
            let line = n + 2;
            let rec = rec.with_context(|| format!("read csv line {line}"))?;
            ensure!(
                rec.len() == headers.len(),
                "line {line}: expected {} fields, got {}",
                headers.len(),
                rec.len()
            );

            let mut features = Vec::with_capacity(feature_src.len());
            for (j, &src) in feature_src.iter().enumerate() {
                let v = parse_cell(&rec[src], &columns[j], col_codecs[j])
                    .with_context(|| format!("line {line}"))?;
                features.push(v);
            }

            let hotel = key_cell(&rec[hotel_src], features[hotel_col], &cfg.hotel_field)
                .with_context(|| format!("line {line}"))?;
            ensure!(
                (0..=u32::MAX as i64).contains(&hotel),
                "line {line}: hotel code {hotel} out of range"
            );
            let lead_time = key_cell(&rec[lead_src], features[lead_col], &cfg.lead_time_field)
                .with_context(|| format!("line {line}"))?;
            let canceled = parse_outcome(&rec[outcome_src], &cfg.outcome_field)
                .with_context(|| format!("line {line}"))?;

            records.push(BookingRecord {
                hotel: hotel as u32,
                lead_time,
                canceled,
                features,
            });
        }

        Ok(Self { columns, records })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[BookingRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 数据里出现过的酒店编码（去重、升序）
    pub fn hotel_codes(&self) -> Vec<u32> {
        self.records
            .iter()
            .map(|r| r.hotel)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn rows_for_hotel(&self, hotel_code: u32) -> impl Iterator<Item = &BookingRecord> + '_ {
        self.records.iter().filter(move |r| r.hotel == hotel_code)
    }
}

/// - 缺失标记：NaN
/// - 数值：直接转 f32
/// - 字符串：该列有编码器就查表（未知 label 直接报错），否则拒绝
fn parse_cell(raw: &str, column: &str, codec: Option<&CategoryCodec>) -> Result<f32> {
    if is_missing_marker(raw) {
        return Ok(f32::NAN);
    }
    if let Ok(v) = raw.parse::<f32>() {
        return Ok(v);
    }
    match codec {
        Some(c) => Ok(c.encode(raw)? as f32),
        None => bail!("column `{column}`: non-numeric value {raw:?} and no category codec"),
    }
}

/// 分组键（hotel / lead_time）直接按整数解析，f32 超过 2^24 会丢精度；
/// "3.0" 这类写法或编码器转出来的值再走浮点 + 整数校验
fn key_cell(raw: &str, parsed: f32, column: &str) -> Result<i64> {
    if let Ok(v) = raw.parse::<i64>() {
        return Ok(v);
    }
    integral(parsed, column)
}

fn integral(v: f32, column: &str) -> Result<i64> {
    ensure!(!v.is_nan(), "column `{column}`: value is missing");
    ensure!(
        v.is_finite() && v.fract() == 0.0,
        "column `{column}`: expected an integer, got {v}"
    );
    Ok(v as i64)
}

fn parse_outcome(raw: &str, column: &str) -> Result<bool> {
    match raw {
        "1" | "1.0" | "true" | "True" => Ok(true),
        "0" | "0.0" | "false" | "False" => Ok(false),
        other => bail!("column `{column}`: expected 0/1 outcome, got {other:?}"),
    }
}
