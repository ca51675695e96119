use std::time::Instant;

#[inline]
pub fn now_us(start: Instant) -> u64 {
    start.elapsed().as_micros() as u64
}

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[inline]
pub fn clamp01(x: f64) -> f64 {
    if x < 0.0 { 0.0 } else if x > 1.0 { 1.0 } else { x }
}

/// CSV 里约定的缺失值写法（pandas 导出的 preprocessed csv 常见这些）
#[inline]
pub fn is_missing_marker(s: &str) -> bool {
    matches!(s, "" | "NA" | "NaN" | "nan" | "null" | "None")
}
