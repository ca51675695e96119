use cancel_risk_core::codec::LookupError;
use cancel_risk_core::config::{Config, MissingPolicy};
use cancel_risk_core::pipeline::RiskCore;
use cancel_risk_core::schema::{LeadTimeRange, RiskOutcome};

use std::fs;
use std::io::Write;
use std::path::Path;

const ENCODERS: &str = r#"{
    "hotel": {"Resort Hotel": 0, "City Hotel": 1, "Airport Hotel": 2},
    "meal": ["BB", "HB"]
}"#;

/// 单棵树：lead_time < 8 -> 0.2，否则看 adr；adr 缺失走右边 0.9
const FOREST: &str = r#"{
    "kind": "tree_ensemble",
    "feature_names": ["lead_time", "adr", "meal"],
    "aggregation": "mean",
    "trees": [{"nodes": [
        {"feature": 0, "threshold": 8.0, "left": 1, "right": 2},
        {"value": 0.2},
        {"feature": 1, "threshold": 100.0, "left": 3, "right": 4, "missing_left": false},
        {"value": 0.4},
        {"value": 0.9}
    ]}]
}"#;

const BOOKINGS: &str = "\
hotel,lead_time,adr,meal,is_canceled
0,5,80,BB,0
0,5,120,HB,1
0,10,90,BB,0
0,10,,BB,1
0,12,150,HB,1
1,3,60,BB,0
";

fn write_artifacts(dir: &Path) {
    fs::write(dir.join("label_encoders.json"), ENCODERS).unwrap();
    fs::write(dir.join("cancellation_model.json"), FOREST).unwrap();
    fs::write(dir.join("bookings.csv"), BOOKINGS).unwrap();
}

fn load(dir: &Path, policy: MissingPolicy) -> RiskCore {
    let mut cfg = Config::default().with_artifacts_dir(dir);
    cfg.missing_policy = policy;
    RiskCore::load(cfg).unwrap()
}

#[test]
fn test_load_and_list_hotels() {
    let tmp = tempfile::tempdir().unwrap();
    write_artifacts(tmp.path());
    let core = load(tmp.path(), MissingPolicy::SubsetMean);

    // 只列出数据里出现的酒店，按编码升序
    assert_eq!(core.hotel_labels(), &["Resort Hotel".to_string(), "City Hotel".to_string()]);
    assert_eq!(core.context().dataset().len(), 6);
}

#[test]
fn test_resort_series_with_subset_mean() {
    let tmp = tempfile::tempdir().unwrap();
    write_artifacts(tmp.path());
    let core = load(tmp.path(), MissingPolicy::SubsetMean);

    let out = core.risk_for_hotel("Resort Hotel", None).unwrap();
    let r = out.report().unwrap();
    assert_eq!(r.hotel_code, 0);
    assert_eq!(r.rows, 5);
    assert_eq!(r.bounds, LeadTimeRange { min: 5, max: 12 });

    // adr 缺失用子集均值 (80+120+90+150)/4 = 110 填补 -> 0.9
    let pts: Vec<(i64, f64)> = r.series.points().iter().map(|p| (p.lead_time, p.risk)).collect();
    assert_eq!(pts.len(), 3);
    assert_eq!(pts[0].0, 5);
    assert!((pts[0].1 - 0.2).abs() < 1e-6);
    assert_eq!(pts[1].0, 10);
    assert!((pts[1].1 - (0.4 + 0.9) / 2.0).abs() < 1e-6);
    assert_eq!(pts[2].0, 12);
    assert!((pts[2].1 - 0.9).abs() < 1e-6);
}

#[test]
fn test_passthrough_changes_prediction() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("label_encoders.json"), ENCODERS).unwrap();
    // 缺失走左边 -> 0.4，和均值填补（0.9）结果不同
    fs::write(
        tmp.path().join("cancellation_model.json"),
        FOREST.replace(r#""missing_left": false"#, r#""missing_left": true"#),
    )
    .unwrap();
    fs::write(tmp.path().join("bookings.csv"), BOOKINGS).unwrap();

    let raw = load(tmp.path(), MissingPolicy::Passthrough);
    let mean = load(tmp.path(), MissingPolicy::SubsetMean);

    let risk_at_10 = |core: &RiskCore| {
        let out = core.risk_for_hotel("Resort Hotel", None).unwrap();
        out.report().unwrap().series.points()[1].risk
    };
    assert!((risk_at_10(&raw) - 0.4).abs() < 1e-6);
    assert!((risk_at_10(&mean) - 0.65).abs() < 1e-6);
}

#[test]
fn test_range_and_no_data() {
    let tmp = tempfile::tempdir().unwrap();
    write_artifacts(tmp.path());
    let core = load(tmp.path(), MissingPolicy::SubsetMean);

    let gap = core
        .risk_for_hotel("Resort Hotel", Some(LeadTimeRange::new(6, 9).unwrap()))
        .unwrap();
    assert!(gap.report().unwrap().series.is_empty());

    let outside = core
        .risk_for_hotel("Resort Hotel", Some(LeadTimeRange::new(100, 365).unwrap()))
        .unwrap();
    assert!(outside.report().unwrap().series.is_empty());

    // 单边范围落在数据之外同样是空序列
    let above = core.risk_view("Resort Hotel", Some(400), None).unwrap();
    let r = above.report().unwrap();
    assert!(r.series.is_empty());
    assert_eq!(r.bounds, LeadTimeRange { min: 5, max: 12 });
    let below = core.risk_view("Resort Hotel", None, Some(2)).unwrap();
    assert!(below.report().unwrap().series.is_empty());

    // 编码器认识，但数据里没有
    let out = core.risk_for_hotel("Airport Hotel", None).unwrap();
    assert!(matches!(out, RiskOutcome::NoData { hotel_code: 2 }));

    let err = core.risk_for_hotel("Motel", None).unwrap_err();
    assert!(err.downcast_ref::<LookupError>().is_some());
}

#[test]
fn test_dataset_code_without_label_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    write_artifacts(tmp.path());
    fs::write(
        tmp.path().join("bookings.csv"),
        format!("{BOOKINGS}7,4,70,BB,0\n"),
    )
    .unwrap();

    let err = RiskCore::load(Config::default().with_artifacts_dir(tmp.path())).unwrap_err();
    let lookup = err.downcast_ref::<LookupError>();
    assert!(
        matches!(lookup, Some(LookupError::UnknownCode { code: 7, .. })),
        "{err:#}"
    );
}

#[test]
fn test_gzip_encoders_and_versioned_model_with_feature_file() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();

    let f = fs::File::create(dir.join("label_encoders.json.gz")).unwrap();
    let mut gz = flate2::write::GzEncoder::new(f, flate2::Compression::default());
    gz.write_all(ENCODERS.as_bytes()).unwrap();
    gz.finish().unwrap();

    // 旧版本权重为 0 -> 0.5；新版本 bias 足够大 -> 接近 1
    fs::write(
        dir.join("cancellation_model_v1.json"),
        r#"{"kind": "logistic", "bias": 0.0, "weights": [0.0, 0.0]}"#,
    )
    .unwrap();
    fs::write(
        dir.join("cancellation_model_v2.json"),
        r#"{"kind": "logistic", "bias": 20.0, "weights": [0.0, 0.0]}"#,
    )
    .unwrap();
    fs::write(dir.join("features.txt"), "lead_time\n\nhotel\n").unwrap();
    fs::write(dir.join("bookings.csv"), BOOKINGS).unwrap();

    let core = load(dir, MissingPolicy::SubsetMean);
    assert_eq!(core.context().classifier().feature_names(), &["lead_time", "hotel"]);

    let out = core.risk_for_hotel("City Hotel", None).unwrap();
    let r = out.report().unwrap();
    assert_eq!(r.series.len(), 1);
    assert!(r.series.points()[0].risk > 0.99);
}

#[test]
fn test_model_feature_missing_from_dataset_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    write_artifacts(tmp.path());
    fs::write(
        tmp.path().join("cancellation_model.json"),
        r#"{"kind": "logistic", "feature_names": ["deposit_type"], "bias": 0.0, "weights": [1.0]}"#,
    )
    .unwrap();

    let err = RiskCore::load(Config::default().with_artifacts_dir(tmp.path())).unwrap_err();
    assert!(format!("{err:#}").contains("deposit_type"));
}
