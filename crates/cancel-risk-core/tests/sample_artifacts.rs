use cancel_risk_core::config::Config;
use cancel_risk_core::pipeline::RiskCore;
use std::path::PathBuf;

/// 仓库自带的示例工件能完整跑通
#[test]
fn smoke_sample_artifacts() {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../artifacts");
    let core = RiskCore::load(Config::default().with_artifacts_dir(dir)).unwrap();

    assert_eq!(core.hotel_labels(), &["City Hotel".to_string(), "Resort Hotel".to_string()]);

    for hotel in core.hotel_labels() {
        let out = core.risk_for_hotel(hotel, None).unwrap();
        let r = out.report().expect("sample data has rows for every hotel");
        let pts = r.series.points();
        assert!(!pts.is_empty());
        assert!(pts.windows(2).all(|w| w[0].lead_time < w[1].lead_time));
        assert!(pts.iter().all(|p| (0.0..=1.0).contains(&p.risk)));
        eprintln!("{hotel}: rows={} points={}", r.rows, pts.len());
    }
}
