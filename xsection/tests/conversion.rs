use xsection::convert::{merge_stacked_group, to_stacked, to_traditional};
use xsection::dataset::{Convention, FeatureRecord, SectionCatalog, SectionDataset};
use xsection::geometry::{build_section_line, Point};
use xsection::mapping::{convert_guarded, ConversionMapping, MappingStore};
use xsection::projection::{stacked_x, traditional_station};
use xsection::qc::{run_qc, Check, Severity};
use xsection::{XsecConfig, XsecError};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn east_west_line_gives_same_x_both_ways() {
    init_logs();
    let line = build_section_line("27", vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)]).unwrap();
    let p = Point::new(50.0, 0.0);
    assert!((stacked_x(&line, p, 0.5).unwrap() - 50.0).abs() < 1e-6);
    let proj = traditional_station(&line, p, 50.0).unwrap();
    assert!((proj.station - 50.0).abs() < 1e-6);
    assert!(proj.perpendicular_offset.abs() < 1e-6);
}

#[test]
fn diagonal_line_only_converts_traditionally() {
    init_logs();
    let line = build_section_line("D", vec![Point::new(0.0, 0.0), Point::new(70.0, 70.0)]).unwrap();
    let ds = SectionDataset::new(line.clone(), vec![FeatureRecord::point("bh", "D", 35.0, 35.0, 10.0)]);
    let cfg = XsecConfig::default();
    assert!(matches!(to_stacked(&ds, &cfg), Err(XsecError::IneligibleLine { .. })));
    assert!(matches!(stacked_x(&line, Point::new(35.0, 35.0), 0.5), Err(XsecError::InvalidConvention { .. })));
    let proj = traditional_station(&line, Point::new(35.0, 35.0), 50.0).unwrap();
    assert!((proj.station - 49.497474683).abs() < 1e-6);
    assert!(proj.perpendicular_offset < 1e-6);
}

#[test]
fn duplicate_picks_reported_once() {
    init_logs();
    let line = build_section_line("1", vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)]).unwrap();
    let ds = SectionDataset::new(
        line,
        vec![
            FeatureRecord::point("a", "1", 12.0, 0.0, 100.0),
            FeatureRecord::point("b", "1", 12.0, 0.0, 100.0),
        ],
    );
    let cfg = XsecConfig::default();
    let findings = run_qc(&to_traditional(&ds, &cfg), &cfg);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].severity, Severity::Warning);
    assert_eq!(findings[0].check, Check::Duplicate);
    assert_eq!(findings[0].feature_ids, vec!["a", "b"]);
}

#[test]
fn catalog_workflow_converts_and_merges() {
    init_logs();
    let cfg = XsecConfig::default();
    let mut catalog = SectionCatalog::new();
    for (id, y) in [("26", 0.0), ("27", 1000.0), ("28", 2000.0)] {
        catalog.insert(build_section_line(id, vec![Point::new(0.0, y), Point::new(5000.0, y)]).unwrap());
    }
    let records = vec![
        FeatureRecord::point("bh-1", "26", 1200.0, 3.0, 900.0),
        FeatureRecord::point("bh-2", "27", 2200.0, 998.0, 850.0),
        FeatureRecord::point("bh-3", "28", 3200.0, 2001.0, 800.0),
        FeatureRecord::point("bh-x", "99", 3200.0, 2001.0, 800.0),
    ];
    let (datasets, orphans) = catalog.assemble(records);
    assert_eq!(orphans.len(), 1);

    let mut store = ConversionMapping::new();
    let mut stacked = Vec::new();
    for (i, ds) in datasets.into_iter().enumerate() {
        let ds = ds.with_band(26 + i as i64);
        let out = convert_guarded(&mut store, &ds, Convention::Stacked, &cfg).unwrap();
        assert!(out.converted);
        stacked.push(out.dataset);
    }
    assert_eq!(store.records().unwrap().len(), 3);

    let group = merge_stacked_group(&stacked, &cfg).unwrap();
    assert_eq!(group.members.len(), 3);
    assert_eq!(group.x_extent, (0.0, 5000.0));
    for m in &group.members {
        assert!(run_qc(&m.dataset, &cfg).iter().all(|f| !f.is_blocking()));
    }
}

#[test]
fn orphan_in_dataset_is_blocking() {
    init_logs();
    let line = build_section_line("1", vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)]).unwrap();
    let ds = SectionDataset::new(line, vec![FeatureRecord::point("lost", "2", 10.0, 0.0, 5.0)]);
    let findings = run_qc(&ds, &XsecConfig::default());
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].check, Check::Orphan);
    assert!(findings[0].is_blocking());
}
