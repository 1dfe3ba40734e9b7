use proptest::prelude::*;
use xsection::convert::{to_stacked, to_traditional};
use xsection::dataset::{FeatureRecord, SectionDataset};
use xsection::geometry::{build_section_line, cumulative_station, Point, SectionLine};
use xsection::qc::run_qc;
use xsection::{XsecConfig, XsecError};

/// Lines that always advance eastward can never cross themselves.
fn eastward_line(steps: &[(f64, f64)]) -> SectionLine {
    let mut x = 0.0;
    let mut pts = vec![Point::new(0.0, 0.0)];
    for &(dx, y) in steps {
        x += dx;
        pts.push(Point::new(x, y));
    }
    build_section_line("p", pts).unwrap()
}

fn ew_dataset(y: f64, length: f64, picks: &[(f64, f64, f64)]) -> SectionDataset {
    let line = build_section_line("ew", vec![Point::new(0.0, y), Point::new(length, y)]).unwrap();
    let records = picks
        .iter()
        .enumerate()
        .map(|(i, &(fx, dy, z))| FeatureRecord::point(format!("r{i}"), "ew", fx * length, y + dy, z))
        .collect();
    SectionDataset::new(line, records)
}

proptest! {
    #[test]
    fn stations_increase_to_total_length(steps in prop::collection::vec((1.0f64..100.0, -50.0f64..50.0), 1..12)) {
        let line = eastward_line(&steps);
        let mut prev = 0.0;
        for i in 0..line.vertices().len() {
            let s = cumulative_station(&line, i).unwrap();
            prop_assert!(s >= prev);
            prev = s;
        }
        let last = cumulative_station(&line, line.vertices().len() - 1).unwrap();
        prop_assert!((last - line.length()).abs() < 1e-6);
        prop_assert!(cumulative_station(&line, line.vertices().len()).is_none());
    }

    #[test]
    fn stacked_and_traditional_round_trip(
        y in -1.0e6f64..1.0e6,
        length in 10.0f64..10_000.0,
        picks in prop::collection::vec((0.0f64..1.0, -20.0f64..20.0, -500.0f64..3000.0), 0..20),
    ) {
        let cfg = XsecConfig::default();
        let ds = ew_dataset(y, length, &picks);

        let stacked = to_stacked(&ds, &cfg).unwrap();
        let there_and_back = to_traditional(&stacked, &cfg);
        let direct = to_traditional(&ds, &cfg);
        let reverse = to_stacked(&direct, &cfg).unwrap();

        for i in 0..ds.records.len() {
            let a = there_and_back.records[i].station.unwrap();
            let b = direct.records[i].station.unwrap();
            prop_assert!((a - b).abs() < 1e-6);
            prop_assert!((reverse.records[i].display_x.unwrap() - stacked.records[i].display_x.unwrap()).abs() < 1e-9);
            // on a line starting at easting zero the two horizontals agree
            prop_assert!((a - stacked.records[i].display_x.unwrap()).abs() < 1e-6);
            prop_assert_eq!(there_and_back.records[i].elevation, ds.records[i].elevation);
        }
    }

    #[test]
    fn off_axis_lines_never_stack(angle in 1.0f64..179.0, len in 1.0f64..1000.0) {
        let cfg = XsecConfig::default();
        let rad = angle.to_radians();
        let line = build_section_line("d", vec![Point::new(0.0, 0.0), Point::new(len * rad.cos(), len * rad.sin())]).unwrap();
        let ds = SectionDataset::new(line, vec![FeatureRecord::point("a", "d", 0.0, 0.0, 1.0)]);
        let is_ineligible = matches!(to_stacked(&ds, &cfg), Err(XsecError::IneligibleLine { .. }));
        prop_assert!(is_ineligible);
    }

    #[test]
    fn qc_is_repeatable_and_read_only(
        picks in prop::collection::vec((0.0f64..1.0, -80.0f64..80.0, 0.0f64..10.0), 0..15),
    ) {
        let cfg = XsecConfig::default();
        let ds = to_traditional(&ew_dataset(0.0, 500.0, &picks), &cfg);
        let before = ds.clone();
        let first = run_qc(&ds, &cfg);
        let second = run_qc(&ds, &cfg);
        prop_assert_eq!(first, second);
        prop_assert_eq!(ds, before);
    }
}
