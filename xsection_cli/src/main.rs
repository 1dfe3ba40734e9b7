use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::{Parser, Subcommand, ValueEnum};
use xsection::{
    batch::convert_batch,
    convert::{merge_stacked_group, replicate_records},
    dataset::{Convention, FeatureRecord, SectionDataset},
    display::{display_points, stacked_to_traditional, DisplayPoint},
    geometry::Point,
    io::{read_config, read_json, read_sections_geojson, records_to_geojson, write_json, write_string},
    mapping::{ConversionMapping, ConversionOutcome, MappingDb, MappingStore},
    projection::{nearest_on_line, stacked_x},
    qc::{check_catalog, check_line_removal, run_qc, Check, Finding, FindingSink, JsonSink, LogSink, QcSummary},
    Result, XsecConfig, XsecError,
};

#[derive(Parser)]
#[command(name = "xsection_cli", version)]
struct Cli {
    /// JSON file with engine settings
    #[arg(long, global = true)]
    config: Option<String>,
    /// Maximum perpendicular offset in meters for a clean projection
    #[arg(long, global = true)]
    snap_tolerance: Option<f64>,
    /// Maximum deviation in degrees from east-west for stacked sections
    #[arg(long, global = true)]
    azimuth_tolerance: Option<f64>,
    /// Station gap in meters reported between boundary vertices
    #[arg(long, global = true)]
    gap_threshold: Option<f64>,
    /// Distance under which two records count as duplicates
    #[arg(long, global = true)]
    duplicate_epsilon: Option<f64>,
    /// Horizontal compression of traditional plots
    #[arg(long, global = true)]
    traditional_exaggeration: Option<f64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Target {
    Stacked,
    Traditional,
}

impl From<Target> for Convention {
    fn from(t: Target) -> Self {
        match t {
            Target::Stacked => Convention::Stacked,
            Target::Traditional => Convention::Traditional,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Project a map point onto one section line.
    Project {
        lines: String,
        section: String,
        x: f64,
        y: f64,
    },
    /// Convert every section of a lines/records pair to one convention.
    Convert {
        lines: String,
        records: String,
        #[arg(long, value_enum)]
        to: Target,
        /// Where to write the converted datasets as JSON
        #[arg(long)]
        output: String,
        /// SQLite file recording which convention each section is in
        #[arg(long)]
        mapping: Option<String>,
        /// Also write the converted records as GeoJSON
        #[arg(long)]
        geojson: Option<String>,
    },
    /// Run quality checks over converted datasets.
    Qc {
        datasets: String,
        /// Write the findings as JSON
        #[arg(long)]
        json: Option<String>,
    },
    /// Merge stacked datasets into one display group.
    Merge {
        datasets: String,
        #[arg(long)]
        output: Option<String>,
        /// Write the group's display coordinates as JSON
        #[arg(long)]
        plot: Option<String>,
    },
    /// Write display coordinates of converted datasets.
    Display {
        datasets: String,
        #[arg(long)]
        output: String,
    },
    /// Redraw a stacked plot as traditional plots of the same sections.
    TraditionalPlot {
        /// Datasets holding the section lines and bands
        datasets: String,
        /// Stacked display coordinates as written by `display`
        plot: String,
        #[arg(long)]
        output: String,
    },
    /// Copy one stacked section's records onto other stacked sections.
    Replicate {
        datasets: String,
        #[arg(long)]
        from: String,
        #[arg(long = "onto", required = true)]
        onto: Vec<String>,
        #[arg(long)]
        output: String,
    },
    /// Check that section ids are unique and every record has a line.
    CheckLines {
        lines: String,
        records: String,
        /// Also check whether this section line could be deleted
        #[arg(long)]
        remove: Option<String>,
    },
}

fn load_config(cli: &Cli) -> Result<XsecConfig> {
    let mut cfg = match &cli.config {
        Some(path) => read_config(path)?,
        None => XsecConfig::default(),
    };
    if let Some(v) = cli.snap_tolerance {
        cfg.snap_tolerance = v;
    }
    if let Some(v) = cli.azimuth_tolerance {
        cfg.azimuth_tolerance = v;
    }
    if let Some(v) = cli.gap_threshold {
        cfg.gap_threshold = v;
    }
    if let Some(v) = cli.duplicate_epsilon {
        cfg.duplicate_epsilon = v;
    }
    if let Some(v) = cli.traditional_exaggeration {
        cfg.frame.traditional_exaggeration = v;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn print_findings(findings: &[Finding]) -> Result<QcSummary> {
    for f in findings {
        let ids = if f.feature_ids.is_empty() {
            String::new()
        } else {
            format!(" [{}]", f.feature_ids.join(", "))
        };
        println!(
            "{:?} {:?} section {}{}: {}",
            f.severity, f.check, f.section_id, ids, f.message
        );
    }
    LogSink.report(findings)?;
    let summary = QcSummary::of(findings);
    println!("Errors: {}, Warnings: {}", summary.errors, summary.warnings);
    Ok(summary)
}

fn project(lines: &str, section: &str, x: f64, y: f64, cfg: &XsecConfig) -> Result<()> {
    let text = xsection::io::read_to_string(lines)?;
    let line = xsection::io::parse_lines_geojson(&text)?
        .into_iter()
        .map(|f| f.line)
        .find(|l| l.section_id() == section)
        .ok_or_else(|| XsecError::UnknownSection {
            section_id: section.to_string(),
        })?;
    let p = Point::new(x, y);
    let proj = nearest_on_line(&line, p);
    println!("Station: {:.3}", proj.station);
    println!("Offset: {:.3}", proj.perpendicular_offset);
    println!("Segment: {}", proj.nearest_segment_index);
    if proj.perpendicular_offset > cfg.snap_tolerance {
        println!("Beyond snap tolerance of {:.3}", cfg.snap_tolerance);
    }
    match stacked_x(&line, p, cfg.azimuth_tolerance) {
        Ok(sx) => println!("Stacked x: {:.3}", sx),
        Err(e) => println!("Stacked x: unavailable ({})", e),
    }
    Ok(())
}

fn convert_all<S: MappingStore + Send>(
    store: S,
    datasets: &[SectionDataset],
    target: Convention,
    cfg: &XsecConfig,
) -> Vec<ConversionOutcome> {
    let store = Mutex::new(store);
    let mut outcomes = Vec::new();
    for (ds, res) in datasets.iter().zip(convert_batch(datasets, target, &store, cfg)) {
        match res {
            Ok(out) => {
                if out.converted {
                    println!("Section {}: converted to {} (version {})", ds.section_id(), target, out.record.version);
                } else {
                    println!("Section {}: already {}", ds.section_id(), target);
                }
                outcomes.push(out);
            }
            Err(e) => eprintln!("Section {}: {}", ds.section_id(), e),
        }
    }
    outcomes
}

/// Replaces sections the mapping reports as already converted with their
/// converted copy from the existing output file.
fn keep_previous_output(
    outcomes: Vec<ConversionOutcome>,
    target: Convention,
    output: &str,
) -> Result<Vec<SectionDataset>> {
    if outcomes.iter().all(|o| o.converted) {
        return Ok(outcomes.into_iter().map(|o| o.dataset).collect());
    }
    let previous: Vec<SectionDataset> = if Path::new(output).exists() {
        read_json(output)?
    } else {
        Vec::new()
    };
    let mut datasets = Vec::with_capacity(outcomes.len());
    let mut missing = Vec::new();
    for out in outcomes {
        if out.converted {
            datasets.push(out.dataset);
            continue;
        }
        let id = out.dataset.section_id();
        match previous
            .iter()
            .find(|d| d.section_id() == id && d.convention == Some(target))
        {
            Some(prev) => {
                println!("Section {}: kept converted records from {}", id, output);
                datasets.push(prev.clone());
            }
            None => missing.push(id.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(XsecError::AlreadyConverted {
            section_ids: missing,
            convention: target.to_string(),
            output: output.to_string(),
        });
    }
    Ok(datasets)
}

fn convert(
    lines: &str,
    records: &str,
    target: Convention,
    output: &str,
    mapping: Option<&str>,
    geojson: Option<&str>,
    cfg: &XsecConfig,
) -> Result<()> {
    let (datasets, orphans) = read_sections_geojson(lines, records)?;
    for rec in &orphans {
        log::warn!("feature {} references unknown section {}", rec.feature_id, rec.section_id);
    }
    let outcomes = match mapping {
        Some(path) => convert_all(MappingDb::open(path)?, &datasets, target, cfg),
        None => convert_all(ConversionMapping::new(), &datasets, target, cfg),
    };
    let converted = keep_previous_output(outcomes, target, output)?;
    write_json(output, &converted)?;
    if let Some(path) = geojson {
        let recs: Vec<FeatureRecord> = converted.iter().flat_map(|d| d.records.clone()).collect();
        write_string(path, &records_to_geojson(&recs)?)?;
    }
    println!("Wrote {} dataset(s) to {}", converted.len(), output);
    Ok(())
}

fn qc(datasets: &str, json: Option<&str>, cfg: &XsecConfig) -> Result<bool> {
    let datasets: Vec<SectionDataset> = read_json(datasets)?;
    let lines: Vec<_> = datasets.iter().map(|d| d.line.clone()).collect();
    let mut findings: Vec<Finding> = datasets.iter().flat_map(|d| run_qc(d, cfg)).collect();
    let records: Vec<FeatureRecord> = datasets.iter().flat_map(|d| d.records.clone()).collect();
    // orphans are already reported per dataset; keep only the line checks
    findings.extend(
        check_catalog(&lines, &records)
            .into_iter()
            .filter(|f| f.check != Check::Orphan),
    );
    let summary = print_findings(&findings)?;
    if let Some(path) = json {
        JsonSink::new(File::create(path)?).report(&findings)?;
    }
    Ok(summary.is_blocking())
}

fn merge(datasets: &str, output: Option<&str>, plot: Option<&str>, cfg: &XsecConfig) -> Result<()> {
    let datasets: Vec<SectionDataset> = read_json(datasets)?;
    let group = merge_stacked_group(&datasets, cfg)?;
    for m in &group.members {
        println!(
            "Band {}: section {} ({:.3} to {:.3})",
            m.band.index,
            m.section_id(),
            m.band.bottom,
            m.band.top
        );
    }
    println!("Easting extent: {:.3} to {:.3}", group.x_extent.0, group.x_extent.1);
    if let Some(path) = output {
        write_json(path, &group)?;
    }
    if let Some(path) = plot {
        write_json(path, &group.display_points(cfg)?)?;
    }
    Ok(())
}

fn display(datasets: &str, output: &str, cfg: &XsecConfig) -> Result<()> {
    let datasets: Vec<SectionDataset> = read_json(datasets)?;
    let mut points = Vec::new();
    for ds in &datasets {
        points.extend(display_points(ds, &cfg.frame)?);
    }
    write_json(output, &points)?;
    println!("Wrote {} display point(s) to {}", points.len(), output);
    Ok(())
}

fn traditional_plot(datasets: &str, plot: &str, output: &str, cfg: &XsecConfig) -> Result<()> {
    let datasets: Vec<SectionDataset> = read_json(datasets)?;
    let points: Vec<DisplayPoint> = read_json(plot)?;
    let mut by_section: BTreeMap<&str, Vec<DisplayPoint>> = BTreeMap::new();
    for p in &points {
        by_section.entry(p.section_id.as_str()).or_default().push(p.clone());
    }
    let mut redrawn = Vec::with_capacity(points.len());
    for (section_id, pts) in by_section {
        let ds = datasets
            .iter()
            .find(|d| d.section_id() == section_id)
            .ok_or_else(|| XsecError::UnknownSection {
                section_id: section_id.to_string(),
            })?;
        let band = ds.band.ok_or_else(|| XsecError::MissingBand {
            section_id: section_id.to_string(),
        })?;
        let line = ds.line.as_stacked(cfg.azimuth_tolerance)?;
        redrawn.extend(stacked_to_traditional(&line, band, &pts, &cfg.frame));
        println!("Section {}: {} point(s) redrawn", section_id, pts.len());
    }
    write_json(output, &redrawn)
}

fn replicate(datasets: &str, from: &str, onto: &[String], output: &str, cfg: &XsecConfig) -> Result<()> {
    let datasets: Vec<SectionDataset> = read_json(datasets)?;
    let find = |id: &str| {
        datasets
            .iter()
            .find(|d| d.section_id() == id)
            .ok_or_else(|| XsecError::UnknownSection {
                section_id: id.to_string(),
            })
    };
    let source = find(from)?;
    let targets = onto
        .iter()
        .map(|id| find(id).cloned())
        .collect::<Result<Vec<_>>>()?;
    let out = replicate_records(source, &targets, cfg)?;
    for (before, after) in targets.iter().zip(&out) {
        println!(
            "Section {}: {} record(s) copied",
            after.section_id(),
            after.records.len() - before.records.len()
        );
    }
    write_json(output, &out)
}

fn check_lines(lines: &str, records: &str, remove: Option<&str>) -> Result<bool> {
    let parsed = xsection::io::parse_lines_geojson(&xsection::io::read_to_string(lines)?)?;
    let lines: Vec<_> = parsed.into_iter().map(|f| f.line).collect();
    let records = xsection::io::parse_records_geojson(&xsection::io::read_to_string(records)?)?;
    let mut findings = check_catalog(&lines, &records);
    if let Some(id) = remove {
        let blockers = check_line_removal(id, &records);
        if blockers.is_empty() {
            println!("Section {} can be removed", id);
        }
        findings.extend(blockers);
    }
    Ok(print_findings(&findings)?.is_blocking())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let cfg = match load_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let result = match &cli.command {
        Commands::Project { lines, section, x, y } => project(lines, section, *x, *y, &cfg).map(|_| false),
        Commands::Convert {
            lines,
            records,
            to,
            output,
            mapping,
            geojson,
        } => convert(
            lines,
            records,
            (*to).into(),
            output,
            mapping.as_deref(),
            geojson.as_deref(),
            &cfg,
        )
        .map(|_| false),
        Commands::Qc { datasets, json } => qc(datasets, json.as_deref(), &cfg),
        Commands::Merge { datasets, output, plot } => {
            merge(datasets, output.as_deref(), plot.as_deref(), &cfg).map(|_| false)
        }
        Commands::Display { datasets, output } => display(datasets, output, &cfg).map(|_| false),
        Commands::TraditionalPlot { datasets, plot, output } => {
            traditional_plot(datasets, plot, output, &cfg).map(|_| false)
        }
        Commands::Replicate {
            datasets,
            from,
            onto,
            output,
        } => replicate(datasets, from, onto, output, &cfg).map(|_| false),
        Commands::CheckLines {
            lines,
            records,
            remove,
        } => check_lines(lines, records, remove.as_deref()),
    };
    match result {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::from(2),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
