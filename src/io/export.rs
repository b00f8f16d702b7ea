//! CSV and JSON export of run results.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::flex::tracker::ElasticityRecord;
use crate::io::import::{LOAD_COLUMNS, PRECALC_COLUMNS};
use crate::load::LoadTable;
use crate::revenue::CostsByType;
use crate::revenue::SubclassRr;
use crate::revenue::precalc::PrecalcMapping;
use crate::runner::RunResult;

pub const SHIFTED_LOAD_FILE: &str = "shifted_load.csv";
pub const TRACKER_FILE: &str = "elasticity_tracker.csv";
pub const COSTS_FILE: &str = "costs_by_type.json";
pub const SUBCLASS_RR_FILE: &str = "subclass_rr.csv";
pub const PRECALC_MAPPING_FILE: &str = "precalc_period_mapping.csv";

const LABELED_LOAD_HEADER: &[&str] = &[
    "building_id",
    "hour",
    "energy_period",
    "tier",
    "kwh",
    "subclass",
];
const TRACKER_HEADER: &[&str] = &[
    "building_id",
    "slice",
    "energy_period",
    "tier",
    "q_orig",
    "q_new",
    "price",
    "p_flat",
    "target_elasticity",
    "realized_elasticity",
    "is_receiver",
];
const SUBCLASS_RR_HEADER: &[&str] = &[
    "subclass",
    "participating",
    "baseline_rr",
    "revenue_requirement",
];

/// Load row for tables that carry no subclass labels.
#[derive(Serialize)]
struct UnlabeledLoadRow<'a> {
    building_id: &'a str,
    hour: u32,
    energy_period: &'a str,
    tier: u32,
    kwh: f64,
}

/// Writes `header` followed by one CSV row per serialized value.
///
/// The header is written even when `rows` is empty.
///
/// # Errors
///
/// Returns a `Csv` error if serialization or writing fails.
pub fn write_rows<T: Serialize>(
    header: &[&str],
    rows: impl IntoIterator<Item = T>,
    writer: impl Write,
) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(header)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Shifted load in the input column layout.
///
/// The `subclass` column is only written when some building carries a label.
///
/// # Errors
///
/// Returns a `Csv` error if writing fails.
pub fn write_shifted_load(load: &LoadTable, writer: impl Write) -> Result<()> {
    if load.records().any(|r| r.subclass.is_some()) {
        return write_rows(LABELED_LOAD_HEADER, load.records(), writer);
    }
    let rows = load.records().map(|r| UnlabeledLoadRow {
        building_id: &r.building_id,
        hour: r.hour,
        energy_period: &r.energy_period,
        tier: r.tier,
        kwh: r.kwh,
    });
    write_rows(LOAD_COLUMNS, rows, writer)
}

/// # Errors
///
/// Returns a `Csv` error if writing fails.
pub fn write_tracker(records: &[ElasticityRecord], writer: impl Write) -> Result<()> {
    write_rows(TRACKER_HEADER, records, writer)
}

/// # Errors
///
/// Returns a `Csv` error if writing fails.
pub fn write_subclass_rr(rows: &[SubclassRr], writer: impl Write) -> Result<()> {
    write_rows(SUBCLASS_RR_HEADER, rows, writer)
}

/// # Errors
///
/// Returns a `Csv` error if writing fails.
pub fn write_precalc_mapping(mapping: &PrecalcMapping, writer: impl Write) -> Result<()> {
    write_rows(PRECALC_COLUMNS, mapping.to_records(), writer)
}

/// Cost line items as a pretty-printed JSON object.
///
/// # Errors
///
/// Returns a `Json` error if serialization or writing fails.
pub fn write_costs_json(costs: &CostsByType, mut writer: impl Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, costs)?;
    writer.write_all(b"\n")?;
    Ok(())
}

fn create(dir: &Path, name: &str) -> Result<(PathBuf, io::BufWriter<File>)> {
    let path = dir.join(name);
    let file = File::create(&path)?;
    Ok((path, io::BufWriter::new(file)))
}

/// Writes every output of a run into `dir`, creating it if needed.
///
/// `subclass_rr.csv` is written only when subclasses were allocated and
/// `precalc_period_mapping.csv` only when the ratios were recomputed.
///
/// # Errors
///
/// Returns an `Io`, `Csv`, or `Json` error on the first failed write.
pub fn write_outputs(dir: &Path, result: &RunResult) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let (path, w) = create(dir, SHIFTED_LOAD_FILE)?;
    write_shifted_load(&result.shifted_load, w)?;
    written.push(path);

    let (path, w) = create(dir, TRACKER_FILE)?;
    write_tracker(&result.tracker, w)?;
    written.push(path);

    let (path, mut w) = create(dir, COSTS_FILE)?;
    write_costs_json(result.revenue.costs_by_type(), &mut w)?;
    w.flush()?;
    written.push(path);

    let subclass_rr = result.revenue.subclass_rr();
    if !subclass_rr.is_empty() {
        let (path, w) = create(dir, SUBCLASS_RR_FILE)?;
        write_subclass_rr(subclass_rr, w)?;
        written.push(path);
    }

    if let Some(mapping) = &result.precalc_mapping {
        let (path, w) = create(dir, PRECALC_MAPPING_FILE)?;
        write_precalc_mapping(mapping, w)?;
        written.push(path);
    }

    info!(dir = %dir.display(), files = written.len(), "outputs written");
    Ok(written)
}
