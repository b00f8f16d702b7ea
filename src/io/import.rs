//! CSV import for load, rate, marginal-cost, and precalc mapping tables.
//!
//! Every reader checks the header for required columns before deserializing a
//! single row, so a malformed table fails with `MissingColumn` rather than a
//! row-level parse error.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::info;

use crate::error::{FlexError, Result};
use crate::load::{HourlyLoadRecord, LoadTable};
use crate::revenue::calculator::{MarginalCostCurve, MarginalCostRecord};
use crate::revenue::precalc::{PrecalcMapping, PrecalcMappingRecord};
use crate::tariff::{RateRecord, RateStructure};

pub const LOAD_COLUMNS: &[&str] = &["building_id", "hour", "energy_period", "tier", "kwh"];
pub const RATE_COLUMNS: &[&str] = &["energy_period", "tier", "rate"];
pub const MARGINAL_COST_COLUMNS: &[&str] = &["hour", "marginal_cost"];
pub const PRECALC_COLUMNS: &[&str] = &["energy_period", "tier", "rel_value"];

/// Deserializes every row of `reader` after checking `required` columns.
///
/// # Errors
///
/// Returns `MissingColumn` for the first absent column, or `Csv` when a row
/// does not parse.
pub fn read_records<T, R>(
    table: &'static str,
    required: &[&'static str],
    reader: R,
) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    R: Read,
{
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    if let Some(&column) = required.iter().find(|c| !headers.iter().any(|h| h == **c)) {
        return Err(FlexError::MissingColumn { table, column });
    }
    let records = rdr
        .deserialize()
        .collect::<std::result::Result<Vec<T>, csv::Error>>()?;
    Ok(records)
}

fn open(path: &Path) -> Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path)?))
}

/// # Errors
///
/// Returns `MissingColumn`, `Csv`, or the `InvalidInput` raised by
/// [`LoadTable::from_records`].
pub fn read_load_table(reader: impl Read) -> Result<LoadTable> {
    let records: Vec<HourlyLoadRecord> = read_records("load", LOAD_COLUMNS, reader)?;
    let rows = records.len();
    let table = LoadTable::from_records(records)?;
    info!(rows, buildings = table.len(), "load table read");
    Ok(table)
}

/// # Errors
///
/// See [`read_load_table`]; also fails when the file cannot be opened.
pub fn read_load_table_path(path: &Path) -> Result<LoadTable> {
    read_load_table(open(path)?)
}

/// # Errors
///
/// Returns `MissingColumn`, `Csv`, or `InvalidInput` for duplicate keys.
pub fn read_rate_structure(reader: impl Read) -> Result<RateStructure> {
    let records: Vec<RateRecord> = read_records("rates", RATE_COLUMNS, reader)?;
    RateStructure::from_records(records)
}

/// # Errors
///
/// See [`read_rate_structure`]; also fails when the file cannot be opened.
pub fn read_rate_structure_path(path: &Path) -> Result<RateStructure> {
    read_rate_structure(open(path)?)
}

/// Reads an hourly marginal-cost table; unlisted hours cost nothing.
///
/// # Errors
///
/// Returns `MissingColumn`, `Csv`, or `InvalidInput` for bad hours.
pub fn read_marginal_costs(table: &'static str, reader: impl Read) -> Result<MarginalCostCurve> {
    let records: Vec<MarginalCostRecord> = read_records(table, MARGINAL_COST_COLUMNS, reader)?;
    MarginalCostCurve::from_records(table, records)
}

/// # Errors
///
/// See [`read_marginal_costs`]; also fails when the file cannot be opened.
pub fn read_marginal_costs_path(table: &'static str, path: &Path) -> Result<MarginalCostCurve> {
    read_marginal_costs(table, open(path)?)
}

/// # Errors
///
/// Returns `MissingColumn`, `Csv`, or `InvalidInput` for bad values.
pub fn read_precalc_mapping(reader: impl Read) -> Result<PrecalcMapping> {
    let records: Vec<PrecalcMappingRecord> =
        read_records("precalc_mapping", PRECALC_COLUMNS, reader)?;
    PrecalcMapping::from_records(records)
}

/// # Errors
///
/// See [`read_precalc_mapping`]; also fails when the file cannot be opened.
pub fn read_precalc_mapping_path(path: &Path) -> Result<PrecalcMapping> {
    read_precalc_mapping(open(path)?)
}
