//! Output formatting and persistence for dashboard results.
//!
//! Supports JSON printing, a CSV export of the filtered vehicle rows and an
//! append-only CSV history of totals.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::dashboard::DashboardSnapshot;
use crate::kpi::KpiTotals;
use crate::selection::{Selection, matches};
use crate::vehicles::VehicleAggregateRecord;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// One line of the totals history file.
#[derive(Debug, Serialize)]
pub struct TotalsRow {
    pub generated_at: DateTime<Utc>,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub fuel_liters_total: f64,
    pub fuel_value_total: f64,
    pub material_value_total: f64,
    pub average_unit_price: f64,
    pub matched_record_count: usize,
}

impl TotalsRow {
    pub fn from_snapshot(snapshot: &DashboardSnapshot) -> Self {
        let KpiTotals {
            fuel_liters_total,
            fuel_value_total,
            material_value_total,
            average_unit_price,
            matched_record_count,
        } = snapshot.totals;

        Self {
            generated_at: Utc::now(),
            from: snapshot.range.from,
            to: snapshot.range.to,
            fuel_liters_total,
            fuel_value_total,
            material_value_total,
            average_unit_price,
            matched_record_count,
        }
    }
}

/// Logs any serializable value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Writes the records matching `selection` to a fresh CSV file.
pub fn write_records_csv(
    path: &str,
    records: &[VehicleAggregateRecord],
    selection: &Selection,
) -> Result<usize> {
    let mut writer = WriterBuilder::new().has_headers(true).from_path(path)?;

    let mut written = 0;
    for record in records.iter().filter(|r| matches(r, selection)) {
        writer.serialize(record)?;
        written += 1;
    }
    writer.flush()?;

    debug!(path, written, "Vehicle rows exported");
    Ok(written)
}

/// Appends a [`TotalsRow`] to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_totals(path: &str, row: &TotalsRow) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending totals record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(row)?;
    writer.flush()?;

    Ok(())
}
