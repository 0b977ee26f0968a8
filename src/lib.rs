//! Fleet cost and KPI aggregation.
//!
//! Raw per-vehicle rows are normalized ([`vehicles`]), filtered by a
//! [`selection::Selection`] and reduced into [`kpi::KpiTotals`]. Material
//! costs can be refined against work orders fetched in concurrent batches
//! ([`costs`]). [`dashboard::Dashboard`] wires both to external sources.

pub mod config;
pub mod costs;
pub mod dashboard;
pub mod fetch;
pub mod kpi;
pub mod locale;
pub mod logging;
pub mod output;
pub mod selection;
pub mod settings;
pub mod sources;
pub mod vehicles;
