//! Dashboard KPI reduction over normalized vehicle records.

use serde::Serialize;

use crate::costs::OrderCostAggregate;
use crate::selection::{Selection, matches};
use crate::vehicles::VehicleAggregateRecord;

type MaterialExtractor = fn(&VehicleAggregateRecord) -> Option<f64>;

/// Candidate sources for a record's material value, tried in order.
///
/// The first one that yields a finite number wins; values are never summed
/// across aliases. The canonical field is the last resort so hand-built
/// records without alias data still resolve.
static MATERIAL_VALUE_SOURCES: &[(&str, MaterialExtractor)] = &[
    ("materialValueTotal", alias_value_total),
    ("materialCostTotal", alias_cost_total),
    ("materialTotal", alias_total),
    ("material_value_total", canonical_material),
];

fn alias_value_total(r: &VehicleAggregateRecord) -> Option<f64> {
    r.material_aliases.value_total
}

fn alias_cost_total(r: &VehicleAggregateRecord) -> Option<f64> {
    r.material_aliases.cost_total
}

fn alias_total(r: &VehicleAggregateRecord) -> Option<f64> {
    r.material_aliases.total
}

fn canonical_material(r: &VehicleAggregateRecord) -> Option<f64> {
    Some(r.material_value_total)
}

/// Summary figures for the dashboard header.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiTotals {
    pub fuel_liters_total: f64,
    pub fuel_value_total: f64,
    pub material_value_total: f64,
    pub average_unit_price: f64,
    pub matched_record_count: usize,
}

impl KpiTotals {
    /// Replaces the coarse material total with the order-matched one.
    pub fn with_order_costs(self, costs: &OrderCostAggregate) -> Self {
        Self {
            material_value_total: costs.total,
            ..self
        }
    }
}

/// Resolves the material value of one record using first-present-wins
/// precedence over [`MATERIAL_VALUE_SOURCES`].
pub fn resolve_material_value(record: &VehicleAggregateRecord) -> f64 {
    MATERIAL_VALUE_SOURCES
        .iter()
        .find_map(|(_, extract)| extract(record).filter(|v| v.is_finite()))
        .unwrap_or(0.0)
}

/// Filters `records` by `selection` and reduces them into [`KpiTotals`].
///
/// Never fails: empty input or no matches yields all zeros.
pub fn compute_totals(records: &[VehicleAggregateRecord], selection: &Selection) -> KpiTotals {
    let mut totals = records
        .iter()
        .filter(|r| matches(r, selection))
        .fold(KpiTotals::default(), |mut acc, r| {
            acc.fuel_liters_total += finite_or_zero(r.fuel_liters_total);
            acc.fuel_value_total += finite_or_zero(r.fuel_value_total);
            acc.material_value_total += resolve_material_value(r);
            acc.matched_record_count += 1;
            acc
        });

    totals.average_unit_price = if totals.fuel_liters_total > 0.0 {
        totals.fuel_value_total / totals.fuel_liters_total
    } else {
        0.0
    };

    totals
}

/// Order ids referenced by the records that pass `selection`, in record order.
pub fn order_ids_for(records: &[VehicleAggregateRecord], selection: &Selection) -> Vec<String> {
    records
        .iter()
        .filter(|r| matches(r, selection))
        .flat_map(|r| r.order_ids.iter().cloned())
        .collect()
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}
