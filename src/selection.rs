//! Canonical filter state for the dashboard.
//!
//! [`normalize`] accepts whatever the UI hands over (including a previously
//! serialized [`Selection`]) and is idempotent.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::locale::{Boundary, parse_date_boundary};
use crate::vehicles::{VehicleAggregateRecord, scalar_text};

const VEHICLE_KEYS: &[&str] = &["vehicleKeys", "vehicle_keys", "vehicles"];
const CATEGORY_KEYS: &[&str] = &["categoryKeys", "category_keys", "categories"];
const DATE_FROM_KEYS: &[&str] = &["dateFrom", "date_from", "from"];
const DATE_TO_KEYS: &[&str] = &["dateTo", "date_to", "to"];

/// Vehicle and category filters plus a date window.
///
/// An empty key set matches everything for that dimension. When both dates
/// are set, `date_from <= date_to`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub vehicle_keys: BTreeSet<String>,
    pub category_keys: BTreeSet<String>,
    pub date_from: Option<NaiveDateTime>,
    pub date_to: Option<NaiveDateTime>,
}

impl Selection {
    /// The match-all selection.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn normalize(raw: &Value) -> Self {
        normalize(raw)
    }

    pub fn matches(&self, record: &VehicleAggregateRecord) -> bool {
        matches(record, self)
    }
}

/// Builds a [`Selection`] from raw UI state. Non-objects yield [`Selection::all`].
pub fn normalize(raw: &Value) -> Selection {
    let Some(obj) = raw.as_object() else {
        return Selection::all();
    };

    let mut date_from = parse_date_boundary(lookup(obj, DATE_FROM_KEYS), Boundary::Start);
    let mut date_to = parse_date_boundary(lookup(obj, DATE_TO_KEYS), Boundary::End);

    // Reversed windows are swapped and re-pinned to their new boundaries.
    if let (Some(from), Some(to)) = (date_from, date_to) {
        if from > to {
            date_from = Some(Boundary::Start.apply(to.date()));
            date_to = Some(Boundary::End.apply(from.date()));
        }
    }

    Selection {
        vehicle_keys: key_set(lookup(obj, VEHICLE_KEYS)),
        category_keys: key_set(lookup(obj, CATEGORY_KEYS)),
        date_from,
        date_to,
    }
}

/// Vehicle/category membership test. Dates are not checked here: rows are
/// produced for the requested window upstream.
pub fn matches(record: &VehicleAggregateRecord, selection: &Selection) -> bool {
    (selection.vehicle_keys.is_empty() || selection.vehicle_keys.contains(&record.equipment_id))
        && (selection.category_keys.is_empty()
            || selection.category_keys.contains(&record.category))
}

static NULL: Value = Value::Null;

fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> &'a Value {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
        .unwrap_or(&NULL)
}

fn key_set(value: &Value) -> BTreeSet<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        other => scalar_text(other).into_iter().collect(),
    }
}
