//! Canonical per-vehicle aggregate rows.
//!
//! Upstream loaders hand over loosely named JSON objects. [`normalize`] maps
//! them onto [`VehicleAggregateRecord`], dropping rows without an equipment id.

use serde::Serialize;
use serde_json::Value;

use crate::locale::parse_locale_number;

const EQUIPMENT_ID_KEYS: &[&str] =
    &["equipmentId", "equipment_id", "vehicleId", "vehicle_id", "id"];
const LABEL_KEYS: &[&str] = &["label", "name", "plate"];
const CATEGORY_KEYS: &[&str] = &["category", "categoryName", "group"];
const FUEL_LITERS_KEYS: &[&str] = &["fuelLitersTotal", "fuelLiters", "liters"];
const FUEL_VALUE_KEYS: &[&str] = &["fuelValueTotal", "fuelValue", "fuelCost"];
const QUANTITY_KEYS: &[&str] = &["quantityTotal", "quantity"];
const ORDER_ID_KEYS: &[&str] = &["orderIds", "order_ids", "workOrders"];

/// Raw material-cost values as found on the source row, in precedence order.
///
/// Each field is `Some` only when the raw key was present and non-null.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaterialAliases {
    pub value_total: Option<f64>,
    pub cost_total: Option<f64>,
    pub total: Option<f64>,
}

impl MaterialAliases {
    fn from_row(row: &Value) -> Self {
        let present = |key: &str| match row.get(key) {
            None | Some(Value::Null) => None,
            Some(v) => Some(parse_locale_number(v)),
        };

        Self {
            value_total: present("materialValueTotal"),
            cost_total: present("materialCostTotal"),
            total: present("materialTotal"),
        }
    }
}

/// One vehicle's fuel and material totals for a date window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VehicleAggregateRecord {
    pub equipment_id: String,
    pub label: String,
    pub category: String,
    pub fuel_liters_total: f64,
    pub fuel_value_total: f64,
    pub material_value_total: f64,
    pub quantity_total: f64,
    #[serde(skip)]
    pub order_ids: Vec<String>,
    #[serde(skip)]
    pub material_aliases: MaterialAliases,
}

impl VehicleAggregateRecord {
    /// Builds a record from a single raw row, or `None` when it has no
    /// usable equipment id.
    pub fn from_row(row: &Value) -> Option<Self> {
        let equipment_id = first_text(row, EQUIPMENT_ID_KEYS)?;
        let label = first_text(row, LABEL_KEYS).unwrap_or_else(|| equipment_id.clone());
        let category = first_text(row, CATEGORY_KEYS).unwrap_or_default();

        let mut record = Self {
            equipment_id,
            label,
            category,
            fuel_liters_total: first_number(row, FUEL_LITERS_KEYS),
            fuel_value_total: first_number(row, FUEL_VALUE_KEYS),
            material_value_total: 0.0,
            quantity_total: first_number(row, QUANTITY_KEYS),
            order_ids: order_ids(row),
            material_aliases: MaterialAliases::from_row(row),
        };
        record.material_value_total = crate::kpi::resolve_material_value(&record);

        Some(record)
    }
}

/// Normalizes raw rows, preserving input order.
pub fn normalize(raw_rows: &[Value]) -> Vec<VehicleAggregateRecord> {
    raw_rows
        .iter()
        .filter_map(VehicleAggregateRecord::from_row)
        .collect()
}

/// Renders a scalar as trimmed text; blanks and non-scalars yield `None`.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn first_present<'a>(row: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| row.get(*key))
        .find(|v| !v.is_null())
}

fn first_text(row: &Value, keys: &[&str]) -> Option<String> {
    first_present(row, keys).and_then(scalar_text)
}

fn first_number(row: &Value, keys: &[&str]) -> f64 {
    first_present(row, keys).map(parse_locale_number).unwrap_or(0.0)
}

fn order_ids(row: &Value) -> Vec<String> {
    match first_present(row, ORDER_ID_KEYS) {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
        Some(single) => scalar_text(single).into_iter().collect(),
        None => Vec::new(),
    }
}
