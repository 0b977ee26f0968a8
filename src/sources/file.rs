use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{DateRange, MaterialCostSource, VehicleRowSource};
use crate::costs::CostItem;
use crate::fetch::rows_from_json;
use crate::locale::{Boundary, parse_date_boundary};
use crate::vehicles::scalar_text;

async fn read_rows(path: &Path) -> Result<Vec<Value>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    rows_from_json(value)
}

/// Rows carrying a parseable `date` outside `range` are excluded; rows
/// without one are assumed to be pre-scoped.
fn in_range(row: &Value, range: &DateRange) -> bool {
    match row.get("date").and_then(|d| parse_date_boundary(d, Boundary::Start)) {
        Some(date) => range.contains(date.date()),
        None => true,
    }
}

/// Vehicle rows from a JSON file (array, or object with `rows`/`items`/`data`).
pub struct JsonFileRowSource {
    path: PathBuf,
}

impl JsonFileRowSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl VehicleRowSource for JsonFileRowSource {
    async fn load_rows(&self, range: &DateRange) -> Result<Vec<Value>> {
        let rows: Vec<Value> = read_rows(&self.path)
            .await?
            .into_iter()
            .filter(|row| in_range(row, range))
            .collect();
        debug!(path = %self.path.display(), rows = rows.len(), "Vehicle rows read");
        Ok(rows)
    }
}

/// Cost lines from a JSON file, filtered to the requested orders, vehicle
/// (when a line names one) and window (when a line is dated).
pub struct JsonFileCostSource {
    path: PathBuf,
}

impl JsonFileCostSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl MaterialCostSource for JsonFileCostSource {
    async fn fetch_costs(
        &self,
        vehicle_id: &str,
        range: &DateRange,
        order_ids: &[String],
    ) -> Result<Vec<CostItem>> {
        let wanted: HashSet<&str> = order_ids.iter().map(String::as_str).collect();

        let items: Vec<CostItem> = read_rows(&self.path)
            .await?
            .iter()
            .filter(|line| in_range(line, range))
            .filter(|line| {
                line.get("vehicleId")
                    .and_then(scalar_text)
                    .is_none_or(|v| v == vehicle_id)
            })
            .map(CostItem::from_raw)
            .filter(|item| wanted.contains(item.order_id.as_str()))
            .collect();

        debug!(vehicle_id, orders = order_ids.len(), items = items.len(), "Cost lines read");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    fn june() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        )
    }

    fn json_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_row_file_filters_dated_rows() {
        let file = json_file(
            r#"{"rows": [
                {"equipmentId": "V1", "date": "2024-06-10"},
                {"equipmentId": "V2", "date": "15/07/2024"},
                {"equipmentId": "V3"}
            ]}"#,
        );

        let rows = JsonFileRowSource::new(file.path()).load_rows(&june()).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["equipmentId"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["V1", "V3"]);
    }

    #[tokio::test]
    async fn test_missing_row_file_is_an_error() {
        let source = JsonFileRowSource::new("/definitely/not/here.json");
        let err = source.load_rows(&june()).await.unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[tokio::test]
    async fn test_cost_file_filters_orders_and_vehicle() {
        let file = json_file(
            r#"[
                {"orderId": "O1", "vehicleId": "V1", "totalValue": "10,00"},
                {"orderId": "O1", "vehicleId": "V2", "totalValue": 99},
                {"orderId": "O2", "quantity": 2, "unitCost": 4},
                {"orderId": "O3", "totalValue": 5},
                {"orderId": "O2", "date": "2023-01-01", "totalValue": 1000}
            ]"#,
        );
        let source = JsonFileCostSource::new(file.path());
        let ids = vec!["O1".to_string(), "O2".to_string()];

        let items = source.fetch_costs("V1", &june(), &ids).await.unwrap();
        let totals: Vec<_> = items.iter().map(|i| (i.order_id.as_str(), i.total_value)).collect();
        assert_eq!(totals, vec![("O1", 10.0), ("O2", 8.0)]);
    }
}
