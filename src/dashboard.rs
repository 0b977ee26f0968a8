//! One dashboard refresh: load rows for the window, normalize, total, and
//! optionally swap in order-matched material costs.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, TimeDelta};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::FleetConfig;
use crate::costs::{OrderCostAggregate, load_for_vehicle, prepare_order_ids};
use crate::kpi::{KpiTotals, compute_totals, order_ids_for};
use crate::selection::{Selection, matches};
use crate::sources::{DateRange, MaterialCostSource, VehicleRowSource};
use crate::vehicles::{self, VehicleAggregateRecord};

/// Result of a single [`Dashboard::refresh`].
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub range: DateRange,
    pub records: Vec<VehicleAggregateRecord>,
    pub totals: KpiTotals,
    /// Present when materials were reconciled against work orders.
    pub order_costs: Option<OrderCostAggregate>,
}

/// Resolves the fetch window for `selection`. Open bounds are filled from
/// `today` and a window of `window_days` days.
pub fn resolve_window(selection: &Selection, today: NaiveDate, window_days: i64) -> DateRange {
    // Windows reaching past the calendar start saturate at `NaiveDate::MIN`.
    let window_ending = |end: NaiveDate| {
        let start = TimeDelta::try_days(window_days.max(1) - 1)
            .and_then(|span| end.checked_sub_signed(span))
            .unwrap_or(NaiveDate::MIN);
        DateRange::new(start, end)
    };
    let from = selection.date_from.map(|d| d.date());
    let to = selection.date_to.map(|d| d.date());

    match (from, to) {
        (Some(from), Some(to)) => DateRange::new(from, to),
        (Some(from), None) => DateRange::new(from, today.max(from)),
        (None, Some(to)) => window_ending(to),
        (None, None) => window_ending(today),
    }
}

pub struct Dashboard {
    config: FleetConfig,
    rows: Arc<dyn VehicleRowSource>,
    costs: Option<Arc<dyn MaterialCostSource>>,
}

impl Dashboard {
    pub fn new(
        config: FleetConfig,
        rows: Arc<dyn VehicleRowSource>,
        costs: Option<Arc<dyn MaterialCostSource>>,
    ) -> Self {
        Self { config, rows, costs }
    }

    pub fn window_for(&self, selection: &Selection, today: NaiveDate) -> DateRange {
        resolve_window(selection, today, self.config.default_window_days)
    }

    pub async fn refresh(&self, selection: &Selection) -> Result<DashboardSnapshot> {
        self.refresh_at(selection, Local::now().date_naive()).await
    }

    /// Like [`Dashboard::refresh`] with an explicit "today". Only a failing
    /// row source is reported as an error.
    #[tracing::instrument(skip_all, fields(from, to))]
    pub async fn refresh_at(
        &self,
        selection: &Selection,
        today: NaiveDate,
    ) -> Result<DashboardSnapshot> {
        let range = self.window_for(selection, today);
        tracing::Span::current()
            .record("from", tracing::field::display(range.from))
            .record("to", tracing::field::display(range.to));

        let raw = self
            .rows
            .load_rows(&range)
            .await
            .context("failed to load vehicle rows")?;
        let records = vehicles::normalize(&raw);
        debug!(raw = raw.len(), normalized = records.len(), "Vehicle rows normalized");

        let mut totals = compute_totals(&records, selection);
        let mut order_costs = None;

        if let Some(costs) = self.costs.as_ref().filter(|_| self.config.reconcile_materials) {
            let reconciled = self
                .reconcile(costs.as_ref(), &records, selection, &range)
                .await;
            if let Some(aggregate) = reconciled {
                totals = totals.with_order_costs(&aggregate);
                order_costs = Some(aggregate);
            }
        }

        info!(
            matched = totals.matched_record_count,
            fuel_liters = totals.fuel_liters_total,
            fuel_value = totals.fuel_value_total,
            material_value = totals.material_value_total,
            "Dashboard totals computed"
        );

        Ok(DashboardSnapshot {
            range,
            records,
            totals,
            order_costs,
        })
    }

    /// Fetches order costs for the work orders referenced by matching
    /// vehicles. Each order is requested once, under the first vehicle that
    /// references it. Returns `None` when no vehicle references any order.
    async fn reconcile(
        &self,
        costs: &dyn MaterialCostSource,
        records: &[VehicleAggregateRecord],
        selection: &Selection,
        range: &DateRange,
    ) -> Option<OrderCostAggregate> {
        let referenced = prepare_order_ids(&order_ids_for(records, selection));
        if referenced.is_empty() {
            debug!("No work orders referenced, keeping row-level material totals");
            return None;
        }

        let mut claimed = HashSet::new();
        let assignments: Vec<(&str, Vec<String>)> = records
            .iter()
            .filter(|r| matches(r, selection))
            .filter_map(|r| {
                let ids: Vec<String> = prepare_order_ids(&r.order_ids)
                    .into_iter()
                    .filter(|id| claimed.insert(id.clone()))
                    .collect();
                (!ids.is_empty()).then_some((r.equipment_id.as_str(), ids))
            })
            .collect();
        debug!(
            orders = referenced.len(),
            vehicles = assignments.len(),
            "Reconciling material costs"
        );

        let per_vehicle = join_all(assignments.iter().map(|(vehicle_id, ids)| {
            load_for_vehicle(costs, vehicle_id, range, ids.as_slice(), self.config.batch_size)
        }))
        .await;

        let mut merged = OrderCostAggregate::default();
        for aggregate in per_vehicle {
            merged.merge(aggregate);
        }
        Some(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costs::CostItem;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    struct StaticRows(Vec<Value>, Mutex<Vec<DateRange>>);

    #[async_trait::async_trait]
    impl VehicleRowSource for StaticRows {
        async fn load_rows(&self, range: &DateRange) -> Result<Vec<Value>> {
            self.1.lock().unwrap().push(*range);
            Ok(self.0.clone())
        }
    }

    struct FailingRows;

    #[async_trait::async_trait]
    impl VehicleRowSource for FailingRows {
        async fn load_rows(&self, _range: &DateRange) -> Result<Vec<Value>> {
            anyhow::bail!("connection refused")
        }
    }

    /// Every order costs 10, except orders for vehicle V2 whose fetch fails.
    struct FlakyCosts;

    #[async_trait::async_trait]
    impl MaterialCostSource for FlakyCosts {
        async fn fetch_costs(
            &self,
            vehicle_id: &str,
            _range: &DateRange,
            order_ids: &[String],
        ) -> Result<Vec<CostItem>> {
            if vehicle_id == "V2" {
                anyhow::bail!("cost service unavailable");
            }
            Ok(order_ids.iter().map(|id| CostItem::with_total(id, 10.0)).collect())
        }
    }

    fn rows() -> Vec<Value> {
        vec![
            json!({
                "equipmentId": "V1", "category": "C1",
                "fuelLitersTotal": 100, "fuelValueTotal": 500, "materialValueTotal": 200,
                "orderIds": ["O1", "O2"],
            }),
            json!({
                "equipmentId": "V2", "category": "C1",
                "fuelLitersTotal": 50, "fuelValueTotal": 300, "materialValueTotal": 100,
                "orderIds": ["O3"],
            }),
            json!({
                "equipmentId": "V3", "category": "C2",
                "fuelLitersTotal": 10, "fuelValueTotal": 60, "materialValueTotal": 5,
            }),
        ]
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    fn dashboard(reconcile: bool) -> (Dashboard, Arc<StaticRows>) {
        let source = Arc::new(StaticRows(rows(), Mutex::default()));
        let config = FleetConfig {
            reconcile_materials: reconcile,
            default_window_days: 30,
            ..Default::default()
        };
        let dashboard = Dashboard::new(config, source.clone(), Some(Arc::new(FlakyCosts)));
        (dashboard, source)
    }

    #[tokio::test]
    async fn test_refresh_without_reconcile() {
        let (dashboard, source) = dashboard(false);
        let selection = Selection::normalize(&json!({"categories": ["C1"]}));

        let snapshot = dashboard.refresh_at(&selection, today()).await.unwrap();

        assert_eq!(snapshot.records.len(), 3);
        assert_eq!(snapshot.totals.matched_record_count, 2);
        assert_eq!(snapshot.totals.material_value_total, 300.0);
        assert!(snapshot.order_costs.is_none());

        let ranges = source.1.lock().unwrap();
        assert_eq!(ranges[0].from, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(ranges[0].to, today());
    }

    #[tokio::test]
    async fn test_refresh_reconciles_with_partial_failure() {
        crate::logging::init_test();
        let (dashboard, _) = dashboard(true);
        let selection = Selection::normalize(&json!({"categories": ["C1"]}));

        let snapshot = dashboard.refresh_at(&selection, today()).await.unwrap();
        let costs = snapshot.order_costs.unwrap();

        // V2's only chunk fails; V1 contributes O1 + O2.
        assert_eq!(costs.failed_chunks, 1);
        assert_eq!(costs.total, 20.0);
        assert_eq!(snapshot.totals.material_value_total, 20.0);
        assert_eq!(snapshot.totals.fuel_value_total, 800.0);
    }

    #[tokio::test]
    async fn test_reconcile_skipped_without_orders() {
        let (dashboard, _) = dashboard(true);
        let selection = Selection::normalize(&json!({"vehicles": ["V3"]}));

        let snapshot = dashboard.refresh_at(&selection, today()).await.unwrap();

        assert!(snapshot.order_costs.is_none());
        assert_eq!(snapshot.totals.material_value_total, 5.0);
    }

    #[tokio::test]
    async fn test_shared_order_counted_once() {
        let rows = vec![
            json!({"equipmentId": "V1", "category": "C1", "orderIds": ["O1", "O2"]}),
            json!({"equipmentId": "V4", "category": "C1", "orderIds": ["O1", " O5 "]}),
        ];
        let config = FleetConfig {
            reconcile_materials: true,
            ..Default::default()
        };
        let dashboard = Dashboard::new(
            config,
            Arc::new(StaticRows(rows, Mutex::default())),
            Some(Arc::new(FlakyCosts)),
        );

        let snapshot = dashboard.refresh_at(&Selection::all(), today()).await.unwrap();
        let costs = snapshot.order_costs.unwrap();

        assert_eq!(costs.by_order.get("O1"), Some(&10.0));
        assert_eq!(costs.by_order.get("O5"), Some(&10.0));
        assert_eq!(costs.items.len(), 3);
        assert_eq!(costs.total, 30.0);
        assert_eq!(snapshot.totals.material_value_total, 30.0);
    }

    #[tokio::test]
    async fn test_row_source_failure_is_reported() {
        let dashboard = Dashboard::new(FleetConfig::default(), Arc::new(FailingRows), None);
        let err = dashboard.refresh_at(&Selection::all(), today()).await.unwrap_err();
        assert!(format!("{err:#}").contains("connection refused"));
    }

    #[test]
    fn test_window_resolution() {
        let (dashboard, _) = dashboard(false);
        let day = |d| NaiveDate::from_ymd_opt(2024, 6, d).unwrap();

        let explicit = Selection::normalize(&json!({"from": "2024-06-03", "to": "2024-06-09"}));
        assert_eq!(dashboard.window_for(&explicit, today()), DateRange::new(day(3), day(9)));

        let open_end = Selection::normalize(&json!({"from": "2024-06-10"}));
        assert_eq!(dashboard.window_for(&open_end, today()), DateRange::new(day(10), today()));

        let open_start = Selection::normalize(&json!({"to": "2024-06-15"}));
        assert_eq!(
            dashboard.window_for(&open_start, today()),
            DateRange::new(NaiveDate::from_ymd_opt(2024, 5, 17).unwrap(), day(15))
        );
    }

    #[test]
    fn test_oversized_window_saturates() {
        let range = resolve_window(&Selection::all(), today(), 200_000_000);
        assert_eq!(range, DateRange::new(NaiveDate::MIN, today()));

        let range = resolve_window(&Selection::all(), today(), i64::MAX);
        assert_eq!(range.from, NaiveDate::MIN);

        let single_day = resolve_window(&Selection::all(), today(), 1);
        assert_eq!(single_day, DateRange::new(today(), today()));
    }
}
