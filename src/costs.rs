//! Work-order material costs fetched in bounded concurrent batches.
//!
//! [`load`] deduplicates order ids, splits them into chunks of at most
//! `batch_size`, fetches every chunk concurrently and merges whatever came
//! back. A failing chunk (error or panic) only drops its own orders; the
//! call itself always resolves.

use futures::FutureExt;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, info, warn};

use crate::locale::parse_locale_number;
use crate::sources::{DateRange, MaterialCostSource};
use crate::vehicles::scalar_text;

/// Chunk size used when the caller does not pick one.
pub const DEFAULT_BATCH_SIZE: usize = 40;

const ORDER_ID_KEYS: &[&str] = &["orderId", "order_id", "order"];
const QUANTITY_KEYS: &[&str] = &["quantity", "qty"];
const UNIT_COST_KEYS: &[&str] = &["unitCost", "unit_cost", "unitPrice"];
const TOTAL_KEYS: &[&str] = &["totalValue", "total_value", "total"];

/// One material cost line attributed to a work order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostItem {
    pub order_id: String,
    pub quantity: f64,
    pub unit_cost: f64,
    pub total_value: f64,
}

impl CostItem {
    /// `total_value` is `declared_total` when given, else `quantity * unit_cost`.
    pub fn new(order_id: &str, quantity: f64, unit_cost: f64, declared_total: Option<f64>) -> Self {
        Self {
            order_id: order_id.to_string(),
            quantity,
            unit_cost,
            total_value: declared_total.unwrap_or(quantity * unit_cost),
        }
    }

    pub fn with_total(order_id: &str, total_value: f64) -> Self {
        Self::new(order_id, 0.0, 0.0, Some(total_value))
    }

    /// Reads a loosely shaped cost line. Missing fields become empty / zero.
    pub fn from_raw(raw: &Value) -> Self {
        let field = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| raw.get(*k))
                .find(|v| !v.is_null())
                .cloned()
        };

        let order_id = field(ORDER_ID_KEYS)
            .as_ref()
            .and_then(scalar_text)
            .unwrap_or_default();
        let quantity = field(QUANTITY_KEYS).map_or(0.0, |v| parse_locale_number(&v));
        let unit_cost = field(UNIT_COST_KEYS).map_or(0.0, |v| parse_locale_number(&v));
        let declared = field(TOTAL_KEYS).map(|v| parse_locale_number(&v));

        Self::new(&order_id, quantity, unit_cost, declared)
    }

    fn counts_toward_total(&self) -> bool {
        !self.order_id.trim().is_empty() && self.total_value.is_finite() && self.total_value != 0.0
    }
}

/// Merged result of one [`load`] call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderCostAggregate {
    /// Every line returned by successful chunks, including zero-value ones.
    pub items: Vec<CostItem>,
    pub by_order: BTreeMap<String, f64>,
    pub total: f64,
    /// Chunks whose fetch failed and contributed nothing.
    pub failed_chunks: usize,
}

impl OrderCostAggregate {
    pub fn from_items(items: Vec<CostItem>) -> Self {
        let mut aggregate = Self::default();
        for item in items {
            aggregate.push(item);
        }
        aggregate
    }

    /// Adds `item` to `items` and, when it carries an order id and a non-zero
    /// finite value, to `by_order` and `total`.
    pub fn push(&mut self, item: CostItem) {
        if item.counts_toward_total() {
            *self
                .by_order
                .entry(item.order_id.trim().to_string())
                .or_insert(0.0) += item.total_value;
            self.total += item.total_value;
        }
        self.items.push(item);
    }

    /// Additive merge, used when several vehicles are reconciled.
    pub fn merge(&mut self, other: OrderCostAggregate) {
        for (order_id, value) in other.by_order {
            *self.by_order.entry(order_id).or_insert(0.0) += value;
        }
        self.items.extend(other.items);
        self.total += other.total;
        self.failed_chunks += other.failed_chunks;
    }
}

/// Settled state of a single chunk fetch.
#[derive(Debug)]
pub enum ChunkOutcome {
    Loaded { index: usize, items: Vec<CostItem> },
    Failed { index: usize, size: usize, error: String },
}

/// Trims ids, drops blanks and removes exact duplicates, keeping first-seen
/// order. Comparison is case-sensitive.
pub fn prepare_order_ids<S: AsRef<str>>(order_ids: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    order_ids
        .iter()
        .map(|id| id.as_ref().trim())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

/// Splits ids into contiguous chunks of at most `batch_size`. A zero batch
/// size falls back to [`DEFAULT_BATCH_SIZE`].
pub fn chunk_order_ids(order_ids: &[String], batch_size: usize) -> Vec<Vec<String>> {
    let size = if batch_size == 0 { DEFAULT_BATCH_SIZE } else { batch_size };
    order_ids.chunks(size).map(<[String]>::to_vec).collect()
}

/// Fetches costs for `order_ids` through `fetch_batch`, one concurrent call
/// per chunk, and merges the successful results.
#[tracing::instrument(skip_all, fields(requested = order_ids.len(), batch_size = batch_size))]
pub async fn load<S, F, Fut>(
    order_ids: &[S],
    fetch_batch: F,
    batch_size: usize,
) -> OrderCostAggregate
where
    S: AsRef<str>,
    F: Fn(Vec<String>) -> Fut,
    Fut: Future<Output = anyhow::Result<Vec<CostItem>>>,
{
    let ids = prepare_order_ids(order_ids);
    if ids.is_empty() {
        debug!("No order ids to fetch");
        return OrderCostAggregate::default();
    }

    let chunks = chunk_order_ids(&ids, batch_size);
    debug!(unique = ids.len(), chunks = chunks.len(), "Fetching order cost chunks");

    let outcomes = join_all(
        chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| fetch_chunk(index, chunk, &fetch_batch)),
    )
    .await;

    let aggregate = merge_outcomes(outcomes);
    info!(
        orders = aggregate.by_order.len(),
        items = aggregate.items.len(),
        total = aggregate.total,
        failed_chunks = aggregate.failed_chunks,
        "Order costs merged"
    );
    aggregate
}

/// [`load`] against a [`MaterialCostSource`] for one vehicle and window.
pub async fn load_for_vehicle<C, S>(
    source: &C,
    vehicle_id: &str,
    range: &DateRange,
    order_ids: &[S],
    batch_size: usize,
) -> OrderCostAggregate
where
    C: MaterialCostSource + ?Sized,
    S: AsRef<str>,
{
    load(
        order_ids,
        move |ids| async move { source.fetch_costs(vehicle_id, range, &ids).await },
        batch_size,
    )
    .await
}

async fn fetch_chunk<F, Fut>(index: usize, chunk: Vec<String>, fetch_batch: &F) -> ChunkOutcome
where
    F: Fn(Vec<String>) -> Fut,
    Fut: Future<Output = anyhow::Result<Vec<CostItem>>>,
{
    let size = chunk.len();
    let attempt = AssertUnwindSafe(async move { fetch_batch(chunk).await }).catch_unwind();

    match attempt.await {
        Ok(Ok(items)) => ChunkOutcome::Loaded { index, items },
        Ok(Err(e)) => {
            warn!(chunk = index, size, error = %e, "Order cost chunk failed");
            ChunkOutcome::Failed { index, size, error: format!("{e:#}") }
        }
        Err(panic) => {
            let error = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "fetch panicked".to_string());
            warn!(chunk = index, size, error = %error, "Order cost chunk panicked");
            ChunkOutcome::Failed { index, size, error }
        }
    }
}

fn merge_outcomes(outcomes: Vec<ChunkOutcome>) -> OrderCostAggregate {
    let mut aggregate = OrderCostAggregate::default();
    for outcome in outcomes {
        match outcome {
            ChunkOutcome::Loaded { items, .. } => {
                for item in items {
                    aggregate.push(item);
                }
            }
            ChunkOutcome::Failed { .. } => aggregate.failed_chunks += 1,
        }
    }
    aggregate
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    type Calls = Arc<Mutex<Vec<Vec<String>>>>;

    fn recording_fetch(
        calls: Calls,
    ) -> impl Fn(Vec<String>) -> futures::future::Ready<anyhow::Result<Vec<CostItem>>> {
        move |ids| {
            calls.lock().unwrap().push(ids.clone());
            let items = ids.iter().map(|id| CostItem::with_total(id, 1.0)).collect();
            futures::future::ready(Ok(items))
        }
    }

    #[tokio::test]
    async fn test_ids_trimmed_deduped_case_sensitive() {
        let calls: Calls = Arc::default();
        let aggregate = load(&["A", " a ", "", "B", "A"], recording_fetch(calls.clone()), 40).await;

        assert_eq!(*calls.lock().unwrap(), vec![vec!["A", "a", "B"]]);
        assert_eq!(aggregate.by_order.len(), 3);
        assert_eq!(aggregate.total, 3.0);
    }

    #[tokio::test]
    async fn test_empty_input_skips_fetch() {
        let calls: Calls = Arc::default();
        let aggregate = load(&["", "   "], recording_fetch(calls.clone()), 40).await;

        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(aggregate, OrderCostAggregate::default());

        let none: [&str; 0] = [];
        assert_eq!(load(&none, recording_fetch(calls.clone()), 40).await.total, 0.0);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hundred_ids_make_three_chunks() {
        let ids: Vec<String> = (0..100).map(|i| format!("O{i}")).collect();
        let calls: Calls = Arc::default();
        let aggregate = load(&ids, recording_fetch(calls.clone()), 40).await;

        let mut sizes: Vec<_> = calls.lock().unwrap().iter().map(Vec::len).collect();
        sizes.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(sizes, vec![40, 40, 20]);
        assert_eq!(aggregate.total, 100.0);
        assert_eq!(aggregate.failed_chunks, 0);
    }

    #[test]
    fn test_chunks_are_contiguous() {
        let ids: Vec<String> = (0..5).map(|i| i.to_string()).collect();
        assert_eq!(
            chunk_order_ids(&ids, 2),
            vec![vec!["0", "1"], vec!["2", "3"], vec!["4"]]
        );
        assert_eq!(chunk_order_ids(&ids, 0).len(), 1);
    }

    #[tokio::test]
    async fn test_zero_value_lines_kept_in_items_only() {
        let fetch = |_ids: Vec<String>| async {
            Ok::<_, anyhow::Error>(vec![
                CostItem::with_total("O1", 30.0),
                CostItem::with_total("O1", 20.0),
                CostItem::with_total("O2", 0.0),
            ])
        };
        let aggregate = load(&["O1", "O2"], fetch, 40).await;

        assert_eq!(aggregate.by_order, BTreeMap::from([("O1".to_string(), 50.0)]));
        assert_eq!(aggregate.total, 50.0);
        assert_eq!(aggregate.items.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_order_id_and_non_finite_skipped() {
        let fetch = |_ids: Vec<String>| async {
            Ok::<_, anyhow::Error>(vec![
                CostItem::with_total("", 10.0),
                CostItem::with_total("O1", f64::NAN),
                CostItem::with_total("O1", f64::INFINITY),
                CostItem::with_total("O1", 4.0),
            ])
        };
        let aggregate = load(&["O1"], fetch, 40).await;

        assert_eq!(aggregate.total, 4.0);
        assert_eq!(aggregate.by_order.get("O1"), Some(&4.0));
        assert_eq!(aggregate.items.len(), 4);
    }

    #[tokio::test]
    async fn test_failed_chunk_does_not_block_siblings() {
        crate::logging::init_test();
        let fetch = |ids: Vec<String>| async move {
            if ids.contains(&"BAD".to_string()) {
                anyhow::bail!("upstream timeout");
            }
            Ok(ids.iter().map(|id| CostItem::with_total(id, 5.0)).collect())
        };
        let aggregate = load(&["G1", "G2", "BAD", "X", "G3"], fetch, 2).await;

        // chunks: [G1, G2] [BAD, X] [G3]
        assert_eq!(aggregate.failed_chunks, 1);
        let orders: Vec<_> = aggregate.by_order.keys().cloned().collect();
        assert_eq!(orders, vec!["G1", "G2", "G3"]);
        assert_eq!(aggregate.total, 15.0);
    }

    #[tokio::test]
    async fn test_panicking_chunk_is_contained() {
        crate::logging::init_test();
        let fetch = |ids: Vec<String>| async move {
            if ids[0] == "BOOM" {
                panic!("decoder exploded");
            }
            Ok::<_, anyhow::Error>(vec![CostItem::with_total(&ids[0], 7.0)])
        };
        let aggregate = load(&["BOOM", "OK"], fetch, 1).await;

        assert_eq!(aggregate.failed_chunks, 1);
        assert_eq!(aggregate.total, 7.0);
    }

    #[tokio::test]
    async fn test_chunks_run_concurrently() {
        // Every chunk waits on the same barrier: this only completes when all
        // three fetches are in flight at once.
        let barrier = Arc::new(tokio::sync::Barrier::new(3));
        let fetch = |ids: Vec<String>| {
            let barrier = barrier.clone();
            async move {
                barrier.wait().await;
                Ok::<_, anyhow::Error>(ids.iter().map(|id| CostItem::with_total(id, 1.0)).collect())
            }
        };
        let ids: Vec<String> = (0..9).map(|i| format!("O{i}")).collect();

        let aggregate =
            tokio::time::timeout(std::time::Duration::from_secs(5), load(&ids, fetch, 3))
                .await
                .expect("chunks were not fetched concurrently");
        assert_eq!(aggregate.total, 9.0);
    }

    #[test]
    fn test_cost_item_from_raw() {
        let declared = CostItem::from_raw(&json!({
            "orderId": " O1 ",
            "quantity": 2,
            "unitCost": "3,50",
            "totalValue": "R$ 10,00",
        }));
        assert_eq!(declared.order_id, "O1");
        assert_eq!(declared.total_value, 10.0);

        let derived = CostItem::from_raw(&json!({"order_id": 55, "qty": "2", "unit_cost": "3,50"}));
        assert_eq!(derived.order_id, "55");
        assert_eq!(derived.total_value, 7.0);

        let orphan = CostItem::from_raw(&json!({"total": 9}));
        assert_eq!(orphan.order_id, "");
        assert!(!orphan.counts_toward_total());
    }

    #[test]
    fn test_merge_is_additive() {
        let mut a = OrderCostAggregate::from_items(vec![CostItem::with_total("O1", 1.0)]);
        let mut b = OrderCostAggregate::from_items(vec![
            CostItem::with_total("O1", 2.0),
            CostItem::with_total("O2", 3.0),
        ]);
        b.failed_chunks = 1;
        a.merge(b);

        assert_eq!(a.by_order.get("O1"), Some(&3.0));
        assert_eq!(a.by_order.get("O2"), Some(&3.0));
        assert_eq!(a.total, 6.0);
        assert_eq!(a.items.len(), 3);
        assert_eq!(a.failed_chunks, 1);
    }
}
