//! External collaborators that feed the aggregation core.
//!
//! [`VehicleRowSource`] yields raw per-vehicle rows for a date window and
//! [`MaterialCostSource`] yields raw cost lines for a batch of work orders.
//! Both come in an HTTP flavour and a local JSON file flavour.

mod file;
mod http;

pub use file::{JsonFileCostSource, JsonFileRowSource};
pub use http::{HttpCostSource, HttpRowSource};

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::costs::CostItem;
use crate::fetch::HttpClient;

/// Inclusive calendar window handed to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// Builds a range, swapping the bounds when given in reverse.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        if from <= to {
            Self { from, to }
        } else {
            Self { from: to, to: from }
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// Loads raw per-vehicle aggregate rows for a window.
#[async_trait::async_trait]
pub trait VehicleRowSource: Send + Sync {
    async fn load_rows(&self, range: &DateRange) -> Result<Vec<Value>>;
}

/// Loads material cost lines for a vehicle's work orders in a window.
#[async_trait::async_trait]
pub trait MaterialCostSource: Send + Sync {
    async fn fetch_costs(
        &self,
        vehicle_id: &str,
        range: &DateRange,
        order_ids: &[String],
    ) -> Result<Vec<CostItem>>;
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Picks the HTTP source for URLs and the JSON file source otherwise.
pub fn open_row_source(location: &str, client: Arc<dyn HttpClient>) -> Box<dyn VehicleRowSource> {
    if is_remote(location) {
        Box::new(HttpRowSource::new(client, location))
    } else {
        Box::new(JsonFileRowSource::new(location))
    }
}

/// Picks the HTTP source for URLs and the JSON file source otherwise.
pub fn open_cost_source(
    location: &str,
    client: Arc<dyn HttpClient>,
) -> Box<dyn MaterialCostSource> {
    if is_remote(location) {
        Box::new(HttpCostSource::new(client, location))
    } else {
        Box::new(JsonFileCostSource::new(location))
    }
}
