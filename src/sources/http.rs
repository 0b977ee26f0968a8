use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{DateRange, MaterialCostSource, VehicleRowSource};
use crate::costs::CostItem;
use crate::fetch::{HttpClient, get_json, post_json, rows_from_json};

/// Reads vehicle rows from `GET <base_url>?from=YYYY-MM-DD&to=YYYY-MM-DD`.
pub struct HttpRowSource {
    client: Arc<dyn HttpClient>,
    base_url: String,
}

impl HttpRowSource {
    pub fn new(client: Arc<dyn HttpClient>, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }

    fn url_for(&self, range: &DateRange) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .with_context(|| format!("invalid rows URL '{}'", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("from", &range.from.format("%Y-%m-%d").to_string())
            .append_pair("to", &range.to.format("%Y-%m-%d").to_string());
        Ok(url)
    }
}

#[async_trait::async_trait]
impl VehicleRowSource for HttpRowSource {
    async fn load_rows(&self, range: &DateRange) -> Result<Vec<Value>> {
        let url = self.url_for(range)?;
        let rows = rows_from_json(get_json(self.client.as_ref(), url.as_str()).await?)?;
        debug!(url = %url, rows = rows.len(), "Vehicle rows fetched");
        Ok(rows)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CostQuery<'a> {
    vehicle_id: &'a str,
    from: String,
    to: String,
    order_ids: &'a [String],
}

/// Reads cost lines by POSTing `{vehicleId, from, to, orderIds}` to `url`.
pub struct HttpCostSource {
    client: Arc<dyn HttpClient>,
    url: String,
}

impl HttpCostSource {
    pub fn new(client: Arc<dyn HttpClient>, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl MaterialCostSource for HttpCostSource {
    async fn fetch_costs(
        &self,
        vehicle_id: &str,
        range: &DateRange,
        order_ids: &[String],
    ) -> Result<Vec<CostItem>> {
        let query = CostQuery {
            vehicle_id,
            from: range.from.format("%Y-%m-%d").to_string(),
            to: range.to.format("%Y-%m-%d").to_string(),
            order_ids,
        };

        let lines = rows_from_json(post_json(self.client.as_ref(), &self.url, &query).await?)?;
        debug!(vehicle_id, orders = order_ids.len(), lines = lines.len(), "Cost lines fetched");
        Ok(lines.iter().map(CostItem::from_raw).collect())
    }
}
