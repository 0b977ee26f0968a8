mod client;
mod basic;
pub mod auth;

pub use client::HttpClient;
pub use basic::BasicClient;

use anyhow::{Result, anyhow};
use serde::Serialize;
use serde_json::Value;

/// GETs `url` and decodes the body as JSON.
pub async fn get_json<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Value> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);
    send_json(client, req).await
}

/// POSTs `body` as JSON to `url` and decodes the response as JSON.
pub async fn post_json<C: HttpClient + ?Sized, B: Serialize + ?Sized>(
    client: &C,
    url: &str,
    body: &B,
) -> Result<Value> {
    let mut req = reqwest::Request::new(reqwest::Method::POST, url.parse()?);
    *req.body_mut() = Some(serde_json::to_vec(body)?.into());
    req.headers_mut().insert(
        reqwest::header::CONTENT_TYPE,
        reqwest::header::HeaderValue::from_static("application/json"),
    );
    send_json(client, req).await
}

async fn send_json<C: HttpClient + ?Sized>(client: &C, req: reqwest::Request) -> Result<Value> {
    let url = req.url().to_string();
    let resp = client
        .execute(req)
        .await
        .map_err(|e| anyhow!("Failed to send request to {}: {}", url, e))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(anyhow!("{} returned status {}: {}", url, status, body));
    }

    resp.json()
        .await
        .map_err(|e| anyhow!("Failed to parse response from {}: {}", url, e))
}

/// Accepts either a bare JSON array or an object wrapping one under a
/// well-known key (`rows`, `items`, `data`).
pub fn rows_from_json(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut obj) => ["rows", "items", "data"]
            .iter()
            .find_map(|key| match obj.remove(*key) {
                Some(Value::Array(rows)) => Some(rows),
                _ => None,
            })
            .ok_or_else(|| anyhow!("expected a JSON array or an object with rows/items/data")),
        other => Err(anyhow!("expected a JSON array, got {}", kind(&other))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
