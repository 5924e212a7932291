//! Notion-backed item catalog.
//!
//! Items are pages of one Notion database with the properties `Name` (title),
//! `Quantity`, `Redeemed` and `Price` (numbers) and an `Expired` checkbox.

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, warn};

use wexu_core::catalog::{CatalogError, ItemCatalog};
use wexu_core::domain::item::{CatalogItem, ItemId};

pub const NOTION_VERSION: &str = "2022-06-28";

/// Active items filter: everything whose `Expired` box is unchecked.
fn active_items_query(start_cursor: Option<&str>) -> Value {
    let mut query = json!({
        "filter": { "property": "Expired", "checkbox": { "equals": false } },
        "page_size": 100,
    });
    if let Some(cursor) = start_cursor {
        query["start_cursor"] = Value::String(cursor.to_owned());
    }
    query
}

fn number_property(properties: &Value, name: &str) -> Option<f64> {
    properties.get(name).and_then(|property| property.get("number")).and_then(Value::as_f64)
}

fn count_property(item_id: &str, properties: &Value, name: &str) -> Result<u32, CatalogError> {
    let Some(value) = number_property(properties, name) else {
        return Ok(0);
    };
    if value < 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return Err(CatalogError::Decode {
            item_id: item_id.to_owned(),
            reason: format!("`{name}` is not a whole non-negative number: {value}"),
        });
    }
    Ok(value as u32)
}

/// Maps one database page to a catalog item.
pub fn decode_page(page: &Value) -> Result<CatalogItem, CatalogError> {
    let id = page.get("id").and_then(Value::as_str).ok_or_else(|| CatalogError::Decode {
        item_id: "unknown".to_owned(),
        reason: "page has no id".to_owned(),
    })?;
    let decode_error =
        |reason: &str| CatalogError::Decode { item_id: id.to_owned(), reason: reason.to_owned() };
    let properties = page.get("properties").ok_or_else(|| decode_error("page has no properties"))?;

    let name = properties
        .get("Name")
        .and_then(|property| property.get("title"))
        .and_then(Value::as_array)
        .map(|fragments| {
            fragments
                .iter()
                .filter_map(|fragment| fragment.get("plain_text").and_then(Value::as_str))
                .collect::<String>()
        })
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| decode_error("`Name` title is empty"))?;

    let price = number_property(properties, "Price")
        .ok_or_else(|| decode_error("`Price` is missing"))
        .and_then(|value| {
            Decimal::try_from(value).map_err(|_| decode_error("`Price` is not a finite number"))
        })?;

    Ok(CatalogItem {
        id: ItemId::from(id),
        name,
        quantity: count_property(id, properties, "Quantity")?,
        redeemed: count_property(id, properties, "Redeemed")?,
        price,
    })
}

pub struct NotionCatalog {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    database_id: String,
}

impl NotionCatalog {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: SecretString,
        database_id: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { http, base_url, api_key, database_id: database_id.into() }
    }

    async fn read_response(response: reqwest::Response) -> Result<Value, CatalogError> {
        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = body.get("message").and_then(Value::as_str).unwrap_or("no message");
            return Err(CatalogError::Api(format!("HTTP {}: {message}", status.as_u16())));
        }
        response.json().await.map_err(|error| CatalogError::Transport(error.to_string()))
    }

    async fn query_page(&self, start_cursor: Option<&str>) -> Result<Value, CatalogError> {
        let response = self
            .http
            .post(format!("{}/databases/{}/query", self.base_url, self.database_id))
            .bearer_auth(self.api_key.expose_secret())
            .header("Notion-Version", NOTION_VERSION)
            .json(&active_items_query(start_cursor))
            .send()
            .await
            .map_err(|error| CatalogError::Transport(error.to_string()))?;
        Self::read_response(response).await
    }
}

#[async_trait]
impl ItemCatalog for NotionCatalog {
    async fn list_active_items(&self) -> Result<Vec<CatalogItem>, CatalogError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let body = self.query_page(cursor.as_deref()).await?;
            let results = body.get("results").and_then(Value::as_array).ok_or_else(|| {
                CatalogError::Api("database query returned no `results`".to_owned())
            })?;

            for page in results {
                match decode_page(page) {
                    Ok(item) => items.push(item),
                    Err(error) => warn!(
                        event_name = "catalog.notion.page_skipped",
                        error = %error,
                        "skipping malformed catalog page"
                    ),
                }
            }

            let has_more = body.get("has_more").and_then(Value::as_bool).unwrap_or(false);
            cursor = body.get("next_cursor").and_then(Value::as_str).map(str::to_owned);
            if !has_more || cursor.is_none() {
                break;
            }
        }

        debug!(event_name = "catalog.notion.listed", items = items.len(), "listed active items");
        Ok(items)
    }

    async fn set_redeemed(&self, item_id: &ItemId, redeemed: u32) -> Result<(), CatalogError> {
        let response = self
            .http
            .patch(format!("{}/pages/{}", self.base_url, item_id))
            .bearer_auth(self.api_key.expose_secret())
            .header("Notion-Version", NOTION_VERSION)
            .json(&json!({ "properties": { "Redeemed": { "number": redeemed } } }))
            .send()
            .await
            .map_err(|error| CatalogError::Transport(error.to_string()))?;
        Self::read_response(response).await?;
        Ok(())
    }
}
