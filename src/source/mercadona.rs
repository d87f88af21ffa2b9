//! Mercadona source
//!
//! Session-cookie bootstrap followed by the store's JSON API. Setup visits
//! the storefront so the client holds the cookies the API expects, then
//! selects the warehouse by postal code. The category tree comes from
//! `GET {api}/categories/` and stubs are resolved with
//! `GET {api}/categories/{id}/`.

use crate::config::{MercadonaConfig, ScrapingConfig, UserAgentConfig};
use crate::model::{price_from_json, Item, SourceTag};
use crate::source::http::{build_http_client, HttpSession};
use crate::source::walker::{walk_catalog, CatalogClient, CategoryNode, WalkerConfig};
use crate::source::{ItemStream, Source};
use crate::{RecordParseError, SourceError, SourceResult};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;

/// House brands recognized in product names when the payload carries no brand
const HOUSE_BRANDS: [&str; 6] = [
    "Hacendado",
    "Deliplus",
    "Bosque Verde",
    "Compy",
    "Solcare",
    "Pollix",
];

/// Scrapes the Mercadona online store
pub struct MercadonaSource {
    config: MercadonaConfig,
    scraping: ScrapingConfig,
    user_agent: UserAgentConfig,
    catalog: Option<Arc<MercadonaCatalog>>,
    consumed: bool,
}

impl MercadonaSource {
    pub fn new(
        config: MercadonaConfig,
        scraping: ScrapingConfig,
        user_agent: UserAgentConfig,
    ) -> Self {
        Self {
            config,
            scraping,
            user_agent,
            catalog: None,
            consumed: false,
        }
    }

    async fn establish_session(&self) -> SourceResult<MercadonaCatalog> {
        let client = build_http_client(&self.user_agent, self.scraping.timeout(), true)
            .map_err(|e| SourceError::Unavailable(format!("cannot build HTTP client: {}", e)))?;
        let session = HttpSession::new(client, self.scraping.retry_attempts);

        tracing::info!(url = %self.config.base_url, "Connecting to storefront");
        session
            .get_text(&self.config.base_url)
            .await
            .map_err(|e| SourceError::Unavailable(format!("storefront unreachable: {}", e)))?;

        let api_url = self.config.api_url.trim_end_matches('/').to_string();
        let change_pc = format!("{}/postal-codes/actions/change-pc/", api_url);
        match session
            .put_json(&change_pc, &json!({ "new_postal_code": self.config.postal_code }))
            .await
        {
            Ok(()) => {
                tracing::info!(postal_code = %self.config.postal_code, "Postal code selected")
            }
            Err(e) => {
                tracing::debug!(error = %e, "Postal code not accepted, using default warehouse")
            }
        }

        Ok(MercadonaCatalog {
            session,
            api_url,
            base_url: self.config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Source for MercadonaSource {
    fn tag(&self) -> SourceTag {
        SourceTag::Mercadona
    }

    async fn setup(&mut self) -> SourceResult<()> {
        let catalog = self.establish_session().await?;
        self.catalog = Some(Arc::new(catalog));
        tracing::info!("Session established with Mercadona");
        Ok(())
    }

    fn produce_items(&mut self) -> ItemStream<'_> {
        if self.consumed {
            return stream::once(async { Err(SourceError::AlreadyConsumed) }).boxed();
        }
        match self.catalog.clone() {
            Some(catalog) => {
                self.consumed = true;
                walk_catalog(catalog, WalkerConfig::from_scraping(&self.scraping))
            }
            None => stream::once(async { Err(SourceError::NotReady) }).boxed(),
        }
    }

    async fn teardown(&mut self) -> SourceResult<()> {
        self.catalog = None;
        Ok(())
    }
}

/// API access for one established session
struct MercadonaCatalog {
    session: HttpSession,
    api_url: String,
    base_url: String,
}

#[async_trait]
impl CatalogClient for MercadonaCatalog {
    type Payload = Value;

    async fn root_categories(&self) -> SourceResult<Vec<CategoryNode<Value>>> {
        let url = format!("{}/categories/", self.api_url);
        let data: Value = self.session.get_json(&url).await?;

        let roots = match &data {
            Value::Object(map) => map.get("results").and_then(Value::as_array),
            Value::Array(list) => Some(list),
            _ => None,
        }
        .ok_or_else(|| SourceError::Decode {
            url: url.clone(),
            message: "expected a category list".to_string(),
        })?;

        Ok(roots.iter().filter_map(category_from_json).collect())
    }

    async fn category_detail(&self, id: &str) -> SourceResult<Option<CategoryNode<Value>>> {
        let url = format!("{}/categories/{}/", self.api_url, id);
        match self.session.get_json::<Value>(&url).await {
            Ok(data) => Ok(category_from_json(&data)),
            Err(SourceError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn parse_item(&self, payload: &Value, breadcrumb: &str) -> Result<Item, RecordParseError> {
        parse_mercadona_product(payload, breadcrumb, &self.base_url)
    }
}

/// Builds a tree node from a category object, inline subcategories included
fn category_from_json(value: &Value) -> Option<CategoryNode<Value>> {
    let id = json_id(value.get("id"))?;
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("Sin nombre")
        .to_string();

    let children = value
        .get("categories")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(category_from_json).collect())
        .unwrap_or_default();

    let items = value
        .get("products")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    Some(CategoryNode {
        id,
        name,
        children,
        items,
    })
}

/// Ids arrive as numbers for categories and as strings for products
fn json_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Normalizes one product object from the category API
///
/// # Arguments
///
/// * `raw` - The product object
/// * `breadcrumb` - Category path the product was found under
/// * `base_url` - Storefront root used for the fallback product URL
pub fn parse_mercadona_product(
    raw: &Value,
    breadcrumb: &str,
    base_url: &str,
) -> Result<Item, RecordParseError> {
    let id = json_id(raw.get("id")).ok_or(RecordParseError::MissingField("id"))?;

    let mut name = json_str(raw, "display_name")
        .or_else(|| json_str(raw, "name"))
        .unwrap_or_default()
        .trim()
        .to_string();
    if let Some(packaging) = json_str(raw, "packaging") {
        if !name.contains(packaging) {
            name = format!("{} {}", name, packaging).trim().to_string();
        }
    }

    let prices = raw.get("price_instructions");
    let price = price_from_json(prices.and_then(|p| p.get("unit_price")))?;
    let reference_price = price_from_json(prices.and_then(|p| p.get("reference_price"))).ok();
    let unit = prices
        .and_then(|p| json_str(p, "reference_format"))
        .map(|format| format.replace("€/", ""));

    let image_url = json_str(raw, "thumbnail").map(|thumb| thumb.replace("_300.", "_600."));
    let product_url = json_str(raw, "share_url")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}/product/{}", base_url, id));
    let barcode = json_str(raw, "ean").or_else(|| json_str(raw, "gtin"));
    let available = raw.get("published").and_then(Value::as_bool).unwrap_or(true);

    let item = Item::new(id, SourceTag::Mercadona, &name, price)?;
    let brand = extract_brand(raw, &item.name);

    Ok(item
        .with_brand(brand)
        .with_price_per_unit(reference_price, unit.as_deref())
        .with_category(breadcrumb)
        .with_urls(image_url, Some(product_url))
        .with_availability(available)
        .with_barcode(barcode))
}

fn extract_brand<'a>(raw: &'a Value, name: &str) -> Option<&'a str> {
    if let Some(brand) = json_str(raw, "brand").or_else(|| json_str(raw, "manufacturer")) {
        return Some(brand);
    }

    let lower = name.to_lowercase();
    HOUSE_BRANDS
        .iter()
        .find(|brand| lower.contains(&brand.to_lowercase()))
        .copied()
}
