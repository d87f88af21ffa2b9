//! Carrefour source
//!
//! Server-rendered HTML strategy: top-level categories come from the
//! configuration and every category page is fetched and scanned for product
//! cards.

use crate::config::{CarrefourConfig, CategoryEntry, ScrapingConfig, UserAgentConfig};
use crate::model::{parse_price, Item, SourceTag};
use crate::source::http::{build_http_client, HttpSession};
use crate::source::walker::{walk_catalog, CatalogClient, CategoryNode, WalkerConfig};
use crate::source::{ItemStream, Source};
use crate::{RecordParseError, SourceError, SourceResult};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use url::Url;

/// A product card as found on a category page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductCard {
    pub id: String,
    pub name: String,
    pub price_text: String,
    /// e.g. `"2,50 €/kg"`
    pub price_per_unit_text: Option<String>,
    pub image: Option<String>,
    /// Absolute product page URL
    pub href: Option<String>,
    pub available: bool,
}

/// Scrapes Carrefour category pages
pub struct CarrefourSource {
    config: CarrefourConfig,
    scraping: ScrapingConfig,
    user_agent: UserAgentConfig,
    catalog: Option<Arc<CarrefourCatalog>>,
    consumed: bool,
}

impl CarrefourSource {
    pub fn new(
        config: CarrefourConfig,
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
}

#[async_trait]
impl Source for CarrefourSource {
    fn tag(&self) -> SourceTag {
        SourceTag::Carrefour
    }

    async fn setup(&mut self) -> SourceResult<()> {
        let base = Url::parse(&self.config.base_url)
            .map_err(|e| SourceError::Unavailable(format!("invalid base URL: {}", e)))?;
        let client = build_http_client(&self.user_agent, self.scraping.timeout(), true)
            .map_err(|e| SourceError::Unavailable(format!("cannot build HTTP client: {}", e)))?;
        let session = HttpSession::new(client, self.scraping.retry_attempts);

        session
            .get_text(base.as_str())
            .await
            .map_err(|e| SourceError::Unavailable(format!("storefront unreachable: {}", e)))?;

        self.catalog = Some(Arc::new(CarrefourCatalog {
            session,
            base,
            categories: self.config.categories.clone(),
        }));
        tracing::info!(categories = self.config.categories.len(), "Carrefour session ready");
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

struct CarrefourCatalog {
    session: HttpSession,
    base: Url,
    categories: Vec<CategoryEntry>,
}

#[async_trait]
impl CatalogClient for CarrefourCatalog {
    type Payload = ProductCard;

    async fn root_categories(&self) -> SourceResult<Vec<CategoryNode<ProductCard>>> {
        Ok(self
            .categories
            .iter()
            .map(|entry| CategoryNode::stub(entry.path.clone(), entry.name.clone()))
            .collect())
    }

    async fn category_detail(&self, path: &str) -> SourceResult<Option<CategoryNode<ProductCard>>> {
        let url = self.base.join(path).map_err(|e| SourceError::Decode {
            url: path.to_string(),
            message: e.to_string(),
        })?;

        let html = match self.session.get_text(url.as_str()).await {
            Ok(html) => html,
            Err(SourceError::Status { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        let cards = parse_product_cards(&html, &url);
        tracing::debug!(url = %url, count = cards.len(), "Product cards extracted");

        Ok(Some(CategoryNode::stub(path, path).with_items(cards)))
    }

    fn parse_item(&self, card: &ProductCard, breadcrumb: &str) -> Result<Item, RecordParseError> {
        let price = parse_price(&card.price_text)?;
        let (unit_price, unit) = card
            .price_per_unit_text
            .as_deref()
            .map(split_unit_price)
            .unwrap_or((None, None));

        let product_url = card.href.clone().or_else(|| {
            self.base
                .join(&format!("/p/{}", card.id))
                .ok()
                .map(|u| u.to_string())
        });

        Ok(Item::new(card.id.as_str(), SourceTag::Carrefour, &card.name, price)?
            .with_price_per_unit(unit_price, unit)
            .with_category(breadcrumb)
            .with_urls(card.image.clone(), product_url)
            .with_availability(card.available))
    }
}

/// Splits `"2,50 €/kg"` into its price and unit
fn split_unit_price(text: &str) -> (Option<rust_decimal::Decimal>, Option<&str>) {
    match text.split_once('/') {
        Some((price, unit)) => (parse_price(price).ok(), Some(unit.trim())),
        None => (parse_price(text).ok(), None),
    }
}

/// Extracts every product card from a category page
///
/// Cards without a `data-product-id` value are skipped; missing fields are
/// left empty and rejected later when the card is normalized.
///
/// # Arguments
///
/// * `html` - The page content
/// * `page_url` - URL of the page, for resolving relative links
pub fn parse_product_cards(html: &str, page_url: &Url) -> Vec<ProductCard> {
    let document = Html::parse_document(html);
    let mut cards = Vec::new();

    let Ok(card_selector) = Selector::parse("[data-product-id]") else {
        return cards;
    };

    for card in document.select(&card_selector) {
        let id = match card.value().attr("data-product-id") {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => continue,
        };

        let image = select_attr(&card, "img", "src").and_then(|src| resolve(&src, page_url));
        let href = select_attr(&card, "a[href]", "href").and_then(|href| resolve(&href, page_url));

        cards.push(ProductCard {
            id,
            name: select_text(&card, ".product-card__title").unwrap_or_default(),
            price_text: select_text(&card, ".product-card__price").unwrap_or_default(),
            price_per_unit_text: select_text(&card, ".product-card__price-per-unit"),
            image,
            href,
            available: card.value().attr("data-available") != Some("false"),
        });
    }

    cards
}

fn select_text(card: &ElementRef<'_>, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    card.select(&selector)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
}

fn select_attr(card: &ElementRef<'_>, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    card.select(&selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

fn resolve(link: &str, base: &Url) -> Option<String> {
    base.join(link.trim()).ok().map(|u| u.to_string())
}
