//! Normalized product record and the field parsers sources share

use crate::model::SourceTag;
use crate::RecordParseError;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;

pub const MAX_NAME_LEN: usize = 500;
pub const MAX_BRAND_LEN: usize = 200;
pub const MAX_CATEGORY_LEN: usize = 200;
pub const MAX_UNIT_LEN: usize = 50;
pub const MAX_BARCODE_LEN: usize = 20;

/// A product as delivered to the persistence sink
///
/// `(external_id, source)` is the natural key: it drives in-run
/// deduplication and the sink's upsert conflict target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    /// Identifier assigned by the retailer; unique only within one source
    pub external_id: String,
    pub source: SourceTag,
    pub name: String,
    pub brand: Option<String>,
    pub price: Decimal,
    pub price_per_unit: Option<Decimal>,
    /// Unit the reference price is expressed in (kg, L, ud)
    pub unit: Option<String>,
    /// Full breadcrumb, e.g. `Congelados > Pescado`
    pub category: Option<String>,
    /// Last breadcrumb segment
    pub subcategory: Option<String>,
    pub image_url: Option<String>,
    pub product_url: Option<String>,
    pub is_available: bool,
    /// EAN / GTIN
    pub barcode: Option<String>,
}

impl Item {
    /// Creates an item with its required fields validated
    ///
    /// The name is trimmed and must be 1..=500 characters; the price must be
    /// non-negative.
    pub fn new(
        external_id: impl Into<String>,
        source: SourceTag,
        name: &str,
        price: Decimal,
    ) -> Result<Self, RecordParseError> {
        let external_id = external_id.into().trim().to_string();
        if external_id.is_empty() {
            return Err(RecordParseError::MissingField("id"));
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(RecordParseError::MissingField("name"));
        }
        let len = name.chars().count();
        if len > MAX_NAME_LEN {
            return Err(RecordParseError::TooLong {
                field: "name",
                len,
                max: MAX_NAME_LEN,
            });
        }

        if price.is_sign_negative() && !price.is_zero() {
            return Err(RecordParseError::NegativePrice(price.to_string()));
        }

        Ok(Self {
            external_id,
            source,
            name: name.to_string(),
            brand: None,
            price,
            price_per_unit: None,
            unit: None,
            category: None,
            subcategory: None,
            image_url: None,
            product_url: None,
            is_available: true,
            barcode: None,
        })
    }

    pub fn with_brand(mut self, brand: Option<&str>) -> Self {
        self.brand = clean_optional(brand, MAX_BRAND_LEN);
        self
    }

    /// Sets the reference price; negative values are discarded
    pub fn with_price_per_unit(mut self, price: Option<Decimal>, unit: Option<&str>) -> Self {
        self.price_per_unit = price.filter(|p| !p.is_sign_negative() || p.is_zero());
        self.unit = clean_optional(unit, MAX_UNIT_LEN);
        self
    }

    /// Sets the breadcrumb and derives the subcategory from its last segment
    pub fn with_category(mut self, breadcrumb: &str) -> Self {
        self.category = clean_optional(Some(breadcrumb), MAX_CATEGORY_LEN);
        self.subcategory = breadcrumb
            .rsplit('>')
            .next()
            .and_then(|last| clean_optional(Some(last), MAX_CATEGORY_LEN));
        self
    }

    pub fn with_urls(mut self, image_url: Option<String>, product_url: Option<String>) -> Self {
        self.image_url = image_url.filter(|u| !u.trim().is_empty());
        self.product_url = product_url.filter(|u| !u.trim().is_empty());
        self
    }

    pub fn with_availability(mut self, is_available: bool) -> Self {
        self.is_available = is_available;
        self
    }

    pub fn with_barcode(mut self, barcode: Option<&str>) -> Self {
        self.barcode = clean_optional(barcode, MAX_BARCODE_LEN);
        self
    }

    /// Returns the natural key
    pub fn key(&self) -> (&str, SourceTag) {
        (&self.external_id, self.source)
    }
}

/// Trims an optional field, drops it when blank and truncates it to `max` chars
fn clean_optional(value: Option<&str>, max: usize) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max).collect())
}

/// Parses a display price such as `"1,99 €"`, `"12.50€"` or `"1.234,56 €"`
pub fn parse_price(text: &str) -> Result<Decimal, RecordParseError> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '€' && *c != '\u{a0}')
        .collect();

    if cleaned.is_empty() {
        return Err(RecordParseError::InvalidPrice(text.to_string()));
    }

    // A comma marks the decimal separator; any dots before it group thousands
    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };

    let price = Decimal::from_str(&normalized)
        .map_err(|_| RecordParseError::InvalidPrice(text.to_string()))?;

    if price.is_sign_negative() && !price.is_zero() {
        return Err(RecordParseError::NegativePrice(text.to_string()));
    }

    Ok(price)
}

/// Reads a price out of a JSON value without going through binary floating point
///
/// Accepts JSON strings (`"1.25"`, `"1,25"`) and numbers; the number's literal
/// representation is parsed as a decimal.
pub fn price_from_json(value: Option<&Value>) -> Result<Decimal, RecordParseError> {
    match value {
        None | Some(Value::Null) => Err(RecordParseError::MissingField("price")),
        Some(Value::String(s)) => parse_price(s),
        Some(Value::Number(n)) => {
            let literal = n.to_string();
            let price = Decimal::from_str(&literal)
                .or_else(|_| Decimal::from_scientific(&literal))
                .map_err(|_| RecordParseError::InvalidPrice(literal.clone()))?;
            if price.is_sign_negative() && !price.is_zero() {
                return Err(RecordParseError::NegativePrice(literal));
            }
            Ok(price)
        }
        Some(other) => Err(RecordParseError::InvalidPrice(other.to_string())),
    }
}
