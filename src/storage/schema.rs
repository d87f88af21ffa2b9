//! Database schema definitions
//!
//! This module contains the SQL schema for the product catalog database.

/// SQL schema for the database
///
/// Prices are stored as TEXT holding the decimal's canonical string so that
/// no value ever passes through binary floating point.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id TEXT NOT NULL,
    source TEXT NOT NULL,
    name TEXT NOT NULL,
    brand TEXT,
    price TEXT NOT NULL,
    price_per_unit TEXT,
    unit TEXT,
    category TEXT,
    subcategory TEXT,
    image_url TEXT,
    product_url TEXT,
    is_available INTEGER NOT NULL DEFAULT 1,
    barcode TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(external_id, source)
);

CREATE INDEX IF NOT EXISTS idx_products_source ON products(source);
CREATE INDEX IF NOT EXISTS idx_products_barcode ON products(barcode);
"#;

/// Upsert keyed on the natural key `(external_id, source)`
///
/// `created_at` survives updates; every other column is overwritten.
pub const UPSERT_PRODUCT_SQL: &str = r#"
INSERT INTO products (
    external_id, source, name, brand, price, price_per_unit, unit,
    category, subcategory, image_url, product_url, is_available, barcode,
    created_at, updated_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
ON CONFLICT(external_id, source) DO UPDATE SET
    name = excluded.name,
    brand = excluded.brand,
    price = excluded.price,
    price_per_unit = excluded.price_per_unit,
    unit = excluded.unit,
    category = excluded.category,
    subcategory = excluded.subcategory,
    image_url = excluded.image_url,
    product_url = excluded.product_url,
    is_available = excluded.is_available,
    barcode = excluded.barcode,
    updated_at = excluded.updated_at
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
