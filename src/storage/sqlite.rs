//! SQLite sink implementation
//!
//! This module provides a SQLite-backed implementation of the ProductSink trait.

use crate::model::{Item, SourceTag};
use crate::storage::schema::{initialize_schema, UPSERT_PRODUCT_SQL};
use crate::storage::traits::{ProductSink, SinkResult};
use crate::storage::ProductRecord;
use crate::SinkError;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

/// SQLite sink backend
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Opens (or creates) the database at `path` and initializes the schema
    pub fn new(path: &Path) -> Result<Self, SinkError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, SinkError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SinkError> {
        self.conn.lock().map_err(|_| SinkError::Poisoned)
    }

    /// Counts stored products per source, ordered by source
    pub fn count_by_source(&self) -> SinkResult<Vec<(SourceTag, u64)>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT source, COUNT(*) FROM products GROUP BY source ORDER BY source")?;

        let rows = stmt
            .query_map([], |row| {
                let source: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((source, count as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts: Vec<(SourceTag, u64)> = rows
            .into_iter()
            .filter_map(|(source, count)| {
                SourceTag::from_db_string(&source).map(|tag| (tag, count))
            })
            .collect();
        counts.sort_by_key(|(tag, _)| *tag);
        Ok(counts)
    }

    /// Total number of stored products
    pub fn count_total(&self) -> SinkResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Loads up to `limit` products of one source, ordered by external id
    pub fn products_by_source(
        &self,
        source: SourceTag,
        limit: usize,
    ) -> SinkResult<Vec<ProductRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, external_id, source, name, brand, price, price_per_unit, unit,
             category, subcategory, image_url, product_url, is_available, barcode,
             created_at, updated_at
             FROM products WHERE source = ?1 ORDER BY external_id LIMIT ?2",
        )?;

        let records = stmt
            .query_map(params![source.as_str(), limit as i64], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Returns true when the database answers a trivial query
    pub fn health_check(&self) -> bool {
        let result = self.lock().and_then(|conn| {
            conn.query_row("SELECT COUNT(*) FROM products", [], |row| row.get::<_, i64>(0))
                .map_err(SinkError::from)
        });

        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "Sink health check failed");
                false
            }
        }
    }
}

#[async_trait]
impl ProductSink for SqliteSink {
    async fn bulk_upsert(&self, batch: &[Item]) -> SinkResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        // One transaction per batch so a failure leaves nothing behind
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare_cached(UPSERT_PRODUCT_SQL)?;
            for item in batch {
                written += stmt.execute(params![
                    item.external_id,
                    item.source.as_str(),
                    item.name,
                    item.brand,
                    item.price.to_string(),
                    item.price_per_unit.map(|p| p.to_string()),
                    item.unit,
                    item.category,
                    item.subcategory,
                    item.image_url,
                    item.product_url,
                    item.is_available,
                    item.barcode,
                    now,
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!(count = written, "Products inserted/updated");
        Ok(written)
    }
}

fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        Decimal::from_str(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ProductRecord> {
    let source: String = row.get(2)?;
    let source = SourceTag::from_db_string(&source).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown source '{}'", source).into(),
        )
    })?;
    let price = decimal_column(row, 5)?
        .ok_or(rusqlite::Error::InvalidColumnType(5, "price".to_string(), Type::Null))?;

    Ok(ProductRecord {
        id: row.get(0)?,
        item: Item {
            external_id: row.get(1)?,
            source,
            name: row.get(3)?,
            brand: row.get(4)?,
            price,
            price_per_unit: decimal_column(row, 6)?,
            unit: row.get(7)?,
            category: row.get(8)?,
            subcategory: row.get(9)?,
            image_url: row.get(10)?,
            product_url: row.get(11)?,
            is_available: row.get(12)?,
            barcode: row.get(13)?,
        },
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

/// Opens the sink at `path`, creating the parent directory if needed
pub fn open_sink(path: &Path) -> Result<SqliteSink, SinkError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    SqliteSink::new(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, source: SourceTag, price: &str) -> Item {
        Item::new(id, source, &format!("Producto {}", id), Decimal::from_str(price).unwrap())
            .unwrap()
    }

    #[tokio::test]
    async fn test_bulk_upsert_inserts_rows() {
        let sink = SqliteSink::new_in_memory().unwrap();
        let batch = vec![
            item("1", SourceTag::Mercadona, "1.10"),
            item("2", SourceTag::Mercadona, "2.20"),
        ];

        assert_eq!(sink.bulk_upsert(&batch).await.unwrap(), 2);
        assert_eq!(sink.count_total().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_bulk_upsert_is_idempotent_on_natural_key() {
        let sink = SqliteSink::new_in_memory().unwrap();
        sink.bulk_upsert(&[item("1", SourceTag::Mercadona, "1.10")])
            .await
            .unwrap();

        // Same key, new price: updated in place
        let written = sink
            .bulk_upsert(&[item("1", SourceTag::Mercadona, "1.35")])
            .await
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(sink.count_total().unwrap(), 1);

        let stored = sink.products_by_source(SourceTag::Mercadona, 10).unwrap();
        assert_eq!(stored[0].item.price, Decimal::from_str("1.35").unwrap());
    }

    #[tokio::test]
    async fn test_same_external_id_in_two_sources() {
        let sink = SqliteSink::new_in_memory().unwrap();
        sink.bulk_upsert(&[
            item("1", SourceTag::Mercadona, "1"),
            item("1", SourceTag::Carrefour, "1"),
        ])
        .await
        .unwrap();

        assert_eq!(
            sink.count_by_source().unwrap(),
            vec![(SourceTag::Mercadona, 1), (SourceTag::Carrefour, 1)]
        );
    }

    #[tokio::test]
    async fn test_decimal_roundtrip_is_exact() {
        let sink = SqliteSink::new_in_memory().unwrap();
        let stored = item("7", SourceTag::Lidl, "0.10")
            .with_price_per_unit(Some(Decimal::from_str("3.333").unwrap()), Some("kg"))
            .with_category("Frescos > Fruta");
        sink.bulk_upsert(std::slice::from_ref(&stored)).await.unwrap();

        let loaded = sink.products_by_source(SourceTag::Lidl, 1).unwrap();
        assert_eq!(loaded[0].item, stored);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let sink = SqliteSink::new_in_memory().unwrap();
        assert_eq!(sink.bulk_upsert(&[]).await.unwrap(), 0);
        assert!(sink.health_check());
    }
}
