//! Statistics generation from the product database
//!
//! This module provides functionality for extracting and displaying
//! catalog statistics from the SQLite sink.

use crate::model::SourceTag;
use crate::storage::SqliteSink;
use crate::SinkError;
use std::fmt::Write;

/// Catalog statistics summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogStatistics {
    /// Total number of stored products
    pub total_products: u64,

    /// Stored products per source, in tag order
    pub products_by_source: Vec<(SourceTag, u64)>,
}

/// Loads statistics from the sink
///
/// # Arguments
///
/// * `sink` - The SQLite sink to query
///
/// # Returns
///
/// * `Ok(CatalogStatistics)` - Successfully loaded statistics
/// * `Err(SinkError)` - Failed to query statistics
pub fn load_statistics(sink: &SqliteSink) -> Result<CatalogStatistics, SinkError> {
    Ok(CatalogStatistics {
        total_products: sink.count_total()?,
        products_by_source: sink.count_by_source()?,
    })
}

/// Formats statistics as a plain-text block
pub fn render_statistics(stats: &CatalogStatistics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Catalog Statistics ===\n");
    let _ = writeln!(out, "Total products: {}", stats.total_products);

    if stats.products_by_source.is_empty() {
        let _ = writeln!(out, "No products stored yet");
        return out;
    }

    let _ = writeln!(out, "\nProducts by Source:");
    for (source, count) in &stats.products_by_source {
        let percentage = if stats.total_products > 0 {
            (*count as f64 / stats.total_products as f64) * 100.0
        } else {
            0.0
        };
        let _ = writeln!(
            out,
            "  {:<12} {:>8} ({:.1}%)",
            source.display_name(),
            count,
            percentage
        );
    }

    out
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CatalogStatistics) {
    print!("{}", render_statistics(stats));
}
