//! Data model shared by sources, the ingestor, sinks and the coordinator

mod item;
mod run;
mod source_tag;

pub use item::{
    parse_price, price_from_json, Item, MAX_BARCODE_LEN, MAX_BRAND_LEN, MAX_CATEGORY_LEN,
    MAX_NAME_LEN, MAX_UNIT_LEN,
};
pub use run::{RunResult, RunStatus};
pub use source_tag::SourceTag;
