//! Output module for console reports
//!
//! This module handles:
//! - Rendering run results and the coordinator's status
//! - Loading and rendering per-source catalog statistics from the sink

mod report;
pub mod stats;

pub use report::{print_run_report, print_status, render_run_report, render_status};
pub use stats::{load_statistics, print_statistics, render_statistics, CatalogStatistics};
