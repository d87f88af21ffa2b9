//! Console rendering of run results and run status

use crate::model::{RunResult, RunStatus};
use std::fmt::Write;

/// Formats one summary line per result plus a totals line
pub fn render_run_report(results: &[RunResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Run Results ===\n");

    for result in results {
        let _ = writeln!(out, "{}", result.summary());
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    let found: u64 = results.iter().map(|r| r.found).sum();
    let inserted: u64 = results.iter().map(|r| r.inserted).sum();
    let errored: u64 = results.iter().map(|r| r.errored).sum();

    let _ = writeln!(
        out,
        "\n{}/{} sources succeeded: {} found, {} inserted, {} errored",
        succeeded,
        results.len(),
        found,
        inserted,
        errored
    );
    out
}

pub fn print_run_report(results: &[RunResult]) {
    print!("{}", render_run_report(results));
}

/// Formats the coordinator's status
pub fn render_status(status: &RunStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Status ===\n");
    let _ = writeln!(out, "Running: {}", if status.running { "yes" } else { "no" });

    if let Some(source) = status.current_source {
        let _ = writeln!(out, "Current source: {}", source);
    }

    match status.last_run {
        Some(at) => {
            let _ = writeln!(out, "Last run: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        None => {
            let _ = writeln!(out, "Last run: never");
        }
    }

    let _ = writeln!(out, "Last results: {}", status.last_results.len());
    out
}

pub fn print_status(status: &RunStatus) {
    print!("{}", render_status(status));
}
