//! Final reports printed to stdout.

use std::path::{Path, PathBuf};

use console::style;
use serde::Serialize;

use hashlink_store::{format_bytes, OperationStats, StoreInventory};

/// Everything `shrink` reports at the end of a pass
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub tree: PathBuf,
    pub store: PathBuf,
    pub dry_run: bool,
    pub elapsed_ms: u64,
    pub stats: OperationStats,
}

pub fn print_summary(summary: &RunSummary) {
    println!();
    if summary.dry_run {
        println!("  hashlink shrink {}", style("(dry run)").yellow());
    } else {
        println!("  hashlink shrink");
    }
    println!("  ===============");
    println!("  Tree:  {}", summary.tree.display());
    println!("  Store: {}", summary.store.display());
    println!("  Time:  {} ms", summary.elapsed_ms);
    println!();
    for line in stat_lines(&summary.stats) {
        println!("  {}", line);
    }

    let s = &summary.stats;
    if s.has_failures() {
        println!();
        println!(
            "  {} {} collision(s), {} error(s)",
            style("!").red().bold(),
            s.collisions,
            s.errors
        );
    }
}

/// `name: value` for every counter, byte counters with a readable size
pub fn stat_lines(stats: &OperationStats) -> Vec<String> {
    let width = stats
        .entries()
        .iter()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0);
    stats
        .entries()
        .iter()
        .map(|(name, value)| {
            if name.ends_with("_bytes") {
                format!("{name:<width$}  {value} ({})", format_bytes(*value))
            } else {
                format!("{name:<width$}  {value}")
            }
        })
        .collect()
}

pub fn print_inventory(root: &Path, inv: &StoreInventory) {
    println!();
    println!("  Store: {}", root.display());
    println!();
    println!("  Slots:      {}", inv.slot_count);
    println!("  Stored:     {}", format_bytes(inv.total_bytes));
    println!("  Reclaimed:  {}", format_bytes(inv.reclaimed_bytes));

    if !inv.link_histogram.is_empty() {
        println!();
        println!("  Links per slot:");
        for (links, slots) in &inv.link_histogram {
            println!("    {:>6} links  {} slot(s)", links, slots);
        }
    }
    if !inv.stray_files.is_empty() {
        println!();
        println!("  {} Stray files:", style("!").yellow());
        for path in &inv.stray_files {
            println!("    {}", path.display());
        }
    }
    if inv.pending_journal {
        println!();
        println!(
            "  {} Interrupted transition pending, run `hashlink recover`",
            style("!").red()
        );
    }
}
