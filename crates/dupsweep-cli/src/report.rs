use colored::*;
use serde::Serialize;
use std::path::Path;

use dupsweep_core::storage::CachedFileRecord;
use dupsweep_core::{ExecutionResult, PhasePlan, StoreStats};

/// One CSV row per group member.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    group: usize,
    hash: &'a str,
    size: u64,
    action: &'static str,
    label: &'a str,
    path: &'a str,
    reason: String,
}

pub fn print_plan(plan: &PhasePlan, execute: bool) {
    println!();
    for (i, group) in plan.groups.iter().enumerate() {
        println!(
            "{} {} ({} bytes, {} copies)",
            format!("Group {}", i + 1).bold(),
            group.hash.dimmed(),
            group.size,
            group.decision.delete.len() + 1
        );
        println!(
            "  {} [{}] {} ({})",
            "KEEP  ".green(),
            group.decision.keep.folder_label,
            group.decision.keep.path,
            group.decision.reason
        );
        for target in &group.decision.delete {
            println!(
                "  {} [{}] {}",
                "DELETE".red(),
                target.folder_label,
                target.path
            );
        }
    }

    let stats = &plan.stats.detection;
    println!();
    println!("{}", "Statistics".bold());
    println!("  Files scanned:        {}", stats.total_scanned);
    println!("  Skipped by type:      {}", stats.skipped_by_type);
    println!("  Skipped by size:      {}", stats.skipped_by_size);
    println!("  Skipped by pattern:   {}", stats.skipped_by_pattern);
    println!("  Unique sizes:         {}", stats.unique_sizes);
    println!("  Size collisions:      {}", stats.collision_files);
    println!("  Files hashed:         {} ({} sampled)", stats.files_hashed, stats.sampled_files);
    println!("  Cache hits:           {}", stats.cache_hits);
    if stats.moved_files > 0 {
        println!("  Moved files:          {}", stats.moved_files);
    }
    println!("  Duplicate groups:     {}", format!("{}", stats.duplicate_groups).red());
    println!(
        "  Marked for deletion:  {}",
        format!("{}", plan.stats.files_marked_for_deletion).red()
    );
    println!(
        "  Bytes reclaimable:    {}",
        format!("{}", stats.bytes_reclaimable).red()
    );
    println!(
        "  Timing:               scan {}, hash {}",
        format!("{:.2}s", plan.scan_duration.as_secs_f64()).green(),
        format!("{:.2}s", plan.hash_duration.as_secs_f64()).green()
    );

    if !plan.issues.is_empty() {
        println!();
        println!(
            "{}",
            format!("{} files skipped due to errors", plan.issues.len()).yellow()
        );
        for issue in &plan.issues {
            println!("  {}", issue);
        }
    }

    if !execute && plan.has_deletions() {
        println!();
        println!("{}", "Dry run: nothing was deleted. Re-run with --execute to delete.".cyan());
    }
}

pub fn print_execution(result: &ExecutionResult) {
    println!();
    println!(
        "{} files deleted, {} bytes freed",
        format!("{}", result.deleted_count()).green(),
        format!("{}", result.bytes_freed).green()
    );
    if !result.failures.is_empty() {
        println!(
            "{}",
            format!("{} deletions failed", result.failed_count()).red()
        );
        for failure in &result.failures {
            println!("  {}", failure);
        }
    }
}

pub fn print_store_stats(stats: &StoreStats, location: &Path) {
    println!("{} {}", "Hash store".bold(), location.display());
    println!("  Records:          {}", stats.total);
    println!("  Hashed:           {}", stats.hashed);
    println!("  Unhashed:         {}", stats.unhashed);
    println!("  Distinct sizes:   {}", stats.unique_sizes);
    println!("  Size collisions:  {}", stats.collision_groups);
    println!("  File size:        {} bytes", stats.store_size_bytes);
}

pub fn print_hash_matches(hash: &str, records: &[CachedFileRecord]) {
    if records.is_empty() {
        println!("No stored files with hash {}", hash.dimmed());
        return;
    }
    println!("{} {}", format!("{} files with hash", records.len()).bold(), hash);
    for record in records {
        let kind = record.hash_kind.map(|k| k.as_str()).unwrap_or("-");
        println!(
            "  [{}] {} ({} bytes, {})",
            record.folder_label, record.path, record.size, kind
        );
    }
}

pub fn write_csv(plan: &PhasePlan, path: &Path) -> anyhow::Result<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut rows = 0;
    for (i, group) in plan.groups.iter().enumerate() {
        let decision = &group.decision;
        let keep = std::iter::once((&decision.keep, "keep"));
        let deletes = decision.delete.iter().map(|key| (key, "delete"));
        for (key, action) in keep.chain(deletes) {
            writer.serialize(CsvRow {
                group: i + 1,
                hash: &group.hash,
                size: group.size,
                action,
                label: &key.folder_label,
                path: &key.path,
                reason: decision.reason.to_string(),
            })?;
            rows += 1;
        }
    }
    writer.flush()?;
    Ok(rows)
}
