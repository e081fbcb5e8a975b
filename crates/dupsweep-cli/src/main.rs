mod commands;
mod logging;
mod progress;
mod report;

use std::cell::Cell;
use std::io::{self, Write};
use std::process;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, RunArgs};
use dotenv::dotenv;
use dupsweep_core::config::{load_configuration, IMAGE_EXTENSIONS};
use dupsweep_core::{AppConfig, PhaseOutcome, PhasePlan, RunMode, RunStatus, Session, SilentReporter};
use progress::CliReporter;
use tracing::{error, info};

fn main() {
    dotenv().ok();

    let args = Cli::parse();

    let _guard = logging::init_logger(args.command_name());

    if let Err(err) = run(args) {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn run(args: Cli) -> anyhow::Result<()> {
    let mut config = load_configuration().context("Error loading configuration")?;
    if let Some(store) = args.store {
        config.store_path = Some(store);
    }

    match args.command {
        Some(Commands::Dedupe { root, label, run }) => {
            apply_run_args(&mut config, &run);
            let label = label.unwrap_or_else(|| config.first_label.clone());
            let reporter = CliReporter::new();
            let session = Session::open(config, &reporter)?;
            let printed = Cell::new(false);
            let outcome = session.run_intra(&root, &label, run_mode(&run), |plan| {
                printed.set(true);
                confirm_deletion(plan, run.yes)
            })?;
            finish(&outcome, &run, printed.get())?;
            session.close()?;
        }
        Some(Commands::Cross { first, second, run }) => {
            apply_run_args(&mut config, &run);
            let reporter = CliReporter::new();
            let session = Session::open(config, &reporter)?;
            let printed = Cell::new(false);
            let outcome =
                session.run_cross(&first, second.as_deref(), run_mode(&run), |plan| {
                    printed.set(true);
                    confirm_deletion(plan, run.yes)
                })?;
            finish(&outcome, &run, printed.get())?;
            session.close()?;
        }
        Some(Commands::CacheStats) => {
            let location = config.resolved_store_path();
            let session = Session::open(config, &SilentReporter)?;
            report::print_store_stats(&session.store_stats()?, &location);
            session.close()?;
        }
        Some(Commands::ClearCache { yes }) => {
            let location = config.resolved_store_path();
            let confirmed = yes
                || prompt_confirm(
                    &format!("Delete every entry in {}?", location.display()),
                    Some(false),
                )?;
            if confirmed {
                let session = Session::open(config, &SilentReporter)?;
                let removed = session.clear_store()?;
                session.close()?;
                println!("{} entries removed", removed);
            }
        }
        Some(Commands::FindHash { hash, label }) => {
            let session = Session::open(config, &SilentReporter)?;
            let records = session.store().files_by_hash(&hash, label.as_deref())?;
            report::print_hash_matches(&hash, &records);
            session.close()?;
        }
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn apply_run_args(config: &mut AppConfig, run: &RunArgs) {
    if let Some(min_size) = run.min_size {
        config.min_file_size = min_size;
    }
    if run.include_images {
        config
            .skip_extensions
            .retain(|ext| !IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
    }
    if let Some(threads) = run.threads {
        config.hash_threads = threads;
    }
}

fn run_mode(run: &RunArgs) -> RunMode {
    if run.execute {
        RunMode::Execute
    } else {
        RunMode::DryRun
    }
}

/// Shows the plan and asks before anything is deleted.
fn confirm_deletion(plan: &PhasePlan, assume_yes: bool) -> bool {
    report::print_plan(plan, true);
    if assume_yes {
        return true;
    }
    let prompt = format!(
        "Delete {} files ({} bytes)?",
        plan.stats.files_marked_for_deletion, plan.stats.detection.bytes_reclaimable
    );
    match prompt_confirm(&prompt, Some(false)) {
        Ok(answer) => answer,
        Err(err) => {
            error!("Could not read confirmation: {}", err);
            false
        }
    }
}

fn finish(outcome: &PhaseOutcome, run: &RunArgs, plan_printed: bool) -> anyhow::Result<()> {
    if !plan_printed {
        report::print_plan(&outcome.plan, outcome.mode == RunMode::Execute);
    }
    match (outcome.status, &outcome.execution) {
        (RunStatus::Cancelled, _) => println!("{}", "Cancelled: nothing was deleted.".yellow()),
        (RunStatus::Completed, Some(execution)) => report::print_execution(execution),
        (RunStatus::Completed, None) => {}
    }
    if let Some(path) = &run.report_csv {
        let rows = report::write_csv(&outcome.plan, path)
            .with_context(|| format!("Error writing report to {}", path.display()))?;
        info!("Wrote {} rows to {}", rows, path.display());
    }
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
