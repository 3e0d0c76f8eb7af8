//! # keyfreq
//!
//! A CLI for recording and reporting per-context command frequencies.
//!
//! ## Overview
//!
//! keyfreq is built on top of keyfreqlib. Every invocation works against the
//! shared store file (`~/.keyfreq` by default), so any number of shells,
//! editors or scripts can record into the same store concurrently.
//!
//! ## Usage
//!
//! ```bash
//! # Count one action in a context and save it
//! keyfreq record text-mode forward-word
//!
//! # Most used commands, all contexts collapsed
//! keyfreq show --by-action
//!
//! # Commands used fewer than 5 times in one context
//! keyfreq show --context prog-mode --threshold -5 --order asc
//!
//! # JSON output
//! keyfreq show --output json
//!
//! # Compact context/action matrix
//! keyfreq show --matrix --output json
//!
//! # Combine two stores
//! keyfreq merge laptop.keyfreq desktop.keyfreq all.keyfreq
//!
//! # Start over
//! keyfreq reset --yes
//! ```
//!
//! Set `RUST_LOG=debug` to see lock and store activity on stderr, or
//! `KEYFREQ_LOG_PATH` to append it to a file instead.

mod render;

use std::fmt::Display;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::anyhow;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use keyfreqlib::{
    filter_by_context, group_by_action, rank_table, CounterTable, ExclusionFilter, FreqTable,
    MatrixExport, MergeEngine, Order, RankedList, Recorder, SaveOutcome, StoreOptions, Threshold,
};
use outstanding::cli::{App, CommandContext, HandlerResult, Output, RunResult};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::filter::EnvFilter;

use render::{
    create_theme, FreqTableContext, MatrixContext, OutputMode, FREQ_TABLE_TEMPLATE,
    MESSAGE_TEMPLATE,
};

/// Arguments shared by `show` and the bare command
fn show_args() -> Vec<Arg> {
    vec![
        Arg::new("context")
            .short('c')
            .long("context")
            .help("Only count actions performed in this context"),
        Arg::new("by-action")
            .short('a')
            .long("by-action")
            .action(ArgAction::SetTrue)
            .help("Sum each action across all contexts"),
        Arg::new("order")
            .long("order")
            .value_parser(["desc", "asc", "none"])
            .default_value("desc")
            .help("Sort by count: desc, asc, or none"),
        Arg::new("threshold")
            .short('t')
            .long("threshold")
            .value_parser(value_parser!(i64))
            .allow_negative_numbers(true)
            .help("Keep counts above N, or below |N| when negative"),
        Arg::new("matrix")
            .long("matrix")
            .action(ArgAction::SetTrue)
            .conflicts_with_all(["context", "by-action", "order", "threshold"])
            .help("Export every count as a compact context/action matrix"),
    ]
}

/// Build the clap Command structure
fn build_command() -> Command {
    Command::new("keyfreq")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Arthur Debert")
        .about("Per-context command frequency counter with a shared store")
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .env("KEYFREQ_FILE")
                .global(true)
                .help("Store file (defaults to ~/.keyfreq)"),
        )
        .arg(
            Arg::new("lock-file")
                .long("lock-file")
                .global(true)
                .help("Lock file (defaults to the store path plus .lock)"),
        )
        .arg(
            Arg::new("exclude")
                .short('x')
                .long("exclude")
                .action(ArgAction::Append)
                .global(true)
                .help("Ignore an action (can be specified multiple times)"),
        )
        .arg(
            Arg::new("exclude-pattern")
                .long("exclude-pattern")
                .action(ArgAction::Append)
                .global(true)
                .help("Ignore actions matching a glob pattern"),
        )
        .args(show_args())
        .subcommand(
            Command::new("record")
                .about("Count an action and save it to the store")
                .arg(Arg::new("context").required(true).help("Context the action ran in"))
                .arg(Arg::new("action").required(true).help("Action identifier"))
                .arg(
                    Arg::new("count")
                        .short('n')
                        .long("count")
                        .value_parser(value_parser!(u64).range(1..))
                        .default_value("1")
                        .help("Number of times to count the action"),
                )
                .arg(
                    Arg::new("no-wait")
                        .long("no-wait")
                        .action(ArgAction::SetTrue)
                        .help("Fail instead of waiting when the store is locked"),
                ),
        )
        .subcommand(
            Command::new("show")
                .about("Report counts from the store (default command)")
                .args(show_args()),
        )
        .subcommand(
            Command::new("merge")
                .about("Write the sum of two stores to a third")
                .arg(Arg::new("first").required(true).help("First source store"))
                .arg(Arg::new("second").required(true).help("Second source store"))
                .arg(Arg::new("destination").required(true).help("Store to write")),
        )
        .subcommand(
            Command::new("reset")
                .about("Delete the store")
                .arg(
                    Arg::new("yes")
                        .long("yes")
                        .action(ArgAction::SetTrue)
                        .help("Confirm deleting all recorded counts"),
                ),
        )
}

/// Build store options from the global arguments
fn build_options(matches: &ArgMatches) -> anyhow::Result<StoreOptions> {
    let mut exclusions = ExclusionFilter::new();

    if let Some(actions) = matches.get_many::<String>("exclude") {
        exclusions = exclusions.actions(actions.cloned());
    }

    if let Some(patterns) = matches.get_many::<String>("exclude-pattern") {
        for pattern in patterns {
            exclusions = exclusions.pattern(pattern)?;
        }
    }

    let mut options = StoreOptions::new().exclusions(exclusions);
    if let Some(file) = matches.get_one::<String>("file") {
        options = options.store(file);
    }
    if let Some(lock) = matches.get_one::<String>("lock-file") {
        options = options.lock(lock);
    }
    Ok(options)
}

/// Handler for record command
fn record_handler(matches: &ArgMatches, _ctx: &CommandContext) -> HandlerResult<serde_json::Value> {
    let context = required(matches, "context")?;
    let action = required(matches, "action")?;
    let count = matches.get_one::<u64>("count").copied().unwrap_or(1);

    let mut recorder = Recorder::new(build_options(matches)?);
    if !recorder.record(context, action, count) {
        return Ok(Output::Render(json!({
            "recorded": 0,
            "message": format!("{} is excluded, nothing recorded", action),
        })));
    }

    let outcome = if matches.get_flag("no-wait") {
        recorder.autosave()?
    } else {
        recorder.finish()?
    };

    if outcome == SaveOutcome::Deferred {
        return Err(anyhow!("store is locked by another process, nothing recorded").into());
    }

    Ok(Output::Render(json!({
        "recorded": count,
        "message": format!("Recorded {} x {} in {}", count, action, context),
    })))
}

/// Handler for show command (and the bare command)
fn show_handler(matches: &ArgMatches, ctx: &CommandContext) -> HandlerResult<serde_json::Value> {
    let engine = MergeEngine::new(build_options(matches)?);
    let snapshot = engine.report_snapshot(&CounterTable::new())?;

    if matches.get_flag("matrix") {
        let export = MatrixExport::from_table(&snapshot);
        if ctx.output_mode.is_structured() {
            return Ok(Output::Render(serde_json::to_value(&export)?));
        }
        return Ok(Output::Render(serde_json::to_value(MatrixContext::new(&export)?)?));
    }

    let order: Order = required(matches, "order")?
        .parse()
        .map_err(|e: String| anyhow!(e))?;
    let threshold = Threshold::from(matches.get_one::<i64>("threshold").copied());

    if let Some(context) = matches.get_one::<String>("context") {
        let ranked = filter_by_context(&snapshot, context).ranked(order, threshold);
        ranked_output(&ranked, Some(format!("Context: {}", context)), ctx)
    } else if matches.get_flag("by-action") {
        let ranked = group_by_action(&snapshot).ranked(order, threshold);
        ranked_output(&ranked, None, ctx)
    } else {
        let ranked = rank_table(&snapshot, order, threshold);
        ranked_output(&ranked, None, ctx)
    }
}

/// Raw ranked list for JSON, pre-formatted table context otherwise
fn ranked_output<K: Display + Serialize>(
    ranked: &RankedList<K>,
    title: Option<String>,
    ctx: &CommandContext,
) -> HandlerResult<serde_json::Value> {
    if ctx.output_mode.is_structured() {
        return Ok(Output::Render(serde_json::to_value(ranked)?));
    }

    let mut table = FreqTable::from_ranked(ranked);
    if let Some(title) = title {
        table = table.with_title(title);
    }
    Ok(Output::Render(serde_json::to_value(
        FreqTableContext::from_table(&table),
    )?))
}

/// Handler for merge command
fn merge_handler(matches: &ArgMatches, _ctx: &CommandContext) -> HandlerResult<serde_json::Value> {
    let first = PathBuf::from(required(matches, "first")?);
    let second = PathBuf::from(required(matches, "second")?);
    let destination = PathBuf::from(required(matches, "destination")?);

    let engine = MergeEngine::new(build_options(matches)?);
    let value = match engine.merge_stores(&first, &second, &destination)? {
        SaveOutcome::Written { records } => json!({
            "records": records,
            "message": format!(
                "Merged {} and {} into {} ({} records)",
                first.display(),
                second.display(),
                destination.display(),
                records
            ),
        }),
        _ => json!({
            "records": 0,
            "message": "Both stores are empty, nothing written",
        }),
    };
    Ok(Output::Render(value))
}

/// Handler for reset command
fn reset_handler(matches: &ArgMatches, _ctx: &CommandContext) -> HandlerResult<serde_json::Value> {
    if !matches.get_flag("yes") {
        return Err(anyhow!("reset deletes every recorded count; pass --yes to confirm").into());
    }

    let engine = MergeEngine::new(build_options(matches)?);
    engine.reset(&mut CounterTable::new())?;
    Ok(Output::Render(json!({
        "message": format!("Deleted {}", engine.store_path().display()),
    })))
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> anyhow::Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(|s| s.as_str())
        .ok_or_else(|| anyhow!("missing argument: {}", name))
}

/// Initialize logging, appending to KEYFREQ_LOG_PATH if set, otherwise stderr.
fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::WARN.into())
        .from_env_lossy();

    if let Ok(path) = std::env::var("KEYFREQ_LOG_PATH") {
        if let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_ansi(false)
                .with_writer(file)
                .init();
            return;
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Bare command: run show with the output mode outstanding parsed
fn run_default(matches: &ArgMatches) -> ExitCode {
    let output_mode = matches
        .get_one::<String>("_output_mode")
        .map(|s| match s.as_str() {
            "json" => OutputMode::Json,
            "text" => OutputMode::Text,
            "term-debug" => OutputMode::TermDebug,
            "term" => OutputMode::Term,
            _ => OutputMode::Auto,
        })
        .unwrap_or(OutputMode::Auto);

    let ctx = CommandContext {
        output_mode,
        command_path: vec![],
    };

    match show_handler(matches, &ctx) {
        Ok(Output::Render(value)) => {
            if output_mode.is_structured() {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&value).unwrap_or_default()
                );
            } else {
                match outstanding::render(FREQ_TABLE_TEMPLATE, &value, &create_theme()) {
                    Ok(output) => print!("{}", output),
                    Err(e) => {
                        eprintln!("Error: {e}");
                        return ExitCode::FAILURE;
                    }
                }
            }
            ExitCode::SUCCESS
        }
        Ok(Output::Silent) => ExitCode::SUCCESS,
        Ok(Output::Binary { .. }) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    init_logging();
    let cmd = build_command();

    let result = App::builder()
        .theme(create_theme())
        .command("record", record_handler, MESSAGE_TEMPLATE)
        .command("show", show_handler, FREQ_TABLE_TEMPLATE)
        .command("merge", merge_handler, MESSAGE_TEMPLATE)
        .command("reset", reset_handler, MESSAGE_TEMPLATE)
        .run_to_string(cmd, std::env::args());

    match result {
        RunResult::Handled(output) => {
            if output.starts_with("Error:") {
                eprintln!("{}", output.trim_end());
                return ExitCode::FAILURE;
            }
            print!("{}", output);
            if !output.is_empty() && !output.ends_with('\n') {
                println!();
            }
            ExitCode::SUCCESS
        }
        RunResult::Binary(_, _) => ExitCode::SUCCESS,
        RunResult::NoMatch(matches) => run_default(&matches),
    }
}
