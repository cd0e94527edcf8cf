//! countwise - CLI for local usage counters
//!
//! This tool provides commands for:
//! - Opting in or out of analytics
//! - Updating and inspecting counters
//! - Sending a report to the configured endpoint
//!
//! Uses XDG Base Directory specification for file locations:
//! - Store: $XDG_DATA_HOME/countwise/ (~/.local/share/countwise/)
//! - Config: $XDG_CONFIG_HOME/countwise/config.toml (~/.config/countwise/config.toml)

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use countwise_core::{Analytics, CancellationToken, Config, Error, QueryOutcome, Store};

#[derive(Parser)]
#[command(name = "countwise")]
#[command(about = "Local usage counters with opt-in reporting")]
#[command(version)]
struct Args {
    /// Verbose output (writes a log file)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show configuration and analytics status
    Status,

    /// Allow analytics collection and reporting
    Enable,

    /// Decline analytics collection and reporting
    Disable,

    /// Increment an integer counter
    Incr {
        key: String,
        /// Amount to add (default: 1)
        #[arg(short, long, default_value_t = 1, allow_hyphen_values = true)]
        by: i64,
    },

    /// Decrement an integer counter
    Decr {
        key: String,
        /// Amount to subtract (default: 1)
        #[arg(short, long, default_value_t = 1, allow_hyphen_values = true)]
        by: i64,
    },

    /// Add to a floating-point counter
    AddFloat {
        key: String,
        #[arg(allow_hyphen_values = true)]
        value: f64,
    },

    /// Store a string entry
    SetString { key: String, value: String },

    /// Store a boolean entry
    SetFlag {
        key: String,
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },

    /// Show every entry that would be reported
    Show {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the installation id
    InstallId,

    /// Store the report URL (only the first call has an effect)
    SetUrl { url: String },

    /// Send a report and print the server response
    Report {
        /// Extra parameter as key=value (repeatable, overrides stored entries)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
}

fn parse_param(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got {:?}", s))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;

    // Keep the guard alive for the whole run
    let _log_guard = if args.verbose {
        Some(
            countwise_core::logging::init(&config.logging)
                .context("failed to initialize logging")?,
        )
    } else {
        None
    };

    let store = Arc::new(Store::open(Config::data_dir()).context("failed to open store")?);
    let analytics =
        Analytics::new(store, config.analytics).context("invalid analytics configuration")?;

    match args.command {
        Command::Status => cmd_status(&analytics),
        Command::Enable => cmd_set_enabled(&analytics, true),
        Command::Disable => cmd_set_enabled(&analytics, false),
        Command::Incr { key, by } => print_counter(&key, analytics.increment_by(&key, by)?),
        Command::Decr { key, by } => print_counter(&key, analytics.decrement_by(&key, by)?),
        Command::AddFloat { key, value } => {
            let stored = analytics.increment_float_by(&key, value)?;
            if analytics.is_enabled() {
                println!("{} = {:?}", key, stored);
            } else {
                println!("Analytics are disabled; nothing stored.");
            }
            Ok(())
        }
        Command::SetString { key, value } => {
            analytics.put_string(&key, &value)?;
            print_stored(&analytics)
        }
        Command::SetFlag { key, value } => {
            analytics.set_flag(&key, value)?;
            print_stored(&analytics)
        }
        Command::Show { json } => cmd_show(&analytics, json),
        Command::InstallId => {
            println!("{}", analytics.installation_id()?);
            Ok(())
        }
        Command::SetUrl { url } => cmd_set_url(&analytics, &url),
        Command::Report { params } => cmd_report(&analytics, params),
    }
}

fn cmd_status(analytics: &Analytics) -> Result<()> {
    println!("countwise Configuration");
    println!("=======================");
    println!();
    println!("Enabled:         {}", analytics.is_enabled());
    println!("Store:           {}", analytics.store().dir().display());
    println!(
        "Log file:        {}",
        countwise_core::logging::log_file_path().display()
    );
    match analytics.url() {
        Ok(url) => println!("Report URL:      {}", url),
        Err(Error::Config(_)) => println!("Report URL:      (not configured)"),
        Err(e) => return Err(e.into()),
    }

    if !analytics.is_enabled() {
        println!();
        println!("Analytics are disabled. Run 'countwise enable' to opt in.");
    }
    Ok(())
}

fn cmd_set_enabled(analytics: &Analytics, enable: bool) -> Result<()> {
    analytics.set_enable_analytics(enable)?;
    println!(
        "Analytics {}.",
        if enable { "enabled" } else { "disabled" }
    );
    Ok(())
}

fn print_counter(key: &str, value: i64) -> Result<()> {
    if value == countwise_core::DISABLED_SENTINEL {
        println!("Analytics are disabled; nothing stored.");
    } else {
        println!("{} = {}", key, value);
    }
    Ok(())
}

fn print_stored(analytics: &Analytics) -> Result<()> {
    if analytics.is_enabled() {
        println!("Stored.");
    } else {
        println!("Analytics are disabled; nothing stored.");
    }
    Ok(())
}

fn cmd_show(analytics: &Analytics, json: bool) -> Result<()> {
    let all = analytics.get_all()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&all)?);
        return Ok(());
    }

    if all.is_empty() {
        println!("No entries (analytics disabled).");
        return Ok(());
    }
    let width = all.keys().map(|k| k.len()).max().unwrap_or(0);
    for (key, value) in &all {
        println!("{:width$}  {}", key, value, width = width);
    }
    Ok(())
}

fn cmd_set_url(analytics: &Analytics, url: &str) -> Result<()> {
    if analytics.set_url_once(url)? {
        println!("Report URL set to {}", url);
    } else {
        println!("Report URL already set to {}", analytics.url()?);
    }
    Ok(())
}

fn cmd_report(analytics: &Analytics, params: Vec<(String, String)>) -> Result<()> {
    let params: HashMap<String, String> = params.into_iter().collect();

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let cancel = CancellationToken::new();
    let outcome = runtime.block_on(analytics.report(Some(&params), &cancel))?;

    match outcome {
        QueryOutcome::Response(body) => println!("{}", body),
        QueryOutcome::Disabled => println!("Analytics are disabled; nothing sent."),
        QueryOutcome::Failed(reason) => {
            tracing::warn!(%reason, "Report failed");
            println!("No response from server.");
        }
        QueryOutcome::Cancelled => bail!("report was cancelled"),
    }
    Ok(())
}
