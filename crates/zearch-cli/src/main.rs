//! Zearch CLI
//!
//! Manages a settings file with the same JSON shape the extension persists,
//! so block lists can be maintained, tested and migrated from the terminal.

mod file_backend;

use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use clap::{Parser, Subcommand};

use zearch_core::clock::{day_start_utc, Clock, SystemClock};
use zearch_core::{rules, BlockMode, ResultsPerPage, SettingsStore};

use file_backend::FileBackend;

#[derive(Parser)]
#[command(name = "zearch-cli")]
#[command(about = "Zearch block list manager")]
struct Cli {
    /// Settings file (created on first mutation)
    #[arg(short, long, default_value = "zearch-settings.json")]
    file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a block rule from a domain, keyword, URL or regex
    Add {
        input: String,

        /// Human-readable label (auto-generated when omitted)
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Remove a rule by its exact pattern
    Remove { pattern: String },

    /// List rules with their match counts
    List,

    /// Show which rule (if any) a hostname matches
    Test { hostname: String },

    /// Flip the enabled flag
    Toggle,

    /// Set the display treatment: hide, dim or replace
    Mode { mode: String },

    /// Set results per page: 10, 20, 50 or 100
    PerPage { count: u32 },

    /// Show aggregate statistics
    Stats,

    /// Zero all counters
    ResetStats,

    /// Export settings as pretty-printed JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import settings exported earlier
    Import { input: PathBuf },
}

fn main() {
    let cli = Cli::parse();

    let mut store = SettingsStore::new(FileBackend::new(cli.file), Rc::new(SystemClock));
    if let Err(e) = store.load() {
        eprintln!("Error: Failed to load settings: {e}");
        std::process::exit(1);
    }

    let result = match cli.command {
        Commands::Add { input, description } => cmd_add(&mut store, &input, description),
        Commands::Remove { pattern } => cmd_remove(&mut store, &pattern),
        Commands::List => cmd_list(&store),
        Commands::Test { hostname } => cmd_test(&store, &hostname),
        Commands::Toggle => cmd_toggle(&mut store),
        Commands::Mode { mode } => cmd_mode(&mut store, &mode),
        Commands::PerPage { count } => cmd_per_page(&mut store, count),
        Commands::Stats => cmd_stats(&store),
        Commands::ResetStats => cmd_reset_stats(&mut store),
        Commands::Export { output } => cmd_export(&store, output),
        Commands::Import { input } => cmd_import(&mut store, &input),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

type Store = SettingsStore<FileBackend>;

fn cmd_add(store: &mut Store, input: &str, description: Option<String>) -> Result<(), String> {
    let rule = store
        .add_rule(input, description.as_deref())
        .map_err(|e| e.to_string())?;
    println!("Added rule '{}' ({})", rule.pattern, rule.label());
    Ok(())
}

fn cmd_remove(store: &mut Store, pattern: &str) -> Result<(), String> {
    let removed = store.remove_rule(pattern).map_err(|e| e.to_string())?;
    if removed {
        println!("Removed '{pattern}'");
    } else {
        println!("No rule with pattern '{pattern}'");
    }
    Ok(())
}

fn cmd_list(store: &Store) -> Result<(), String> {
    let settings = store.settings();
    if settings.blocked_sites.is_empty() {
        println!("No rules");
        return Ok(());
    }

    println!(
        "{} rules (filtering {})",
        settings.blocked_sites.len(),
        if settings.is_enabled { "on" } else { "off" }
    );
    for (i, rule) in settings.blocked_sites.iter().enumerate() {
        println!(
            "  [{}] {} - {} ({} blocked)",
            i,
            rule.pattern,
            rule.label(),
            rule.blocked_count
        );
    }
    Ok(())
}

fn cmd_test(store: &Store, hostname: &str) -> Result<(), String> {
    match rules::evaluate(hostname, &store.settings().blocked_sites) {
        Some(rule) => println!("{hostname} is blocked by '{}' ({})", rule.pattern, rule.label()),
        None => println!("{hostname} is not blocked"),
    }
    Ok(())
}

fn cmd_toggle(store: &mut Store) -> Result<(), String> {
    let enabled = store.toggle_enabled().map_err(|e| e.to_string())?;
    println!("Filtering {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

fn cmd_mode(store: &mut Store, mode: &str) -> Result<(), String> {
    let mode = BlockMode::parse(mode)
        .ok_or_else(|| format!("unknown mode '{mode}' (expected hide, dim or replace)"))?;
    store.set_block_mode(mode).map_err(|e| e.to_string())?;
    println!("Block mode set to {}", mode.as_str());
    Ok(())
}

fn cmd_per_page(store: &mut Store, count: u32) -> Result<(), String> {
    let per_page = ResultsPerPage::try_from(count)?;
    store
        .set_results_per_page(per_page)
        .map_err(|e| e.to_string())?;
    println!("Results per page set to {count}");
    Ok(())
}

fn cmd_stats(store: &Store) -> Result<(), String> {
    let settings = store.settings();
    let today = store.today_stats(day_start_utc(SystemClock.now_ms()));

    println!("Total blocked:  {}", settings.total_blocked);
    println!("Rules:          {}", settings.blocked_sites.len());
    println!("Today:          {} blocked across {} rules", today.blocked, today.sites);
    Ok(())
}

fn cmd_reset_stats(store: &mut Store) -> Result<(), String> {
    store.reset_stats().map_err(|e| e.to_string())?;
    println!("Statistics reset");
    Ok(())
}

fn cmd_export(store: &Store, output: Option<PathBuf>) -> Result<(), String> {
    let json = store.export_json().map_err(|e| e.to_string())?;
    match output {
        Some(path) => {
            fs::write(&path, &json)
                .map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
            println!("Exported to '{}'", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn cmd_import(store: &mut Store, input: &PathBuf) -> Result<(), String> {
    let text = fs::read_to_string(input)
        .map_err(|e| format!("Failed to read '{}': {}", input.display(), e))?;
    store.import_json(&text).map_err(|e| e.to_string())?;
    println!(
        "Imported {} rules from '{}'",
        store.settings().blocked_sites.len(),
        input.display()
    );
    Ok(())
}
