//! Filtering log CLI
//!
//! CLI tool for inspecting filtering events and the rules derived from them.

mod logging;
mod replay;

use std::fs;

use clap::{Parser, Subcommand};

use fl_core::{classify, FilteringEvent, StatusMode};
use fl_rules::{
    candidate_patterns, get_rule_text, primary_actions, split_to_patterns, RuleCreationOptions,
    WizardState,
};

use replay::{run_replay, ReplayOptions};

#[derive(Parser)]
#[command(name = "fl-cli")]
#[command(about = "Filtering log inspector and rule synthesizer")]
struct Cli {
    /// Log filter, e.g. `debug` or `fl_bus=debug` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the candidate rule patterns for a request URL
    Patterns {
        /// Request URL
        #[arg(short, long)]
        url: String,

        /// Request domain
        #[arg(short, long)]
        domain: String,

        /// Produce exception (`@@`) patterns
        #[arg(short, long)]
        allowlist: bool,
    },

    /// Print the status of every event in a JSON event list
    Classify {
        /// JSON file holding an array of filtering events
        #[arg(short, long)]
        input: String,
    },

    /// Print block/unblock candidates and the rule text for one event
    Exceptions {
        /// JSON file holding an array of filtering events
        #[arg(short, long)]
        input: String,

        /// Id of the event to inspect
        #[arg(short, long)]
        event_id: String,
    },

    /// Push events through a background log and print the filtered view
    Replay {
        /// JSON file holding an array of filtering events
        #[arg(short, long)]
        input: String,

        /// Log configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Search text, overrides the configured one
        #[arg(short, long)]
        search: Option<String>,

        /// Tab to show, defaults to the first tab seen in the input
        #[arg(short, long)]
        tab: Option<i64>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.log_level.as_deref()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let result = match cli.command {
        Commands::Patterns {
            url,
            domain,
            allowlist,
        } => cmd_patterns(&url, &domain, allowlist),
        Commands::Classify { input } => cmd_classify(&input),
        Commands::Exceptions { input, event_id } => cmd_exceptions(&input, &event_id),
        Commands::Replay {
            input,
            config,
            search,
            tab,
        } => run_replay(ReplayOptions {
            input,
            config,
            search,
            tab,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

pub(crate) fn read_events(path: &str) -> Result<Vec<FilteringEvent>, String> {
    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    FilteringEvent::list_from_json(&content).map_err(|e| format!("Failed to parse '{}': {}", path, e))
}

pub(crate) fn status_label(status: StatusMode) -> &'static str {
    match status {
        StatusMode::Regular => "regular",
        StatusMode::Modified => "modified",
        StatusMode::Blocked => "blocked",
        StatusMode::Allowed => "allowed",
        StatusMode::AllowedStealth => "allowed-stealth",
    }
}

fn cmd_patterns(url: &str, domain: &str, allowlist: bool) -> Result<(), String> {
    let patterns = split_to_patterns(url, domain, allowlist);
    if patterns.is_empty() {
        return Err(format!("No patterns for '{}'", url));
    }
    for pattern in patterns {
        println!("{}", pattern);
    }
    Ok(())
}

fn cmd_classify(input: &str) -> Result<(), String> {
    let events = read_events(input)?;

    for event in &events {
        println!(
            "{:<10} {:<16} {}",
            event.event_id,
            status_label(classify(event)),
            event.request_event_type_label()
        );
    }

    println!("{} events", events.len());
    Ok(())
}

fn cmd_exceptions(input: &str, event_id: &str) -> Result<(), String> {
    let events = read_events(input)?;
    let event = events
        .iter()
        .find(|event| event.event_id == event_id)
        .ok_or_else(|| format!("No event with id '{}' in '{}'", event_id, input))?;

    println!("Event {}", event.event_id);
    println!("  Status:   {}", status_label(classify(event)));
    println!("  Type:     {}", event.request_event_type_label());
    println!("  Actions:  {:?}", primary_actions(event, None));

    let options = RuleCreationOptions::for_event(event);
    for (label, state) in [
        ("Block", WizardState::ProposingBlock),
        ("Unblock", WizardState::ProposingUnblock),
    ] {
        let patterns = candidate_patterns(event, state);
        println!("  {} candidates:", label);
        if patterns.is_empty() {
            println!("    (none)");
            continue;
        }
        for pattern in &patterns {
            println!("    {}", pattern);
        }
        println!("    -> {}", get_rule_text(Some(event), &patterns[0], &options));
    }

    Ok(())
}
