use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use fragment_patcher::{build_unified, replace, trim_diff, EditEngine, EditRequest};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Session identifier used for reads/edits issued from this binary.
const SESSION: &str = "cli";

#[derive(Parser)]
#[command(name = "fragment-patcher")]
#[command(about = "Fuzzy search-and-replace for AI-assisted file editing", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a fragment replacement to a file
    Apply {
        /// File to edit (relative paths resolve against the current directory)
        file: PathBuf,

        /// The fragment to replace; empty creates the file from --new
        #[arg(long)]
        old: String,

        /// The replacement fragment
        #[arg(long)]
        new: String,

        /// Replace every occurrence instead of requiring a unique match
        #[arg(long)]
        all: bool,

        /// Print the outcome as JSON instead of a colored diff
        #[arg(long)]
        json: bool,
    },

    /// Show the diff a replacement would produce without writing anything
    Preview {
        /// File to inspect
        file: PathBuf,

        /// The fragment to replace
        #[arg(long)]
        old: String,

        /// The replacement fragment
        #[arg(long)]
        new: String,

        /// Replace every occurrence instead of requiring a unique match
        #[arg(long)]
        all: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Apply {
            file,
            old,
            new,
            all,
            json,
        } => cmd_apply(file, old, new, all, json),

        Commands::Preview { file, old, new, all } => cmd_preview(file, old, new, all),
    }
}

fn cmd_apply(file: PathBuf, old: String, new: String, all: bool, json: bool) -> Result<()> {
    let engine = EditEngine::new(env::current_dir()?);

    // Creation needs no prior read; everything else does.
    if !old.is_empty() {
        engine.read_file(SESSION, &file)?;
    }

    let mut request = EditRequest::new(file, old, new);
    if all {
        request = request.replace_all();
    }
    let outcome = engine.apply_edit(SESSION, &request)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    display_diff(&outcome.diff);
    println!();
    println!(
        "{}",
        format!(
            "{} addition(s), {} deletion(s)",
            outcome.file_diff.additions, outcome.file_diff.deletions
        )
        .bold()
    );
    Ok(())
}

fn cmd_preview(file: PathBuf, old: String, new: String, all: bool) -> Result<()> {
    let content = if old.is_empty() {
        String::new()
    } else {
        fs::read_to_string(&file)?
    };
    let updated = if old.is_empty() {
        new
    } else {
        replace(&content, &old, &new, all)?
    };

    let diff = trim_diff(&build_unified(&file, &content, &updated));
    display_diff(&diff);
    Ok(())
}

/// Render a unified diff with the usual add/remove coloring.
fn display_diff(diff: &str) {
    for line in diff.lines() {
        if line.starts_with("---") || line.starts_with("+++") {
            println!("{}", line.dimmed());
        } else if line.starts_with("@@") {
            println!("{}", line.cyan());
        } else if line.starts_with('+') {
            println!("{}", line.green());
        } else if line.starts_with('-') {
            println!("{}", line.red());
        } else {
            println!("{line}");
        }
    }
}
