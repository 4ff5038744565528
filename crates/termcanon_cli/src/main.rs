//! Command-line front end over the term store.
//!
//! # Responsibility
//! - Map subcommands onto `TermCanon` use-cases.
//! - Print results as plain, line-oriented text.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use termcanon_core::{
    init_logging_from_config, CanonConfig, SqliteTermRepository, SuggestionQuery, TermCanon,
};

#[derive(Parser)]
#[command(name = "termcanon")]
#[command(about = "Canonicalize technology and tag names")]
struct Cli {
    /// SQLite term store; state is kept in memory when omitted
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print core linkage info
    Ping,
    /// Register technology names
    Add { names: Vec<String> },
    /// Link a synonym to a technology
    Link { technology: String, synonym: String },
    /// Set the preferred term of a cluster
    Prefer { name: String, preferred: String },
    /// Block names from every result
    Block { names: Vec<String> },
    /// Remove names from the blocklist
    Unblock { names: Vec<String> },
    /// Resolve free-text tags to canonical labels
    Match { tags: Vec<String> },
    /// List the members of a name's cluster
    Members { name: String },
    /// Suggest labels for a text fragment
    Suggest {
        fragment: String,
        /// Zero-based page
        #[arg(long, default_value_t = 0)]
        page: i64,
        #[arg(long, default_value_t = 20)]
        page_size: i64,
        /// Keep unregistered input as a free-text suggestion
        #[arg(long)]
        include_unregistered: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match cli.config.as_ref() {
        Some(path) => CanonConfig::from_path(path)?,
        None => CanonConfig::default(),
    };
    init_logging_from_config(&config)?;

    let canon = match cli.db.as_ref() {
        Some(path) => TermCanon::open(config, SqliteTermRepository::open(path)?)?,
        None => TermCanon::new(config),
    };

    match cli.command {
        Commands::Ping => {
            println!("termcanon_core ping={}", termcanon_core::ping());
            println!("termcanon_core version={}", termcanon_core::core_version());
        }
        Commands::Add { names } => {
            for name in names {
                let id = canon.create_technology(&name)?;
                println!("{id} {name}");
            }
        }
        Commands::Link {
            technology,
            synonym,
        } => {
            let outcome = canon.link_synonym(&technology, &synonym)?;
            println!("root={} merged={}", outcome.root, outcome.merged);
            if let Some(preferred) = outcome.preferred {
                println!("preferred={preferred}");
            }
            if let Some(demoted) = outcome.conflict_demoted {
                eprintln!("warning: preferred term `{demoted}` was demoted by the merge");
            }
        }
        Commands::Prefer { name, preferred } => {
            let change = canon.set_preferred_term(&name, &preferred)?;
            match change.previous {
                Some(previous) if change.changed => println!("replaced {previous}"),
                _ if change.changed => println!("set"),
                _ => println!("unchanged"),
            }
        }
        Commands::Block { names } => {
            for key in canon.create_blocked_terms(&names)? {
                println!("blocked {key}");
            }
        }
        Commands::Unblock { names } => {
            for key in canon.unblock_terms(&names)? {
                println!("unblocked {key}");
            }
        }
        Commands::Match { tags } => {
            for term in canon.match_tags(&tags)? {
                println!("{}\t{}\t{:?}", term.canonical, term.display_name, term.source);
            }
        }
        Commands::Members { name } => {
            for member in canon.cluster_members(&name)? {
                println!("{member}");
            }
        }
        Commands::Suggest {
            fragment,
            page,
            page_size,
            include_unregistered,
        } => {
            let mut query = SuggestionQuery::fragment(fragment, page, page_size);
            query.include_unregistered = include_unregistered;
            let data = canon.get_skill_suggestions(&query)?;
            for item in &data.items {
                println!("{}\t{}", item.label, item.display_name);
            }
            if data.has_more {
                println!("-- more on page {} --", data.page + 1);
            }
        }
    }

    Ok(())
}
