//! Command-line argument definitions.

use clap::{Parser, Subcommand};

/// Census CLI - discover, search, and query Census API datasets
#[derive(Parser, Debug)]
#[command(name = "census", version)]
#[command(about = "Discover, search, and query Census API datasets", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Only discover datasets of this vintage (e.g. 2019)
    #[arg(long, global = true)]
    pub vintage: Option<String>,

    /// Load dataset metadata one dataset at a time
    #[arg(long, global = true)]
    pub sequential: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Search dataset metadata
    Search {
        /// Query; unqualified terms search titles
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Maximum results
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Search the variables of one dataset
    Variables {
        /// Dataset id (e.g. 2019/acs/acs5)
        dataset: String,

        /// Query; unqualified terms search labels. Omit to list every variable
        query: Vec<String>,

        /// Only variables of this group
        #[arg(short, long)]
        group: Option<String>,

        /// Maximum results
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Query data from one dataset
    Query {
        /// Dataset id (e.g. 2019/pep/population)
        dataset: String,

        /// Variables to fetch, comma-separated
        #[arg(long = "get", value_delimiter = ',', required = true)]
        fields: Vec<String>,

        /// Geography to return, as level:selector (e.g. county:*)
        #[arg(long = "for", value_parser = parse_geo, required = true)]
        for_geo: Vec<(String, String)>,

        /// Parent geography, as level:selector (e.g. state:06)
        #[arg(long = "in", value_parser = parse_geo)]
        in_geo: Vec<(String, String)>,

        /// Variable groups to fetch
        #[arg(long)]
        group: Vec<String>,
    },

    /// Configuration operations
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum ConfigAction {
    /// Show the resolved config file path
    Path,

    /// Create a default config file
    Init {
        /// Write to this file instead of the default location
        #[arg(long)]
        file: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

/// Parse a `level:selector` geography clause.
fn parse_geo(value: &str) -> Result<(String, String), String> {
    match value.split_once(':') {
        Some((level, selector)) if !level.trim().is_empty() && !selector.trim().is_empty() => {
            Ok((level.trim().to_string(), selector.trim().to_string()))
        }
        _ => Err(format!("expected level:selector, got '{value}'")),
    }
}

// ============================================================================
// Tests
// ============================================================================
