//! This module implements the definition of the command line app.
//!
//! It must not have any other imports, so that it stays usable for generating completions and man
//! pages.
use std::path::PathBuf;

use clap::builder::ValueParser;
use clap::{Arg, Command};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Aggregates metrics and events and flushes them to a time-series backend.";

pub fn make_app() -> Command {
    Command::new("aggregated")
        .disable_help_subcommand(true)
        .max_term_width(79)
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .value_name("CONFIG")
                .long("config")
                .short('c')
                .env("AGGREGATED_CONFIG")
                .required(true)
                .value_parser(ValueParser::path_buf())
                .help("The path to the configuration file."),
        )
        .after_help(
            "This runs the daemon in the foreground until it is terminated. It binds all \
             listeners enabled in the configuration file and flushes aggregated buckets to the \
             configured outputs.",
        )
}

/// Returns the configuration path from the parsed arguments.
pub fn config_path(matches: &clap::ArgMatches) -> Option<&PathBuf> {
    matches.get_one::<PathBuf>("config")
}
