//! CLI interface for Abacus
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Abacus conversational assistant
///
/// Answers questions from uploaded documents, and answers computational
/// questions by generating, vetting and running Python snippets in a sandbox.
#[derive(Parser, Debug)]
#[command(name = "abacus")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP interface
    Serve,

    /// Answer a single query
    Ask {
        /// The question to answer
        query: String,

        /// Conversation session to use
        #[arg(short, long, default_value = crate::orchestrator::DEFAULT_SESSION)]
        session: String,
    },

    /// Start an interactive conversation (/clear, /regen, /quit)
    Chat {
        /// Conversation session to use
        #[arg(short, long, default_value = crate::orchestrator::DEFAULT_SESSION)]
        session: String,
    },

    /// Add PDF or text files to the knowledge base
    Ingest {
        /// Files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Vet a Python snippet without running it ("-" reads stdin)
    Vet {
        /// Snippet file
        file: String,
    },

    /// Vet a Python snippet, then run it in the sandbox ("-" reads stdin)
    Exec {
        /// Snippet file
        file: String,
    },

    /// Run system diagnostics
    Doctor,
}
