//! This module defines the command-line interface for `afq` using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options.
//!
//! # Examples
//!
//! Parsing command-line arguments:
//!
//! ```no_run
//! use clap::Parser;
//! use awful_faq::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Commands::Ask { question, json } => {
//!         // Answer a single question
//!     }
//!     _ => {}
//! }
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Path to config.yaml. Defaults to the platform config directory.
    #[arg(long, short = 'c', global = true, env = "AFQ_CONFIG")]
    pub config: Option<PathBuf>,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Answer one question against the knowledge base.
    #[clap(name = "ask", alias = "a")]
    Ask {
        /// The question to answer.
        question: String,

        /// Print the full retrieval result as JSON instead of the reply text.
        #[arg(long)]
        json: bool,
    },

    /// Append a Q&A pair to the knowledge file.
    #[clap(name = "add", alias = "addqa")]
    Add { question: String, answer: String },

    /// Reload the knowledge file and rebuild the index.
    Train,

    /// Show knowledge base size and model settings.
    Stats,

    /// Answer questions read line by line from stdin until EOF.
    #[clap(name = "serve", alias = "s")]
    Serve {
        /// Requester id recorded in the interaction log.
        #[arg(long, default_value = "stdin")]
        requester: String,

        /// Channel recorded in the interaction log.
        #[arg(long)]
        channel: Option<String>,
    },

    /// Write a default config and a sample knowledge file.
    Init,
}
