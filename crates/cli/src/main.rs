//! braindump CLI: the main entry point.
//!
//! Commands:
//! - `init`: Write the default config file
//! - `ingest`: Run one brain dump through the pipeline
//! - `serve`: Start the HTTP API
//! - `tasks`: Show the task snapshot
//! - `mark`: Change a task's status
//! - `summary`: Print a conversation's rolling summary

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "braindump",
    about = "braindump: turn free-form notes into a reconciled task list",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.braindump/config.toml)
    #[arg(short, long, global = true, env = "BRAINDUMP_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Ingest a brain dump and print the extraction
    Ingest {
        /// Continue an existing conversation
        #[arg(short = 'C', long = "conversation")]
        conversation: Option<String>,

        /// Topic for a new conversation
        #[arg(short, long, conflicts_with = "conversation")]
        topic: Option<String>,

        /// The text to ingest ("-" reads stdin)
        text: String,
    },

    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List the most recently updated tasks
    Tasks {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Change a task's status (New, "In Progress", Blocked, Done)
    Mark {
        id: i64,
        status: String,
    },

    /// Print the rolling summary of a conversation
    Summary {
        conversation: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init { force } => commands::init::run(config_path, force).await?,
        Commands::Ingest {
            conversation,
            topic,
            text,
        } => commands::ingest::run(config_path, conversation, topic, text).await?,
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Tasks { limit } => commands::tasks::run(config_path, limit).await?,
        Commands::Mark { id, status } => commands::tasks::mark(config_path, id, &status).await?,
        Commands::Summary { conversation } => {
            commands::summary::run(config_path, &conversation).await?
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn about_is_plain_ascii() {
        let about = Cli::command()
            .get_about()
            .map(|a| a.to_string())
            .unwrap_or_default();
        assert!(about.starts_with("braindump: "));
        assert!(about.is_ascii());
    }

    #[test]
    fn mark_takes_multi_word_status() {
        let cli = Cli::try_parse_from(["braindump", "mark", "3", "In Progress"]).unwrap();
        match cli.command {
            Commands::Mark { id, status } => {
                assert_eq!(id, 3);
                assert_eq!(status, "In Progress");
            }
            _ => panic!("expected mark"),
        }
    }
}
