//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "groundchat",
    version,
    about = "Knowledge-grounded chat assistant that learns who it is talking to",
    long_about = "Groundchat answers from a static knowledge file using hybrid semantic and lexical \
                  retrieval, and over a conversation quietly collects the user's name, email and \
                  income without asking twice."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/groundchat/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Named profile of overrides from the config file
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the daemon in the foreground
    Serve,

    /// Chat with the running daemon
    Chat {
        /// Send a single message and exit (interactive when omitted)
        message: Option<String>,

        /// Continue an existing session
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Show the fields collected for a session
    Session {
        /// Session ID
        id: String,

        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Deliver a session report (webhook or outbox)
    Deliver {
        /// Session ID
        id: String,
    },

    /// Show daemon status
    Status,

    /// Build the knowledge index locally and report its size
    Index,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_chat_with_session() {
        let cli = Cli::try_parse_from(["groundchat", "chat", "hello", "--session", "abc", "-v"])
            .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Chat { message, session } => {
                assert_eq!(message.as_deref(), Some("hello"));
                assert_eq!(session.as_deref(), Some("abc"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
