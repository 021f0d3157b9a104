use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "parley", about = "One-to-one messaging core (CLI host)")]
pub struct Cli {
    /// Path to config file (default: ./parley.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List directory users
    Users {
        /// Hide this identity from the listing
        #[arg(long = "as")]
        as_id: Option<String>,
    },
    /// Send a message to a peer
    Send(SendArgs),
    /// Print conversation history, oldest first
    History(HistoryArgs),
    /// Delete a whole conversation
    Delete(ConversationArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ConversationArgs {
    /// Identity acting in the conversation
    #[arg(long = "as")]
    pub as_id: String,
    /// The other participant
    #[arg(long = "with")]
    pub with: String,
}

#[derive(Debug, Clone, Args)]
pub struct SendArgs {
    #[arg(long = "as")]
    pub as_id: String,
    #[arg(long)]
    pub to: String,
    pub text: String,
}

#[derive(Debug, Clone, Args)]
pub struct HistoryArgs {
    #[command(flatten)]
    pub conversation: ConversationArgs,
    /// Page size (0 uses the configured default)
    #[arg(long, default_value_t = 0)]
    pub limit: usize,
}

impl Cli {
    pub fn command_or_default(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Users { as_id: None })
    }
}
