//! Command-line arguments

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(name = "textline")]
#[command(author, version, about = "SMS/MMS conversations from the command line", long_about = None)]
pub struct Cli {
    /// SQLite database to use instead of the configured one
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List conversations, newest first
    List {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        #[arg(short, long, default_value_t = 0)]
        offset: usize,
    },

    /// Show the messages of one conversation
    Show { thread: i64 },

    /// Store a received message and update the notification
    Receive {
        address: String,
        #[arg(required = true, num_args = 1..)]
        body: Vec<String>,
    },

    /// Store an outgoing message
    Send {
        address: String,
        #[arg(required = true, num_args = 1..)]
        body: Vec<String>,
    },

    /// Mark a conversation, or `all`, read
    MarkRead { target: Target },

    /// Delete a conversation, or `all`
    Delete { target: Target },

    /// Print the effective settings as JSON
    Settings {
        /// Also write them to the config directory
        #[arg(long)]
        write: bool,
    },
}

/// A single thread id or every thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    Thread(i64),
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse::<i64>()
            .map(Self::Thread)
            .map_err(|_| format!("expected a thread id or `all`, got {:?}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        assert_eq!("all".parse::<Target>(), Ok(Target::All));
        assert_eq!("ALL".parse::<Target>(), Ok(Target::All));
        assert_eq!("42".parse::<Target>(), Ok(Target::Thread(42)));
        assert!("forty".parse::<Target>().is_err());
    }

    #[test]
    fn test_parse_receive() {
        let cli = Cli::try_parse_from(["textline", "receive", "+15550100", "see", "you"]).unwrap();
        match cli.command {
            Command::Receive { address, body } => {
                assert_eq!(address, "+15550100");
                assert_eq!(body.join(" "), "see you");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_db() {
        let cli = Cli::try_parse_from(["textline", "mark-read", "all", "--db", "/tmp/x.sqlite"])
            .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.sqlite")));
        assert!(matches!(cli.command, Command::MarkRead { target: Target::All }));
    }

    #[test]
    fn test_parse_settings_write() {
        let cli = Cli::try_parse_from(["textline", "settings", "--write"]).unwrap();
        assert!(matches!(cli.command, Command::Settings { write: true }));

        let cli = Cli::try_parse_from(["textline", "settings"]).unwrap();
        assert!(matches!(cli.command, Command::Settings { write: false }));
    }

    #[test]
    fn test_cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
