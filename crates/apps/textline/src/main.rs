//! Textline - SMS/MMS conversations from the command line
//!
//! Drives the messaging core against a SQLite row source.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::Parser;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use messaging::notify::ThreadSleeper;
use messaging::{
    ActionHandler, Contact, InMemoryContacts, InboundSms, LogNotifier, LogToaster, Messenger,
    Reconciler, Settings, SqliteRowSource, get_thread_detail, list_conversations,
};

mod cli;

use cli::{Cli, Command, Target};

/// Contacts file in the Textline config directory
const CONTACTS_FILE: &str = "contacts.json";

/// How long to let background hydration finish before exiting
const HYDRATION_GRACE: Duration = Duration::from_secs(5);

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load()?;
    if cli.db.is_some() {
        settings.database = cli.db;
    }

    match cli.command {
        Command::Settings { write } => show_settings(&settings, write),
        command => run_command(settings, command),
    }
}

fn run_command(settings: Settings, command: Command) -> Result<()> {
    let db_path = settings
        .database_path()
        .context("Could not determine data directory")?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    info!("Using database {}", db_path.display());

    let source = Arc::new(SqliteRowSource::new(&db_path)?);
    let contacts = Arc::new(load_contacts());
    let messenger = Arc::new(Messenger::new(source.clone(), contacts.clone(), &settings)?);

    let reconciler = Arc::new(
        Reconciler::new(source, contacts, Arc::new(LogNotifier))
            .with_policy(settings.retry_policy())
            .with_sleeper(Arc::new(ThreadSleeper::new()))
            .with_notifications(settings.notifications.enabled),
    );
    let actions = ActionHandler::new(Arc::clone(&messenger), reconciler, Arc::new(LogToaster));

    match command {
        Command::List { limit, offset } => {
            for summary in list_conversations(&messenger, limit, offset, true)? {
                let count = summary
                    .message_count
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "{:>5} {} {:<20} {:>4} {}  {}",
                    summary.thread_id,
                    if summary.is_unread { "*" } else { " " },
                    summary.display_name,
                    count,
                    local_time(summary.date),
                    summary.snippet,
                );
            }
        }
        Command::Show { thread } => {
            let detail = get_thread_detail(&messenger, thread, true)?
                .with_context(|| format!("No conversation {}", thread))?;
            let title = detail
                .conversation
                .display_name()
                .unwrap_or(messaging::query::UNKNOWN_SENDER);
            println!("{} (thread {})", title, thread);
            for message in &detail.messages {
                let from = if message.kind.is_outgoing() {
                    "me"
                } else {
                    message.display_name()
                };
                let when = DateTime::from_timestamp_millis(message.date).unwrap_or_default();
                println!(
                    "[{}] {}: {}",
                    local_time(when),
                    from,
                    message.body.as_deref().unwrap_or_default()
                );
            }
        }
        Command::Receive { address, body } => {
            let inbound = InboundSms::new(address, body.join(" "), Utc::now().timestamp_millis());
            let outcome = actions.receive(&inbound)?;
            info!(
                "Reconciled after {} retries ({} unread, matched: {})",
                outcome.retries, outcome.unread, outcome.matched
            );
        }
        Command::Send { address, body } => {
            let id = actions.send(&address, &body.join(" "))?;
            println!("{}", id);
        }
        Command::MarkRead { target } => {
            let changed = match target {
                Target::All => actions.mark_all_read()?,
                Target::Thread(id) => actions.mark_read(id)?,
            };
            println!("{} messages marked read", changed);
        }
        Command::Delete { target } => {
            let removed = match target {
                Target::All => actions.delete_all()?,
                Target::Thread(id) => actions.delete_thread(id)?,
            };
            println!("{} messages deleted", removed);
        }
        Command::Settings { write } => show_settings(&settings, write)?,
    }

    if !messenger.wait_idle(HYDRATION_GRACE) {
        warn!("Background hydration still running at exit");
    }
    Ok(())
}

/// Print the effective settings, saving them when `write` is set
fn show_settings(settings: &Settings, write: bool) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    if write {
        settings.save()?;
        info!("Settings saved to {}", messaging::settings::SETTINGS_FILE);
    }
    Ok(())
}

/// Load the contact directory from the config dir, empty when absent
fn load_contacts() -> InMemoryContacts {
    let contacts = InMemoryContacts::new();
    if !config::config_exists(CONTACTS_FILE) {
        return contacts;
    }

    match config::load_json::<Vec<Contact>>(CONTACTS_FILE) {
        Ok(entries) => {
            info!("Loaded {} contacts", entries.len());
            for contact in entries {
                contacts.insert(contact);
            }
        }
        Err(e) => warn!("Ignoring contacts file: {:#}", e),
    }
    contacts
}

fn local_time(date: DateTime<Utc>) -> String {
    date.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}
