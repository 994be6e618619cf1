//! Row sources and contact lookup
//!
//! A row source stands in for the platform's telephony tables. The
//! trait-based design allows swapping between an in-memory source for tests
//! and a SQLite-backed emulation for the command-line driver.

mod contacts;
mod memory;
mod sqlite;
mod traits;

pub use contacts::InMemoryContacts;
pub use memory::InMemoryRowSource;
pub use sqlite::SqliteRowSource;
pub use traits::{ALL_THREADS, ContactLookup, LookupError, RowSource};
