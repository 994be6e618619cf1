//! Hydration rules for conversations and messages

use chrono::Utc;

use super::HydrationEvent;
use crate::models::{Contact, Conversation, Message};
use crate::source::{ContactLookup, LookupError, RowSource};

/// Why hydration of one entity was abandoned
#[derive(Debug, thiserror::Error)]
pub enum HydrateError {
    #[error("Contact lookup failed: {0}")]
    Contact(#[from] LookupError),

    #[error(transparent)]
    Source(#[from] anyhow::Error),
}

/// An entity that can be enriched from the row source and contact directory
///
/// Implementations resolve everything first and only then assign, so an
/// abandoned hydration leaves the entity as it was.
pub trait Hydrate: Send + Sync + 'static {
    /// Entities without a usable id are skipped
    fn is_valid(&self) -> bool;

    /// Event sent to listeners once this entity is filled in
    fn event(&self) -> HydrationEvent;

    fn hydrate(
        &mut self,
        source: &dyn RowSource,
        contacts: &dyn ContactLookup,
    ) -> Result<(), HydrateError>;
}

fn resolve_contact(
    contacts: &dyn ContactLookup,
    address: String,
) -> Result<Contact, LookupError> {
    Ok(contacts
        .lookup(&address)?
        .unwrap_or_else(|| Contact::unknown(address)))
}

impl Hydrate for Conversation {
    fn is_valid(&self) -> bool {
        self.thread_id > 0
    }

    fn event(&self) -> HydrationEvent {
        HydrationEvent::Conversation(self.thread_id)
    }

    fn hydrate(
        &mut self,
        source: &dyn RowSource,
        contacts: &dyn ContactLookup,
    ) -> Result<(), HydrateError> {
        let count = source.count_messages(self.thread_id)?;

        let body = match &self.body {
            Some(_) => None,
            None => source.last_body(self.thread_id)?,
        };

        let contact = match &self.contact {
            Some(_) => None,
            None => match source.recipient_address(self.recipient_id)? {
                Some(address) => Some(resolve_contact(contacts, address)?),
                None => None,
            },
        };

        self.message_count = count as i64;
        if body.is_some() {
            self.body = body;
        }
        if contact.is_some() {
            self.contact = contact;
        }
        self.last_hydrated = Some(Utc::now());
        Ok(())
    }
}

impl Hydrate for Message {
    fn is_valid(&self) -> bool {
        self.id.raw() != 0
    }

    fn event(&self) -> HydrationEvent {
        HydrationEvent::Message(self.id)
    }

    fn hydrate(
        &mut self,
        _source: &dyn RowSource,
        contacts: &dyn ContactLookup,
    ) -> Result<(), HydrateError> {
        if self.contact.is_none() {
            self.contact = Some(resolve_contact(contacts, self.address.clone())?);
        }
        self.last_hydrated = Some(Utc::now());
        Ok(())
    }
}
