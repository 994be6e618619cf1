//! In-memory contact directory

use std::collections::HashMap;
use std::sync::RwLock;

use super::{ContactLookup, LookupError};
use crate::models::Contact;

/// Contact directory backed by a map of normalized address to contact
#[derive(Default)]
pub struct InMemoryContacts {
    contacts: RwLock<HashMap<String, Contact>>,
    /// Addresses whose lookup fails, to exercise abandoned hydration
    broken: RwLock<Vec<String>>,
}

impl InMemoryContacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a contact
    pub fn insert(&self, contact: Contact) {
        let key = normalize_address(&contact.address);
        self.contacts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, contact);
    }

    /// Make lookups of `address` fail with [`LookupError::Malformed`]
    pub fn mark_broken(&self, address: &str) {
        self.broken
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(normalize_address(address));
    }

    pub fn len(&self) -> usize {
        self.contacts.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContactLookup for InMemoryContacts {
    fn lookup(&self, address: &str) -> Result<Option<Contact>, LookupError> {
        let key = normalize_address(address);
        let broken = self.broken.read().unwrap_or_else(|e| e.into_inner());
        if broken.contains(&key) {
            return Err(LookupError::Malformed {
                address: address.to_string(),
            });
        }
        drop(broken);

        let contacts = self.contacts.read().unwrap_or_else(|e| e.into_inner());
        Ok(contacts.get(&key).cloned())
    }
}

/// Strip formatting so "+1 (555) 010-0" and "+15550100" compare equal
fn normalize_address(address: &str) -> String {
    address
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+' || c.is_alphabetic() || *c == '@')
        .collect()
}
