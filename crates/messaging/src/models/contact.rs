//! Contact metadata resolved from a phone address

use serde::{Deserialize, Serialize};

/// Contact details for an address, as returned by a contact lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Phone number or other address the contact was resolved from
    pub address: String,
    /// Display name from the address book
    pub name: Option<String>,
    /// Location of the contact's avatar image
    pub photo: Option<String>,
}

impl Contact {
    /// Create a contact that only knows its address
    pub fn unknown(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            photo: None,
        }
    }

    /// Create a contact with a display name
    pub fn named(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: Some(name.into()),
            photo: None,
        }
    }

    pub fn with_photo(mut self, photo: impl Into<String>) -> Self {
        self.photo = Some(photo.into());
        self
    }

    /// Name to show in lists and notifications, falling back to the address
    pub fn display_name(&self) -> &str {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.address,
        }
    }
}
