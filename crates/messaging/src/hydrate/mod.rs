//! Background hydration of cached entities
//!
//! Hydration fills in what a bare row does not carry: message counts,
//! missing snippets and contact details. Listeners subscribed through
//! [`Observers`] are told when an entity has been filled in.

mod entity;
mod hydrator;
mod observer;

pub use entity::{Hydrate, HydrateError};
pub use hydrator::Hydrator;
pub use observer::{HydrationEvent, HydrationListener, Observers, Subscription};
