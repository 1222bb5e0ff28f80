//! Shared service handles used by the scheduler, the sync reconciler and hosts.

mod local_store;
mod outbox;

pub use local_store::{ChangeSet, LocalStore};
pub use outbox::Outbox;
