//! Outbound collaborators of a checkout.

pub mod notifier;

pub use notifier::{InMemoryNotifier, LogNotifier, Notifier, NotifyError, Receipt};
