//! Ledger events.
//!
//! APIs publish events only after the database transaction that produced them has committed. Handlers run on their
//! own tasks, so a slow or failing subscriber (a webhook, say) never affects the financial write.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
