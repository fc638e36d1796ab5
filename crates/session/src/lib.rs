#![deny(unsafe_code)]

//! Conversation session core: message log, model catalog, request lifecycle
//! and the controller composing them.

pub mod catalog;
pub mod controller;
mod events;
pub mod message;
pub mod request;

pub use catalog::{CATALOG_FAILURE_NOTICE, CatalogOutcome, CatalogTicket, ModelCatalogCache};
pub use controller::{SessionController, SessionSnapshot};
pub use events::SessionChange;
pub use message::{GREETING, Message, MessageLog, Role};
pub use request::{
    PendingSubmission, RequestId, RequestLifecycle, RequestOutcome, RequestRejection,
    RequestState, failure_message,
};
