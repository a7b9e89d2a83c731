//! parley-server: credential mediator for the avatar provider
//!
//! Forwards avatar-provider calls from clients and attaches the provider
//! API key on the way out, so no client ever holds the credential.

pub mod config;
pub mod error;
pub mod http;

pub use config::MediatorConfig;
pub use error::MediatorError;
pub use http::{create_router, MediatorState};
