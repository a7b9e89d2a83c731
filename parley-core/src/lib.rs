//! parley-core: shared plumbing for the Parley interview client
//!
//! - Process-wide configuration and its manager
//! - Shared error type and tracing bootstrap
//! - Identity provider and local persistence seams
//! - Client-side routes and the navigation guard

pub mod config;
pub mod config_manager;
pub mod error;
pub mod identity;
pub mod logging;
pub mod routes;
pub mod storage;

pub use config::{ConfigError, ParleyConfig, Quality, Theme};
pub use config_manager::ConfigManager;
pub use error::{Error, Result};
pub use identity::{AuthEvent, AuthSession, IdentityProvider, MemoryIdentityProvider, User};
pub use routes::Route;
pub use storage::{
    CandidateProfile, CandidateRecord, JsonFileStore, LocalStore, MemoryStore, StoredFile,
    UploadedFile,
};
