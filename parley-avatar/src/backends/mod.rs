//! `AvatarBackend` implementations beyond the streaming engine

pub mod clip;

pub use clip::ClipBackend;
