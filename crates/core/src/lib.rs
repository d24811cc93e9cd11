//! Core types and shared functionality for flagline.
//!
//! This crate provides:
//! - SQLite-backed state store for the location cache, pending uploads and settings
//! - Unified error types
//! - Configuration structures

pub mod config;
pub mod error;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use store::{CacheEntry, PendingUpload, StateDb};
