//! Infrastructure implementations for the blueprint store.
//!
//! Provides concrete implementations of the repository and provider traits
//! defined in `blueprint-core`, plus the configuration loader.

pub mod config;
pub mod embedding;
pub mod sqlite;
