//! Shared domain types for the blueprint store.
//!
//! This crate contains the domain types used across the workspace:
//! Blueprint, Category, embedding statistics, configuration, and the
//! error enums that cross crate boundaries.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod blueprint;
pub mod category;
pub mod config;
pub mod embedding;
pub mod error;
