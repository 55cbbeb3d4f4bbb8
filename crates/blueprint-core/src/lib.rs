//! Business logic and port definitions for the blueprint store.
//!
//! This crate defines the ports that the infrastructure layer implements
//! (`EmbeddingProvider`, `ProviderFactory`, `BlueprintRepository`) and the
//! logic built on top of them: the multi-provider `EmbeddingService` and the
//! `BlueprintStore`. It depends only on `blueprint-types` -- never on
//! `blueprint-infra` or any database/HTTP crate.

pub mod embedding;
pub mod repository;
pub mod store;
pub mod vector;
