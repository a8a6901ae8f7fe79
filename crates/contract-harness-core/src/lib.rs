//! # Contract Harness Core
//!
//! Pure ingestion logic for multi-document legal contracts: data model,
//! clause parsing and chunking, cross-reference detection, document
//! precedence, structural validation, and the repository interfaces the
//! pipeline persists through.
//!
//! This crate contains no tokio, sqlx, network, or filesystem I/O. The
//! `contract-harness` app crate provides those and wires everything
//! together.

pub mod chunk;
pub mod clause;
pub mod embedding;
pub mod models;
pub mod priority;
pub mod references;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod validation;
