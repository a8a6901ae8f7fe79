//! # Contract Harness
//!
//! Ingestion engine for construction-contract document sets. Documents of
//! one contract (agreement, letter of acceptance, conditions, addenda, BOQ,
//! schedules) are split into clause-aligned chunks, cross-referenced,
//! ranked by contractual precedence and checked for structural problems.
//!
//! The pure logic lives in `contract_harness_core`; this crate adds
//! configuration, SQLite persistence, text extraction, remote providers and
//! the `ctr` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────┐   ┌──────────┐
//! │ Extraction   │──▶│ IngestionOrchestrator│──▶│  SQLite   │
//! │ File / OCR   │   │ chunk → refs → prio  │   │ 5 tables  │
//! └──────────────┘   │ → embed → validate   │   └──────────┘
//!                    └──────────┬───────────┘
//!                               ▼
//!                     reports · graph JSON · CLI
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | Repository traits over SQLite |
//! | [`extract`] | Local text/PDF/DOCX/XLSX extraction |
//! | [`ocr`] | OCR service client |
//! | [`retry`] | Timeout plus single retry for remote calls |
//! | [`embedding`] | OpenAI and Ollama embedding providers |
//! | [`ingest`] | The orchestrator and its stage report |
//! | [`export`] | JSON exports |
//! | [`commands`] | `ctr` command implementations |

pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod export;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod ocr;
pub mod retry;
pub mod sqlite_store;
