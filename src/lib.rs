//! docsync - hybrid document storage with a synchronized file tree
//!
//! This crate provides the core functionality for the `docsync` CLI tool.
//! SQLite holds the authoritative copy of every tracked document; an
//! editable file tree under the project root mirrors it.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (DocumentReference, Owner, the type/category taxonomy)
//! - [`validate`] - Path contract and document type normalization
//! - [`storage`] - SQLite content store and full-text index
//! - [`sync`] - Change detection, conflict resolution, sync orchestration, file watching
//! - [`migrate`] - Relocation of legacy paths into the canonical layout
//! - [`config`] - Project discovery and settings
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod migrate;
pub mod model;
pub mod storage;
pub mod sync;
pub mod validate;

pub use error::{Error, Result};
