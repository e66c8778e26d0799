//! Data models for docsync.
//!
//! This module contains the domain models:
//! - DocumentReference and its inputs (NewDocument, DocumentUpdate, DocumentFilter)
//! - Owner, StorageMode, SyncStatus, DocumentFormat
//! - The document type → category taxonomy

pub mod document;
pub mod taxonomy;

pub use document::{
    derive_title, DocumentFilter, DocumentFormat, DocumentReference, DocumentUpdate, NewDocument,
    Owner, StorageMode, SyncStatus,
};
pub use taxonomy::{Category, DocumentType};
