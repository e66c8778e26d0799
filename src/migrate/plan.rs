//! Migration planning.
//!
//! A plan is a pure function of the registered documents and the files on
//! disk. Executing a plan never recomputes targets, so a dry run shows
//! exactly the paths an execution will produce.

use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

use crate::error::Result;
use crate::model::{Category, DocumentFilter, DocumentReference, DocumentType, StorageMode};
use crate::storage::DocumentStore;
use crate::sync::file::file_size;
use crate::validate::{filename_of, PathContract};

/// Inputs that shape a plan.
#[derive(Debug, Clone, Default)]
pub struct MigrationOptions {
    /// File every moved document under this category instead of its mapped one.
    pub category_override: Option<Category>,
    /// Restrict the candidates.
    pub filter: DocumentFilter,
}

/// One planned relocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedMove {
    pub document_id: String,
    pub from_path: String,
    pub to_path: String,
    pub document_type: DocumentType,
    pub from_category: Category,
    pub to_category: Category,
    pub storage_mode: StorageMode,
    /// Bytes on disk to copy; 0 when there is no file.
    pub size_bytes: u64,
    /// The natural target was taken and a numeric suffix was added.
    pub renamed: bool,
}

/// Every planned move plus aggregate statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationPlan {
    pub category_override: Option<Category>,
    pub moves: Vec<PlannedMove>,
    /// Candidates examined.
    pub examined: usize,
    /// Candidates already in place.
    pub conforming: usize,
    pub estimated_bytes: u64,
}

impl MigrationPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    /// Number of planned moves that needed a collision suffix.
    #[must_use]
    pub fn renamed(&self) -> usize {
        self.moves.iter().filter(|m| m.renamed).count()
    }
}

/// Build a plan for every non-conforming document matching `options`.
///
/// # Errors
///
/// Returns an error if the store cannot be listed.
pub fn plan_migration(
    store: &DocumentStore,
    root: &Path,
    options: &MigrationOptions,
) -> Result<MigrationPlan> {
    let contract = store.contract();
    let candidates = store.list(&options.filter)?;

    // Every registered path is taken, including ones outside the filter
    let mut taken: HashSet<String> = store
        .list(&DocumentFilter::default())?
        .into_iter()
        .map(|d| d.file_path)
        .collect();

    let mut plan = MigrationPlan {
        category_override: options.category_override,
        examined: candidates.len(),
        ..MigrationPlan::default()
    };

    for doc in candidates {
        if contract.is_placed(&doc.file_path, doc.category, doc.document_type) {
            plan.conforming += 1;
            continue;
        }

        let to_category = options
            .category_override
            .unwrap_or_else(|| doc.document_type.category());
        let (to_path, renamed) = free_target(contract, root, &doc, to_category, &taken);
        taken.insert(to_path.clone());

        let size_bytes = if doc.storage_mode == StorageMode::DatabaseOnly {
            0
        } else {
            file_size(&root.join(&doc.file_path))
        };
        plan.estimated_bytes += size_bytes;

        plan.moves.push(PlannedMove {
            document_id: doc.id,
            from_path: doc.file_path,
            to_path,
            document_type: doc.document_type,
            from_category: doc.category,
            to_category,
            storage_mode: doc.storage_mode,
            size_bytes,
            renamed,
        });
    }

    Ok(plan)
}

/// The canonical target for `doc`, suffixed `-1`, `-2`, ... until it is free
/// both in the store and on disk.
fn free_target(
    contract: &PathContract,
    root: &Path,
    doc: &DocumentReference,
    category: Category,
    taken: &HashSet<String>,
) -> (String, bool) {
    let filename = filename_of(&doc.file_path);
    let natural = contract.canonical_path(category, doc.document_type, filename);
    if is_free(root, &natural, taken) {
        return (natural, false);
    }

    let (stem, ext) = split_extension(filename);
    let mut n = 1;
    loop {
        let candidate_name = match ext {
            Some(ext) => format!("{stem}-{n}.{ext}"),
            None => format!("{stem}-{n}"),
        };
        let candidate = contract.canonical_path(category, doc.document_type, &candidate_name);
        if is_free(root, &candidate, taken) {
            return (candidate, true);
        }
        n += 1;
    }
}

fn is_free(root: &Path, path: &str, taken: &HashSet<String>) -> bool {
    !taken.contains(path) && !root.join(path).exists()
}

fn split_extension(filename: &str) -> (&str, Option<&str>) {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (filename, None),
    }
}
