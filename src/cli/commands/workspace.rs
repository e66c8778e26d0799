//! Opening a project for a command.
//!
//! Every command that touches documents resolves the project root, loads
//! settings, opens the store and wraps it in an orchestrator the same way.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::cli::{FilterArgs, GlobalOptions};
use crate::config::{data_dir, default_actor, resolve_db_path, resolve_root, Settings};
use crate::error::{Error, Result};
use crate::model::{DocumentFilter, Owner};
use crate::storage::DocumentStore;
use crate::sync::{ConflictStrategy, SyncOrchestrator};
use crate::validate::parse_category;

/// An opened project.
pub struct Workspace {
    pub root: PathBuf,
    pub settings: Settings,
    pub orchestrator: Arc<SyncOrchestrator>,
}

impl Workspace {
    /// Open the project named by the global flags.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` if there is no `.docsync/` directory and no
    /// explicit database, or a settings/database error.
    pub fn open(global: &GlobalOptions) -> Result<Self> {
        Self::open_with_strategy(global, None)
    }

    /// Open the project with a strategy that overrides the configured one.
    ///
    /// # Errors
    ///
    /// Same as [`Self::open`].
    pub fn open_with_strategy(
        global: &GlobalOptions,
        strategy: Option<ConflictStrategy>,
    ) -> Result<Self> {
        let root = resolve_root(global.root.as_deref())?;
        if global.db.is_none() && !data_dir(&root).is_dir() {
            return Err(Error::NotInitialized);
        }

        let settings = Settings::load(&root)?;
        let db_path = resolve_db_path(global.db.as_deref(), &root);
        debug!(root = %root.display(), db = %db_path.display(), "Opening workspace");

        let actor = default_actor(global.actor.as_deref());
        let store = DocumentStore::open(&db_path)?
            .with_contract(settings.contract())
            .with_actor(&actor);

        let orchestrator = SyncOrchestrator::new(Arc::new(store), &root)
            .with_strategy(strategy.unwrap_or(settings.default_strategy))
            .with_workers(settings.workers);

        Ok(Self {
            root,
            settings,
            orchestrator: Arc::new(orchestrator),
        })
    }

    pub fn store(&self) -> &DocumentStore {
        self.orchestrator.store()
    }

    #[must_use]
    pub fn backup_root(&self) -> PathBuf {
        self.settings.backup_root(&self.root)
    }

    /// Resolve a user-supplied path against the current directory.
    #[must_use]
    pub fn relative_path(&self, input: &str) -> String {
        relative_to(&self.root, input)
    }
}

/// Express `input` relative to `root` when it is an absolute path inside it.
fn relative_to(root: &Path, input: &str) -> String {
    let path = Path::new(input);
    if path.is_absolute() {
        if let Ok(rel) = path.strip_prefix(root) {
            return rel.to_string_lossy().replace('\\', "/");
        }
    }
    input.to_string()
}

/// Parse an owner given as `kind:id`.
///
/// # Errors
///
/// Returns `InvalidArgument` for malformed owners.
pub fn parse_owner(input: &str) -> Result<Owner> {
    Owner::parse(input).ok_or_else(|| {
        Error::InvalidArgument(format!(
            "invalid owner '{input}' (expected kind:id with kind project, work-item, task or idea)"
        ))
    })
}

impl FilterArgs {
    /// Build a store filter from the command-line flags.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an unknown category or malformed owner.
    pub fn to_filter(&self) -> Result<DocumentFilter> {
        Ok(DocumentFilter {
            owner: self.owner.as_deref().map(parse_owner).transpose()?,
            storage_mode: self.mode.map(Into::into),
            category: self.category.as_deref().map(parse_category).transpose()?,
            path_prefix: self.prefix.clone(),
            ids: None,
        })
    }
}
