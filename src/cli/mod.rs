//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;

/// docsync - SQLite-authoritative documents with an editable file tree
#[derive(Parser, Debug)]
#[command(name = "docsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: <root>/.docsync/docsync.db)
    #[arg(long, global = true, env = "DOCSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Project root (default: discovered from the current directory)
    #[arg(long, global = true, env = "DOCSYNC_ROOT")]
    pub root: Option<PathBuf>,

    /// Actor name for audit trail
    #[arg(long, global = true, env = "DOCSYNC_ACTOR")]
    pub actor: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

impl Cli {
    /// Flags every workspace-opening command needs.
    #[must_use]
    pub fn global(&self) -> GlobalOptions {
        GlobalOptions {
            db: self.db.clone(),
            root: self.root.clone(),
            actor: self.actor.clone(),
        }
    }
}

/// Global flags passed down to command handlers.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub db: Option<PathBuf>,
    pub root: Option<PathBuf>,
    pub actor: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a docsync project in the current directory (or --root)
    Init {
        /// Top-level directory for canonical document paths
        #[arg(long)]
        docs_root: Option<String>,

        /// Rewrite settings even if the project is already initialized
        #[arg(long)]
        force: bool,
    },

    /// Print version information
    Version,

    /// Register a document
    Register(RegisterArgs),

    /// Show a document's metadata
    Show {
        /// Document ID
        id: String,

        /// Print the stored content instead of metadata
        #[arg(long)]
        content: bool,
    },

    /// Update a document's content or metadata
    Update(UpdateArgs),

    /// Delete a document (and its file, for hybrid documents)
    Delete {
        /// Document ID
        id: String,
    },

    /// List tracked documents
    List(ListArgs),

    /// Show a document's audit history
    History {
        /// Document ID
        id: String,

        /// Maximum number of events
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// List document types and the category each maps to
    Types {
        /// Only show types of one category
        #[arg(long)]
        category: Option<String>,
    },

    /// Sync one document or a batch between database and files
    Sync(SyncArgs),

    /// Show sync status counts
    Status {
        /// Re-detect every document before counting
        #[arg(long)]
        refresh: bool,

        /// List every out-of-sync document
        #[arg(long)]
        all: bool,
    },

    /// Watch the file tree and sync edited documents into the database
    Watch {
        /// Quiet window before an edit is synced
        #[arg(long)]
        debounce_ms: Option<u64>,
    },

    /// Full-text search over tracked documents
    Search {
        /// FTS5 query
        query: String,

        /// Maximum number of hits
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Retry queued search index writes
    Reindex {
        /// Drop and rebuild the whole index
        #[arg(long)]
        rebuild: bool,
    },

    /// Move legacy document paths into docs/<category>/<type>/<file>
    MigrateToStructure(MigrateArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// Storage mode on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ModeArg {
    #[default]
    Hybrid,
    DatabaseOnly,
    FileOnly,
}

impl From<ModeArg> for crate::model::StorageMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Hybrid => Self::Hybrid,
            ModeArg::DatabaseOnly => Self::DatabaseOnly,
            ModeArg::FileOnly => Self::FileOnly,
        }
    }
}

// ============================================================================
// Document Commands
// ============================================================================

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Path relative to the project root
    pub path: String,

    /// Document type (e.g. tutorial, adr, runbook)
    #[arg(short = 't', long = "type")]
    pub document_type: String,

    /// Owning entity, as kind:id (project:1, work-item:12, task:7, idea:3)
    #[arg(long, default_value = "project:1")]
    pub owner: String,

    /// Where content lives
    #[arg(long, value_enum, default_value_t)]
    pub mode: ModeArg,

    /// Initial content
    #[arg(long, conflicts_with = "content_file")]
    pub content: Option<String>,

    /// Read initial content from a file
    #[arg(long)]
    pub content_file: Option<PathBuf>,

    /// Display title (default: first heading, else file stem)
    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Register a path that does not follow the canonical layout
    #[arg(long)]
    pub legacy: bool,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Document ID
    pub id: String,

    /// New content
    #[arg(long, conflicts_with = "content_file")]
    pub content: Option<String>,

    /// Read new content from a file
    #[arg(long)]
    pub content_file: Option<PathBuf>,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Switch storage mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,
}

#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Only documents of this category
    #[arg(long)]
    pub category: Option<String>,

    /// Only documents with this storage mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Only documents owned by kind:id
    #[arg(long)]
    pub owner: Option<String>,

    /// Only documents whose path starts with this prefix
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Maximum number of documents
    #[arg(short, long)]
    pub limit: Option<usize>,
}

// ============================================================================
// Sync Commands
// ============================================================================

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Document ID (omit with --all)
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub id: Option<String>,

    /// Sync every document matching the filters
    #[arg(long)]
    pub all: bool,

    /// db-to-file, file-to-db or bidirectional
    #[arg(short, long, default_value = "bidirectional")]
    pub direction: String,

    /// Conflict strategy: db-wins, file-wins, latest-wins, manual
    #[arg(short, long)]
    pub strategy: Option<String>,

    /// Report what a batch would do without writing
    #[arg(long, requires = "all")]
    pub dry_run: bool,

    #[command(flatten)]
    pub filter: FilterArgs,
}

// ============================================================================
// Migration Commands
// ============================================================================

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Show the plan without moving anything (default)
    #[arg(long, conflicts_with_all = ["execute", "rollback"])]
    pub dry_run: bool,

    /// Perform the moves
    #[arg(long, conflicts_with = "rollback")]
    pub execute: bool,

    /// Undo a previous run
    #[arg(long, value_name = "RUN_ID")]
    pub rollback: Option<String>,

    /// List recent runs instead of planning
    #[arg(long, conflicts_with_all = ["execute", "rollback", "dry_run"])]
    pub runs: bool,

    /// File every moved document under this category
    #[arg(long)]
    pub category: Option<String>,

    /// Skip backups of moved files
    #[arg(long)]
    pub no_backup: bool,

    /// Confirm destructive operations
    #[arg(short, long)]
    pub yes: bool,

    /// Only consider documents whose path starts with this prefix
    #[arg(long)]
    pub prefix: Option<String>,
}
