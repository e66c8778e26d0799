//! Command implementations.

pub mod completions;
pub mod document;
pub mod init;
pub mod migrate;
pub mod search;
pub mod status;
pub mod sync;
pub mod version;
pub mod watch;
pub mod workspace;
