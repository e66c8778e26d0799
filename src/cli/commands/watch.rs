//! Watch command implementation.

use colored::Colorize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::commands::workspace::Workspace;
use crate::cli::GlobalOptions;
use crate::error::{Error, Result};
use crate::sync::WatchTrigger;

/// Execute the watch command. Runs until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the runtime or the filesystem watcher cannot start.
pub fn execute(debounce_ms: Option<u64>, global: &GlobalOptions, json: bool) -> Result<()> {
    let ws = Workspace::open(global)?;
    let delay = debounce_ms.map_or_else(|| ws.settings.debounce(), Duration::from_millis);
    let trigger = WatchTrigger::new(ws.orchestrator.clone()).with_debounce(delay);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))?;

    if !json {
        println!(
            "Watching {} (debounce {} ms). Press Ctrl-C to stop.",
            ws.root.display(),
            delay.as_millis()
        );
    }

    let stats = rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Stopping watcher");
                on_signal.cancel();
            }
        });
        trigger.run(cancel).await
    })?;

    if json {
        println!("{}", serde_json::to_string(&stats)?);
    } else {
        println!();
        println!("{}", "Watch stopped".bold());
        println!("  Events:       {}", stats.events);
        println!("  Synced:       {}", stats.synced);
        println!("  Unchanged:    {}", stats.unchanged);
        println!("  Unregistered: {}", stats.unregistered);
        if stats.failed > 0 {
            println!("  Failed:       {}", stats.failed.to_string().red());
        }
    }
    Ok(())
}
