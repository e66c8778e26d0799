//! docsync CLI entry point.

use clap::Parser;
use docsync::cli::commands;
use docsync::cli::{Cli, Commands};
use docsync::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    // Run the command and handle errors
    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let global = cli.global();

    match &cli.command {
        Commands::Init { docs_root, force } => {
            commands::init::execute(cli.root.as_deref(), docs_root.as_deref(), *force, json)
        }
        Commands::Version => commands::version::execute(json),

        // Documents
        Commands::Register(args) => commands::document::execute_register(args, &global, json),
        Commands::Show { id, content } => {
            commands::document::execute_show(id, *content, &global, json)
        }
        Commands::Update(args) => commands::document::execute_update(args, &global, json),
        Commands::Delete { id } => commands::document::execute_delete(id, &global, json),
        Commands::List(args) => commands::document::execute_list(args, &global, json),
        Commands::History { id, limit } => {
            commands::document::execute_history(id, *limit, &global, json)
        }
        Commands::Types { category } => commands::document::execute_types(category.as_deref(), json),

        // Sync
        Commands::Sync(args) => commands::sync::execute(args, &global, json),
        Commands::Status { refresh, all } => {
            commands::status::execute(*refresh, *all, &global, json)
        }
        Commands::Watch { debounce_ms } => commands::watch::execute(*debounce_ms, &global, json),

        // Search
        Commands::Search { query, limit } => {
            commands::search::execute_search(query, *limit, &global, json)
        }
        Commands::Reindex { rebuild } => commands::search::execute_reindex(*rebuild, &global, json),

        // Structure migration
        Commands::MigrateToStructure(args) => commands::migrate::execute(args, &global, json),

        // Shell completions
        Commands::Completions { shell } => commands::completions::execute(shell),
    }
}
