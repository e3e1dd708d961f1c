use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vaultkeep::cli::{Cli, Commands, EntryAction};
use vaultkeep::vault::EntryKind;

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "vaultkeep starting");

    let result = match cli.command {
        Commands::Init => vaultkeep::cli::commands::init::execute(&cli),
        Commands::Keygen { ref path } => vaultkeep::cli::commands::keygen::execute(&cli, path),
        Commands::Card { ref action } => run_entry_action(&cli, Some(EntryKind::Card), action),
        Commands::Api { ref action } => run_entry_action(&cli, Some(EntryKind::ApiKey), action),
        Commands::Entry(ref action) => run_entry_action(&cli, None, action),
    };

    if let Err(e) = result {
        vaultkeep::cli::output::error(&e.to_string());
        if e.is_retryable() {
            vaultkeep::cli::output::tip("The store may be temporarily unavailable; run the command again.");
        }
        std::process::exit(e.exit_code());
    }
}

/// `card` and `api` prefixes pick the kind for `add` and filter `ls`.
/// Without a prefix, `add` creates a password entry and `ls` shows all.
fn run_entry_action(
    cli: &Cli,
    kind: Option<EntryKind>,
    action: &EntryAction,
) -> vaultkeep::errors::Result<()> {
    use vaultkeep::cli::commands;

    match action {
        EntryAction::Add { id, fields } => {
            commands::add::execute(cli, kind.unwrap_or(EntryKind::Password), id, fields)
        }
        EntryAction::Get { id, copy } => commands::get::execute(cli, id, *copy),
        EntryAction::Ls => commands::ls::execute(cli, kind),
        EntryAction::Delete { id, force } => commands::delete::execute(cli, id, *force),
        EntryAction::Edit { id, fields } => commands::edit::execute(cli, id, fields),
    }
}
