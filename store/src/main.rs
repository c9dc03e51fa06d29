//! Todo Store - terminal host.
//!
//! This binary hosts a [`TodoStore`] without a GUI: notifications are printed
//! as JSON lines on stdout and file dialogs become prompts on stderr.
//!
//! # Commands
//!
//! - `todo-store path`: Print the default list path
//! - `todo-store show`: Print the stored list
//! - `todo-store save [PAYLOAD]`: Replace the stored list
//! - `todo-store session`: Interactive session with live change notifications
//!
//! # Environment Variables
//!
//! See the [`config`](todo_store::config) module for available configuration options.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use directories::BaseDirs;
use tokio::signal;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use todo_store::{Notification, PathProvider, StoreConfig, TodoStore};

/// Todo Store - watched single-file storage for a todo list.
#[derive(Parser, Debug)]
#[command(name = "todo-store")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    TODOS_DIR            Storage directory (default: ~/.todos)
    TODOS_DEBOUNCE_MS    Quiet period before a change is reported (default: 50)
    TODOS_NOTIFY_BUFFER  Notification buffer size (default: 64)
    RUST_LOG             Log filter (default: info)

SESSION COMMANDS:
    show                 Print the active list
    save <PAYLOAD>       Replace the active list
    export <PAYLOAD>     Save to a new file and switch to it
    import               Switch to an existing file
    path                 Print the active and watched paths
    quit                 End the session
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Print the default list path.
    Path,

    /// Print the stored list.
    Show,

    /// Replace the stored list.
    ///
    /// Reads the payload from stdin when no argument is given.
    Save {
        /// New list content.
        payload: Option<String>,
    },

    /// Start an interactive session.
    ///
    /// Prints every store notification as a JSON line on stdout and reads
    /// commands from stdin.
    Session,
}

/// Path provider for terminal hosts.
///
/// Dialogs are replaced by a prompt on stderr answered with one stdin line.
/// An empty answer cancels.
struct TerminalPaths;

impl TerminalPaths {
    fn prompt(title: &str, filter: &str) -> Option<PathBuf> {
        eprint!("{title} ({filter}), empty to cancel: ");
        io::stderr().flush().ok()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input).ok()?;
        let input = input.trim();
        (!input.is_empty()).then(|| PathBuf::from(input))
    }
}

impl PathProvider for TerminalPaths {
    fn home_dir(&self) -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
    }

    fn prompt_save_file(&self, title: &str, filter: &str) -> Option<PathBuf> {
        Self::prompt(title, filter)
    }

    fn prompt_open_file(&self, title: &str, filter: &str) -> Option<PathBuf> {
        Self::prompt(title, filter)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging();

    let config = StoreConfig::from_env().context("Failed to load configuration")?;

    match cli.command {
        Command::Path => {
            let (_, path) = TodoStore::resolve_default_path(&config, &TerminalPaths)
                .context("Failed to resolve list path")?;
            println!("{}", path.display());
            Ok(())
        }
        command => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(async move {
                match command {
                    Command::Show => run_show(config),
                    Command::Save { payload } => run_save(config, payload),
                    _ => run_session(config).await,
                }
            })
        }
    }
}

/// Opens the store with a sink nobody reads, for one-shot commands.
fn open_quiet(config: StoreConfig) -> Result<TodoStore> {
    let (tx, _rx) = mpsc::unbounded_channel::<Notification>();
    TodoStore::open(config, TerminalPaths, tx).context("Failed to open todo store")
}

fn run_show(config: StoreConfig) -> Result<()> {
    let store = open_quiet(config)?;
    let payload = store.load()?;
    io::stdout().write_all(&payload)?;
    println!();
    Ok(())
}

fn run_save(config: StoreConfig, payload: Option<String>) -> Result<()> {
    let payload = match payload {
        Some(p) => p,
        None => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read payload from stdin")?;
            input
        }
    };

    let store = open_quiet(config)?;
    store.save(payload.as_bytes())?;
    println!("Saved to {}", store.active_path().display());
    Ok(())
}

/// Runs an interactive session until `quit`, end of input, or a signal.
async fn run_session(config: StoreConfig) -> Result<()> {
    info!("Starting Todo Store session");

    let (tx, mut rx) = mpsc::channel::<Notification>(config.notify_buffer);
    let store = TodoStore::open(config, TerminalPaths, tx).context("Failed to open todo store")?;
    let store = Arc::new(store);

    info!(
        root_dir = %store.root_dir().display(),
        path = %store.active_path().display(),
        "Store opened"
    );

    // stdin is read on a plain thread: prompts issued by import/export read
    // the same stream, and a blocked read must not hold up runtime shutdown
    let (done_tx, mut done_rx) = oneshot::channel::<()>();
    let repl_store = Arc::clone(&store);
    std::thread::spawn(move || {
        run_repl(&repl_store);
        let _ = done_tx.send(());
    });

    loop {
        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("Shutdown signal received");
                break;
            }

            _ = &mut done_rx => {
                break;
            }

            Some(notification) = rx.recv() => {
                print_notification(&notification);
            }
        }
    }

    if let Err(e) = store.close() {
        error!(error = %e, "Failed to stop watcher cleanly");
    }

    info!("Session ended");
    Ok(())
}

fn print_notification(notification: &Notification) {
    match serde_json::to_string(notification) {
        Ok(line) => println!("{line}"),
        Err(e) => error!(error = %e, "Failed to serialize notification"),
    }
}

/// Reads and executes session commands until `quit` or end of input.
fn run_repl(store: &TodoStore) {
    loop {
        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Failed to read command");
                return;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (command, argument) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(c, a)| (c, a.trim()));

        if matches!(command, "quit" | "exit") {
            return;
        }
        if let Err(e) = run_command(store, command, argument) {
            eprintln!("Error: {e:#}");
        }
    }
}

fn run_command(store: &TodoStore, command: &str, argument: &str) -> Result<()> {
    match command {
        "show" => println!("{}", store.load_string()?),
        "save" => store.save(argument.as_bytes())?,
        "export" => match store.export(argument.as_bytes())? {
            Some(path) => eprintln!("Exported to {}", path.display()),
            None => eprintln!("Export cancelled"),
        },
        "import" => match store.import()? {
            Some(path) => eprintln!("Imported {}", path.display()),
            None => eprintln!("Import cancelled"),
        },
        "path" => {
            eprintln!("active:  {}", store.active_path().display());
            match store.watched_path() {
                Some(path) => eprintln!("watched: {}", path.display()),
                None => eprintln!("watched: (none)"),
            }
        }
        other => bail!("unknown command '{other}' (see --help)"),
    }
    Ok(())
}

/// Initializes the tracing subscriber.
///
/// Logs go to stderr so stdout stays machine-readable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_save_with_payload() {
        let cli = Cli::try_parse_from(["todo-store", "save", "[1,2]"]).unwrap();
        assert!(matches!(cli.command, Command::Save { payload: Some(ref p) } if p == "[1,2]"));
    }

    #[test]
    fn cli_parses_session() {
        let cli = Cli::try_parse_from(["todo-store", "session"]).unwrap();
        assert!(matches!(cli.command, Command::Session));
    }

    #[test]
    fn cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["todo-store"]).is_err());
    }
}
