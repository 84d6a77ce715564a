use clap::Parser;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use std::{
    error::Error,
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};
use tracing::info;

mod app;

use app::config::{Backend, Config};

#[derive(Parser)]
#[command(name = "taskflow")]
#[command(about = "Taskflow - terminal task manager with local or remote storage")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.config/taskflow/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Store to use, overrides config and TASKFLOW_BACKEND
    #[arg(short, long, value_enum)]
    backend: Option<Backend>,

    /// SQLite file for the local backend
    #[arg(long)]
    db: Option<PathBuf>,

    /// Where to write the log
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> Result<Config, Box<dyn Error>> {
    let path = cli.config.clone().unwrap_or_else(Config::config_path);
    let mut config = Config::load_from(&path)?.with_env()?;

    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(db) = &cli.db {
        config.local.path = Some(db.clone());
    }
    if let Some(log_file) = &cli.log_file {
        config.log_file = Some(log_file.clone());
    }
    config.validate()?;
    Ok(config)
}

// The terminal belongs to the UI, so the log goes to a file
fn init_logging(path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

// Start the app.
// This and the rest of code heavily based on:
// https://github.com/ratatui-org/ratatui/blob/main/examples/list.rs
pub fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.log_path())?;
    info!(backend = ?config.backend, "Starting taskflow");

    // Open the store before taking over the terminal so errors print normally
    let store = app::open_store(&config)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Create an app with 250 ms tick
    let tick_rate = Duration::from_millis(250);
    let app = app::ui::App::new(store);
    let res = app::ui::run_app(&mut terminal, app, tick_rate);

    // Restore previous terminal state after exit
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!(error = %err, "Terminal error");
        println!("{err:?}");
    }

    info!("Exiting taskflow");
    Ok(())
}
