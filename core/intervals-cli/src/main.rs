//! intervals: terminal host for the Intervals focus timer.
//!
//! ## Subcommands
//!
//! - `run`: interactive session shell (recovery prompt, then a 1 Hz event loop)
//! - `history`: completed sessions with their check-in notes
//! - `stats`: focus totals, this week by project, day streak
//! - `projects`: list, add, rename or delete projects
//! - `settings`: show or change interval length and toggles

mod error;
mod logging;
mod report;
mod scheduler;
mod shell;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use intervals_core::{
    history, FlushMode, FocusStats, JsonFileBackend, LifecycleEngine, NewProject, NoopScheduler,
    NotificationScheduler, ProjectPatch, SettingsPatch, StorageConfig, Store, SystemClock,
};

use crate::error::CliError;
use crate::scheduler::TerminalScheduler;

#[derive(Parser)]
#[command(name = "intervals")]
#[command(about = "Focus timer with interval check-ins")]
#[command(version)]
struct Cli {
    /// Data directory (defaults to ~/.intervals)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive session shell
    Run,

    /// Show completed sessions, newest first
    History {
        /// Maximum number of sessions to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show focus statistics
    Stats,

    /// Manage projects
    Projects {
        #[command(subcommand)]
        action: Option<ProjectsCommand>,
    },

    /// Show or change settings
    Settings {
        /// Interval length in minutes
        #[arg(long, value_name = "MINUTES")]
        interval: Option<u32>,

        #[arg(long)]
        sound: Option<Toggle>,

        #[arg(long)]
        haptics: Option<Toggle>,

        #[arg(long)]
        notifications: Option<Toggle>,

        /// Chime played when an interval completes
        #[arg(long, value_name = "NAME")]
        chime: Option<String>,
    },
}

#[derive(Subcommand)]
enum ProjectsCommand {
    /// Add a project
    Add {
        name: String,

        #[arg(long, default_value = "folder-outline")]
        icon: String,

        #[arg(long)]
        color: Option<String>,
    },

    /// Rename a project
    Rename { id: String, name: String },

    /// Delete a project (default projects are protected)
    Delete { id: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl From<Toggle> for bool {
    fn from(toggle: Toggle) -> Self {
        matches!(toggle, Toggle::On)
    }
}

fn storage_config(data_dir: Option<PathBuf>) -> Result<StorageConfig, CliError> {
    let storage = match data_dir {
        Some(dir) => StorageConfig::with_root(dir),
        None => StorageConfig::from_home()?,
    };
    storage.ensure_root()?;
    Ok(storage)
}

fn open_engine(
    storage: &StorageConfig,
    mode: FlushMode,
    scheduler: Arc<dyn NotificationScheduler>,
) -> Result<LifecycleEngine, CliError> {
    let backend = Arc::new(JsonFileBackend::new(storage.store_file()));
    let mut engine = LifecycleEngine::new(
        Store::open(backend, mode),
        Arc::new(SystemClock),
        scheduler,
    );
    engine.hydrate()?;
    Ok(engine)
}

fn run(cli: Cli) -> Result<(), CliError> {
    let storage = storage_config(cli.data_dir)?;
    let _logging_guard = logging::init(&storage.logs_dir());

    match cli.command {
        Commands::Run => {
            let engine = open_engine(
                &storage,
                FlushMode::Background,
                Arc::new(TerminalScheduler::new()),
            )?;
            shell::run(engine)
        }
        Commands::History { limit } => {
            let engine = open_engine(&storage, FlushMode::Inline, Arc::new(NoopScheduler))?;
            print!("{}", report::history(&history(engine.store()), limit));
            Ok(())
        }
        Commands::Stats => {
            let engine = open_engine(&storage, FlushMode::Inline, Arc::new(NoopScheduler))?;
            let now = engine.now().with_timezone(&Local);
            print!("{}", report::stats(&FocusStats::compute(engine.store(), now)));
            Ok(())
        }
        Commands::Projects { action } => {
            let mut engine = open_engine(&storage, FlushMode::Inline, Arc::new(NoopScheduler))?;
            let store = engine.store_mut();
            match action {
                None => {}
                Some(ProjectsCommand::Add { name, icon, color }) => {
                    let mut data = NewProject::named(name, icon);
                    if let Some(color) = color {
                        data.color = color;
                    }
                    let project = store.create_project(data)?;
                    println!("Added {} ({})", project.name, project.id);
                }
                Some(ProjectsCommand::Rename { id, name }) => {
                    let patch = ProjectPatch {
                        name: Some(name),
                        ..Default::default()
                    };
                    let project = store.update_project(&id, patch)?;
                    println!("Renamed {} to {}", project.id, project.name);
                }
                Some(ProjectsCommand::Delete { id }) => {
                    store.delete_project(&id)?;
                    println!("Deleted {}", id);
                }
            }
            print!("{}", report::projects(&store.projects()));
            Ok(())
        }
        Commands::Settings {
            interval,
            sound,
            haptics,
            notifications,
            chime,
        } => {
            let mut engine = open_engine(&storage, FlushMode::Inline, Arc::new(NoopScheduler))?;
            let patch = SettingsPatch {
                interval_minutes: interval,
                sound_enabled: sound.map(bool::from),
                haptic_enabled: haptics.map(bool::from),
                notifications_enabled: notifications.map(bool::from),
                selected_sound: chime,
                onboarding_completed: None,
            };
            let settings = if patch == SettingsPatch::default() {
                engine.store().settings().clone()
            } else {
                engine.update_settings(&patch)?
            };
            print!("{}", report::settings(&settings));
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "intervals failed");
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
