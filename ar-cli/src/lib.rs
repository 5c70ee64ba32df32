//! # AR Launch CLI
//!
//! Developer tooling for the QR-to-AR launch flow in `ar-core`.
//!
//! ## Usage
//!
//! ```bash
//! ar-launch resolve "https://example.com/?code=2" --user-agent "...iPhone..."
//! ar-launch platform "Mozilla/5.0 (Linux; Android 13; Pixel 7) ..."
//! ar-launch catalog
//! ar-launch --data-dir ./state session show
//! ar-launch --data-dir ./state simulate --frames "-,-,MODEL_CHURCH_02"
//! ```
//!
//! ## Architecture
//!
//! - `CliArgs` - Command-line arguments parsed with clap
//! - `CliConfig` - Experience configuration and data directory resolved from args
//! - [`commands`] - One-shot inspection commands
//! - [`simulate`] - Scripted scan driven through the real pipeline and session

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]

pub mod commands;
pub mod logging;
pub mod simulate;

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context;
use ar_core::{
    DirStorage, ExperienceConfig, ExperienceFlags, KeyValueStorage, MemoryStorage, ModelCatalog,
    SessionStore,
};
use clap::{Parser, Subcommand};

pub use simulate::{SimulateArgs, SimulationReport};

/// Command-line arguments for ar-launch.
#[derive(Debug, Clone, Parser)]
#[command(name = "ar-launch")]
#[command(about = "Inspect and simulate the QR-to-AR launch flow")]
#[command(version)]
pub struct CliArgs {
    /// Experience configuration file (JSON)
    #[arg(long, env = "AR_LAUNCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding persisted session state
    #[arg(long, env = "AR_LAUNCH_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Resolve a QR payload to a catalog model
    Resolve {
        /// Decoded QR text; omit to see the default model
        payload: Option<String>,
        /// User agent selecting the platform asset
        #[arg(long, default_value = "")]
        user_agent: String,
    },
    /// Show platform facts derived from a user agent
    Platform {
        /// User-agent string
        user_agent: String,
    },
    /// List the model catalog
    Catalog,
    /// Inspect or clear the persisted scan session
    Session {
        /// Session action
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Drive a scripted scan through the pipeline and viewer session
    Simulate(SimulateArgs),
}

/// Persisted session actions.
#[derive(Debug, Clone, Subcommand)]
pub enum SessionAction {
    /// Print the saved QR record and experience flags
    Show {
        /// Decode the stored photo and report its type and size
        #[arg(long)]
        decode_photo: bool,
    },
    /// Remove the saved QR record
    Clear {
        /// Also reset the onboarding and AR-guide flags
        #[arg(long)]
        flags: bool,
    },
}

/// Resolved CLI configuration.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Experience configuration.
    pub experience: ExperienceConfig,
    /// Persisted state directory.
    pub data_dir: Option<PathBuf>,
}

impl CliConfig {
    /// Load the configuration named by `args`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or is invalid.
    pub fn from_args(args: &CliArgs) -> anyhow::Result<Self> {
        let experience = match &args.config {
            Some(path) => ExperienceConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ExperienceConfig::default(),
        };
        Ok(Self {
            experience,
            data_dir: args.data_dir.clone(),
        })
    }

    /// The configured catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured catalog is inconsistent.
    pub fn catalog(&self) -> anyhow::Result<ModelCatalog> {
        Ok(self.experience.build_catalog()?)
    }

    /// Storage in the data directory, or in memory without one.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be created.
    pub fn storage(&self) -> anyhow::Result<Rc<dyn KeyValueStorage>> {
        Ok(match &self.data_dir {
            Some(dir) => Rc::new(
                DirStorage::open(dir)
                    .with_context(|| format!("opening data dir {}", dir.display()))?,
            ),
            None => {
                tracing::debug!("No data dir, session state is not persisted");
                Rc::new(MemoryStorage::new())
            }
        })
    }

    fn persistent_storage(&self) -> anyhow::Result<Rc<dyn KeyValueStorage>> {
        anyhow::ensure!(
            self.data_dir.is_some(),
            "session commands need --data-dir (or AR_LAUNCH_DATA_DIR)"
        );
        self.storage()
    }
}

/// Run a parsed command and return what should be printed.
///
/// # Errors
///
/// Returns an error if configuration, storage or the simulation fails.
pub fn run(args: CliArgs) -> anyhow::Result<String> {
    let config = CliConfig::from_args(&args)?;
    let output = match args.command {
        Command::Resolve {
            payload,
            user_agent,
        } => {
            let report = commands::resolve(config.catalog()?, payload.as_deref(), &user_agent);
            serde_json::to_string_pretty(&report)?
        }
        Command::Platform { user_agent } => {
            serde_json::to_string_pretty(&commands::platform(&user_agent))?
        }
        Command::Catalog => serde_json::to_string_pretty(&commands::catalog(&config.catalog()?))?,
        Command::Session { action } => {
            let storage = config.persistent_storage()?;
            let store = SessionStore::new(Rc::clone(&storage));
            let flags = ExperienceFlags::new(storage);
            match action {
                SessionAction::Show { decode_photo } => serde_json::to_string_pretty(
                    &commands::session_show(&store, &flags, decode_photo)?,
                )?,
                SessionAction::Clear { flags: reset } => {
                    commands::session_clear(&store, &flags, reset)?
                }
            }
        }
        Command::Simulate(sim) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("building runtime")?;
            let report = runtime.block_on(simulate::simulate(&config, &sim))?;
            serde_json::to_string_pretty(&report)?
        }
    };
    Ok(output)
}
