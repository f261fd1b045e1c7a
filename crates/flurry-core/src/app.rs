//! Process entry point shared by flurry binaries.
//!
//! Reduces `main.rs` to `Application::<Config>::run()`.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use crate::config::{CliArgs, ConfigPath, Mergeable};
use crate::error::ConfigError;
use crate::topology::{Pipeline, PipelineContext, run_pipelines};
use crate::tracing::init_tracing;

/// A configuration that can be loaded from files and turned into pipelines.
pub trait AppConfig: Mergeable + Sized {
    type Pipeline: Pipeline;

    /// Human-readable component name used in logs ("poller").
    const COMPONENT_NAME: &'static str;

    /// Load and validate config from the given sources.
    fn from_paths(paths: &[ConfigPath]) -> Result<Self, ConfigError>;

    fn create_pipelines(&self, context: PipelineContext) -> Vec<Self::Pipeline>;

    fn log_startup_info(&self);
}

/// Application runner that owns a loaded configuration.
pub struct Application<C: AppConfig> {
    config: C,
}

impl<C: AppConfig> Application<C> {
    /// Parse arguments, load config and run every pipeline until shutdown.
    pub fn run() -> ExitCode {
        init_tracing();

        let args = CliArgs::parse();
        let paths = args.config_paths();

        if paths.is_empty() {
            eprintln!("Error: no config files or directories specified");
            return ExitCode::FAILURE;
        }

        info!("Loading config from {} source(s)", paths.len());

        let app = match Self::from_paths(&paths) {
            Ok(app) => app,
            Err(e) => {
                eprintln!("Failed to load config: {e}");
                return ExitCode::FAILURE;
            }
        };

        if args.validate {
            app.config.log_startup_info();
            println!("Configuration OK");
            return ExitCode::SUCCESS;
        }

        app.execute()
    }

    /// Load config from paths (useful for testing).
    pub fn from_paths(paths: &[ConfigPath]) -> Result<Self, ConfigError> {
        Ok(Self {
            config: C::from_paths(paths)?,
        })
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    fn execute(self) -> ExitCode {
        self.config.log_startup_info();

        let runtime = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                eprintln!("Failed to start tokio runtime: {e}");
                return ExitCode::FAILURE;
            }
        };

        let result = runtime.block_on(run_pipelines(
            &self.config.metrics().address,
            self.config.global(),
            C::COMPONENT_NAME,
            |context| self.config.create_pipelines(context),
        ));

        match result {
            Ok(0) => ExitCode::SUCCESS,
            Ok(failed) => {
                error!("{failed} {}(s) failed", C::COMPONENT_NAME);
                ExitCode::FAILURE
            }
            Err(e) => {
                eprintln!("{} setup failed: {e}", C::COMPONENT_NAME);
                ExitCode::FAILURE
            }
        }
    }
}
