//! Run settings resolved from arguments and environment

use crate::cli::args::Args;
use crate::error::{CanoniError, Result};
use crate::image::Reference;
use crate::runtime::DEFAULT_RUNTIME;
use std::path::PathBuf;

pub const ENV_RUNTIME: &str = "CANONI_RUNTIME";
pub const ENV_WORK_DIR: &str = "CANONI_WORK_DIR";
pub const ENV_PRUNE: &str = "CANONI_PRUNE";
pub const ENV_VERBOSE: &str = "CANONI_VERBOSE";

/// Everything a run needs; command-line values win over environment values
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub reference: Reference,
    pub runtime: String,
    pub work_dir: Option<PathBuf>,
    pub prune: bool,
    pub verbose: bool,
    pub quiet: bool,
}

impl Settings {
    /// Resolve settings, looking up unset options with `env`
    pub fn resolve<F>(args: &Args, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let reference = Reference::parse(&args.reference)?;

        let runtime = args
            .runtime
            .clone()
            .or_else(|| env(ENV_RUNTIME))
            .unwrap_or_else(|| DEFAULT_RUNTIME.to_string());

        let work_dir = args
            .work_dir
            .clone()
            .or_else(|| env(ENV_WORK_DIR).map(PathBuf::from));

        let settings = Self {
            reference,
            runtime,
            work_dir,
            prune: args.prune || env(ENV_PRUNE).is_some_and(|v| is_truthy(&v)),
            verbose: !args.quiet && (args.verbose || env(ENV_VERBOSE).is_some_and(|v| is_truthy(&v))),
            quiet: args.quiet,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.runtime.trim().is_empty() {
            return Err(CanoniError::Config(
                "Container runtime command cannot be empty".to_string(),
            ));
        }

        if let Some(dir) = &self.work_dir {
            if !dir.is_dir() {
                return Err(CanoniError::Config(format!(
                    "Working directory root does not exist or is not a directory: {}",
                    dir.display()
                )));
            }
        }

        Ok(())
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
