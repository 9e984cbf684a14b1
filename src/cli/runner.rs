//! Runner wiring settings, logger and container runtime into a pipeline run

use crate::cli::args::Args;
use crate::cli::config::Settings;
use crate::error::{CanoniError, ParseError, Result};
use crate::logging::Logger;
use crate::pipeline::{Pipeline, Report};
use crate::runtime::ContainerRuntime;
use std::io::{self, Write};

pub const USAGE: &str = "Usage: canoni REPOSITORY:TAG";
pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

/// Resolve settings, run the pipeline and map the outcome to an exit code.
///
/// A malformed reference writes the error, usage line and examples to `usage`
/// and never builds a runtime. Every other failure is reported by the logger.
pub fn execute<R, E, F, W>(args: &Args, env: E, make_runtime: F, usage: &mut W) -> u8
where
    R: ContainerRuntime,
    E: Fn(&str) -> Option<String>,
    F: FnOnce(&Settings) -> R,
    W: Write,
{
    let settings = match Settings::resolve(args, env) {
        Ok(settings) => settings,
        Err(CanoniError::Parse(e)) => {
            // Nothing useful to do if the usage text itself cannot be written
            let _ = write_usage(usage, &e);
            return EXIT_FAILURE;
        }
        Err(e) => {
            Logger::new(false).error(&e.to_string());
            return EXIT_FAILURE;
        }
    };

    let runtime = make_runtime(&settings);
    match Runner::with_runtime(settings, runtime).run() {
        Ok(_) => EXIT_SUCCESS,
        Err(_) => EXIT_FAILURE,
    }
}

fn write_usage<W: Write>(out: &mut W, error: &ParseError) -> io::Result<()> {
    writeln!(out, "{}", error)?;
    writeln!(out, "{}", USAGE)?;
    writeln!(out)?;
    Args::write_examples(out)
}

pub struct Runner<R: ContainerRuntime> {
    settings: Settings,
    runtime: R,
    logger: Logger,
}

impl<R: ContainerRuntime> Runner<R> {
    pub fn with_runtime(settings: Settings, runtime: R) -> Self {
        // Create logger based on settings
        let logger = if settings.quiet {
            Logger::new_quiet()
        } else {
            Logger::new(settings.verbose)
        };

        Self {
            settings,
            runtime,
            logger,
        }
    }

    pub fn run(self) -> Result<Report> {
        self.logger.section("Image Canonicalization");
        self.logger
            .info(&format!("Source image: {}", self.settings.reference));
        self.logger.info(&format!(
            "Target image: {}",
            self.settings.reference.canonical()
        ));

        let logger = self.logger.clone();
        let pipeline = Pipeline::new(self.runtime, self.logger)
            .with_work_root(self.settings.work_dir.clone())
            .with_prune(self.settings.prune);

        let report = match pipeline.run(&self.settings.reference) {
            Ok(report) => report,
            Err(e) => {
                logger.error(&format!(
                    "Canonicalization failed after {}: {}",
                    logger.format_duration(logger.elapsed()),
                    e
                ));
                return Err(e);
            }
        };

        logger.summary_kv(
            "Canonicalization Summary",
            &[
                ("Source", report.source.to_string()),
                ("Target", report.target.to_string()),
                ("Source config", report.summary.source_config.to_string()),
                ("Canonical config", report.summary.canonical_config.to_string()),
                ("Layers", report.summary.layers.to_string()),
                ("Archive size", logger.format_size(report.archive_size)),
            ],
        );
        logger.success(&format!(
            "Loaded {} in {}",
            report.target,
            logger.format_duration(logger.elapsed())
        ));

        Ok(report)
    }
}
