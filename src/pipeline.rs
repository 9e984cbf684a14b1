//! Export, canonicalize and re-import a local image
//!
//! [`Pipeline::run`] drives the whole sequence against a [`ContainerRuntime`]:
//! export the source image, decode it, canonicalize, encode under the
//! canonical reference, and import the result. Intermediate archives live in a
//! private working directory that is removed when the run ends, whether it
//! succeeded or not. A directory that cannot be removed is reported as a
//! warning and does not change the outcome.

use crate::error::{CanoniError, Result};
use crate::image::{CanonicalSummary, Reference, archive, canonicalize};
use crate::logging::Logger;
use crate::runtime::ContainerRuntime;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;

const WORKDIR_PREFIX: &str = "canoni-";
const SOURCE_ARCHIVE: &str = "source.tar";
const CANONICAL_ARCHIVE: &str = "canonical.tar";

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct Report {
    pub source: Reference,
    pub target: Reference,
    pub summary: CanonicalSummary,
    pub archive_size: u64,
}

pub struct Pipeline<R: ContainerRuntime> {
    runtime: R,
    logger: Logger,
    work_root: Option<PathBuf>,
    prune: bool,
}

impl<R: ContainerRuntime> Pipeline<R> {
    pub fn new(runtime: R, logger: Logger) -> Self {
        Self {
            runtime,
            logger,
            work_root: None,
            prune: false,
        }
    }

    /// Directory under which the working directory is created; the system
    /// temporary directory when unset
    pub fn with_work_root(mut self, work_root: Option<PathBuf>) -> Self {
        self.work_root = work_root;
        self
    }

    /// Prune dangling images after importing the result
    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn run(&self, source: &Reference) -> Result<Report> {
        let workdir = self.create_workdir()?;
        let workdir_path = workdir.path().to_path_buf();
        self.logger
            .detail(&format!("Working directory: {}", workdir_path.display()));

        let result = self.run_in(&workdir_path, source);

        if let Err(e) = workdir.close() {
            self.logger.warning(&format!(
                "Failed to remove working directory {}: {}",
                workdir_path.display(),
                e
            ));
        }
        result
    }

    fn run_in(&self, workdir: &Path, source: &Reference) -> Result<Report> {
        let source_archive = workdir.join(SOURCE_ARCHIVE);
        let target_archive = workdir.join(CANONICAL_ARCHIVE);
        let target = source.canonical();

        self.logger.step(&format!("Exporting {}", source));
        self.runtime.export_image(source, &source_archive)?;

        let started = Instant::now();
        let image = archive::decode(&source_archive, Some(source))?;
        self.logger.step(&format!(
            "Decoded {} layers ({}) in {}",
            image.layers().len(),
            self.logger.format_size(image.total_size()),
            self.logger.format_duration(started.elapsed())
        ));
        for (i, layer) in image.layers().iter().enumerate() {
            self.logger.detail(&format!(
                "Layer {}/{}: {} ({})",
                i + 1,
                image.layers().len(),
                layer.digest().short(),
                self.logger.format_size(layer.blob().size())
            ));
        }

        let canonical = canonicalize(&image)?;
        let summary = CanonicalSummary::describe(&image, &canonical);
        self.logger.debug(&format!(
            "Config {} -> {}",
            summary.source_config, summary.canonical_config
        ));
        if summary.is_unchanged() {
            self.logger.info("Image metadata is already canonical");
        } else {
            self.logger
                .step(&format!("Cleared {}", summary.cleared.join(", ")));
        }

        archive::encode(&canonical, &target, &target_archive)?;
        let archive_size = std::fs::metadata(&target_archive)
            .map_err(CanoniError::WorkDir)?
            .len();
        self.logger.step(&format!(
            "Wrote {} ({})",
            target,
            self.logger.format_size(archive_size)
        ));

        self.logger.step(&format!("Importing {}", target));
        self.runtime.import_image(&target_archive)?;

        if self.prune {
            self.logger.step("Pruning dangling images");
            self.runtime.prune_images()?;
        }

        Ok(Report {
            source: source.clone(),
            target,
            summary,
            archive_size,
        })
    }

    fn create_workdir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKDIR_PREFIX);
        match &self.work_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(CanoniError::WorkDir)
    }
}
