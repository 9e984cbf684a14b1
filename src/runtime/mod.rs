//! Container runtime integration
//!
//! The pipeline needs exactly two things from a container engine: export a
//! local image to an archive and load an archive back. [`ContainerRuntime`]
//! is that capability; [`CliRuntime`] implements it by running the engine's
//! command line (`docker`, `podman`, ...).

use crate::error::CollaboratorError;
use crate::image::Reference;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;

pub const DEFAULT_RUNTIME: &str = "docker";

/// Capability interface over a local container engine
pub trait ContainerRuntime {
    /// Save the local image `reference` to an archive at `dest`
    fn export_image(&self, reference: &Reference, dest: &Path) -> Result<(), CollaboratorError>;

    /// Load the archive at `archive` into the local image store
    fn import_image(&self, archive: &Path) -> Result<(), CollaboratorError>;

    /// Remove dangling images left behind by the import
    fn prune_images(&self) -> Result<(), CollaboratorError>;
}

/// Runs the engine's CLI as a child process
#[derive(Debug, Clone)]
pub struct CliRuntime {
    program: String,
}

impl CliRuntime {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run the program and capture stdout and stderr together
    fn run<I, S>(&self, args: I) -> Result<String, CollaboratorError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.program);
        command.args(args);
        let rendered = render_command(&command);

        let output = command.output().map_err(|source| CollaboratorError::Spawn {
            command: rendered.clone(),
            source,
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            Err(CollaboratorError::Failed {
                command: rendered,
                status: output.status.to_string(),
                output: combined,
            })
        }
    }
}

impl ContainerRuntime for CliRuntime {
    fn export_image(&self, reference: &Reference, dest: &Path) -> Result<(), CollaboratorError> {
        self.run([
            OsStr::new("save"),
            OsStr::new(&reference.to_string()),
            OsStr::new("-o"),
            dest.as_os_str(),
        ])
        .map(drop)
    }

    fn import_image(&self, archive: &Path) -> Result<(), CollaboratorError> {
        self.run([OsStr::new("load"), OsStr::new("-i"), archive.as_os_str()])
            .map(drop)
    }

    fn prune_images(&self) -> Result<(), CollaboratorError> {
        self.run(["image", "prune", "-f"]).map(drop)
    }
}

fn render_command(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
