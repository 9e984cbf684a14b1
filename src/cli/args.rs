//! Command-line argument parsing

use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "canoni")]
#[command(about = "Rebuild a local container image with host and time dependent metadata stripped")]
#[command(version)]
pub struct Args {
    /// Local image to canonicalize
    #[arg(value_name = "REPOSITORY:TAG")]
    pub reference: String,

    /// Verbose output
    #[arg(long = "verbose", short = 'v', help = "Enable verbose output")]
    pub verbose: bool,

    /// Only print errors
    #[arg(
        long = "quiet",
        short = 'q',
        conflicts_with = "verbose",
        help = "Suppress everything but errors"
    )]
    pub quiet: bool,

    /// Container engine CLI
    #[arg(
        long = "runtime",
        value_name = "PROGRAM",
        help = "Container engine command used for save/load (default: docker)"
    )]
    pub runtime: Option<String>,

    /// Parent of the temporary working directory
    #[arg(
        long = "work-dir",
        value_name = "DIR",
        help = "Directory in which intermediate archives are written"
    )]
    pub work_dir: Option<PathBuf>,

    /// Prune dangling images afterwards
    #[arg(long = "prune", help = "Run `image prune -f` after loading the result")]
    pub prune: bool,
}

impl Args {
    /// Write usage examples to `out`
    pub fn write_examples<W: Write>(out: &mut W) -> io::Result<()> {
        writeln!(out, "Examples:")?;
        writeln!(out, "  # Canonicalize a local image, producing myapp-canoni:v1")?;
        writeln!(out, "  canoni myapp:v1")?;
        writeln!(out)?;
        writeln!(out, "  # Use podman and keep intermediate archives on a larger disk")?;
        writeln!(out, "  canoni --runtime podman --work-dir /var/tmp myapp:v1")?;
        writeln!(out)?;
        writeln!(out, "  # Using environment variables")?;
        writeln!(out, "  export CANONI_RUNTIME=podman")?;
        writeln!(out, "  export CANONI_PRUNE=1")?;
        writeln!(out, "  canoni myapp:v1")
    }
}
