//! canoni library
//!
//! This file serves as the library root for the canoni crate, organizing and
//! exposing the modules that rebuild a container image with host- and
//! time-dependent metadata removed.

pub mod cli;
pub mod error;
pub mod image;
pub mod logging;
pub mod pipeline;
pub mod runtime;

pub use error::{CanoniError, Result};
pub use image::{Image, Reference, canonicalize};
pub use logging::Logger;
pub use pipeline::{Pipeline, Report};
pub use runtime::{CliRuntime, ContainerRuntime};
