//! Container image handling module
//!
//! This module provides the image model and the two transforms applied to it:
//! the archive codec that reads and writes `docker save` tarballs, and the
//! canonicalizer that strips host- and time-dependent metadata.
//!
//! # Overview
//!
//! An [`Image`] is a config blob plus an ordered list of [`Layer`]s. Blobs are
//! content addressed: every [`Digest`] is computed from the bytes it names, and
//! the [`Manifest`] is derived from the blobs on demand.
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//! use canoni::image::{Reference, archive, canonicalize};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let reference = Reference::parse("myapp:v1")?;
//! let image = archive::decode(Path::new("myapp.tar"), Some(&reference))?;
//! let canonical = canonicalize(&image)?;
//! archive::encode(&canonical, &reference.canonical(), Path::new("myapp-canoni.tar"))?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod canonicalize;
pub mod config;
pub mod digest;
pub mod model;
pub mod reference;

pub use canonicalize::{CanonicalSummary, canonicalize};
pub use config::{ConfigFile, ContainerConfig};
pub use digest::Digest;
pub use model::{Blob, Image, Layer, Manifest};
pub use reference::Reference;
