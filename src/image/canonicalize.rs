//! Canonicalization of image metadata
//!
//! Produces a new [`Image`] whose config has every host- and time-dependent
//! field cleared. Layers are shared with the source image, and all run-time
//! settings (environment, entrypoint, command, ports, labels, working
//! directory, user) pass through untouched.

use crate::error::CanonicalizeError;
use crate::image::config::{ConfigFile, ContainerConfig};
use crate::image::digest::Digest;
use crate::image::model::Image;
use chrono::{DateTime, Utc};

/// Timestamp every canonical image carries
pub const CANONICAL_CREATED: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// Return a copy of `image` with build provenance stripped.
///
/// Always rewrites, even for an image that is already canonical; the result of
/// a second pass is byte-identical to the first.
pub fn canonicalize(image: &Image) -> Result<Image, CanonicalizeError> {
    let mut config = image
        .config_file()
        .map_err(|e| CanonicalizeError::ConfigUnavailable(e.to_string()))?;

    strip_config(&mut config);

    Image::from_config(&config, image.layers().to_vec())
        .map_err(|e| CanonicalizeError::ConfigUnavailable(e.to_string()))
}

/// Clear the host-dependent fields of an owned config value
pub fn strip_config(config: &mut ConfigFile) {
    config.created = Some(CANONICAL_CREATED);
    for entry in config.history.iter_mut().flatten() {
        if entry.created.is_some() {
            entry.created = Some(CANONICAL_CREATED);
        }
    }

    config.container.clear();
    config.docker_version.clear();

    if let Some(run) = config.config.as_mut() {
        strip_container_config(run);
    }
    if let Some(build) = config.container_config.as_mut() {
        strip_container_config(build);
    }
}

fn strip_container_config(config: &mut ContainerConfig) {
    config.hostname.clear();
    config.image.clear();
}

/// What changed between a source image and its canonical form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalSummary {
    pub source_config: Digest,
    pub canonical_config: Digest,
    pub layers: usize,
    pub cleared: Vec<&'static str>,
}

impl CanonicalSummary {
    /// Compare the two configs and list the fields that actually changed
    pub fn describe(source: &Image, canonical: &Image) -> Self {
        let mut cleared = Vec::new();
        if let Ok(before) = source.config_file() {
            let run = before.config.as_ref();
            let build = before.container_config.as_ref();
            if before.created != Some(CANONICAL_CREATED) {
                cleared.push("created");
            }
            if !before.container.is_empty() {
                cleared.push("container");
            }
            if !before.docker_version.is_empty() {
                cleared.push("docker_version");
            }
            if run.into_iter().chain(build).any(|c| !c.hostname.is_empty()) {
                cleared.push("Hostname");
            }
            if run.into_iter().chain(build).any(|c| !c.image.is_empty()) {
                cleared.push("Image");
            }
        }

        Self {
            source_config: source.config_blob().digest().clone(),
            canonical_config: canonical.config_blob().digest().clone(),
            layers: canonical.layers().len(),
            cleared,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.source_config == self.canonical_config
    }
}
