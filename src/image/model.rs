//! In-memory image model
//!
//! An [`Image`] is a config blob plus an ordered list of layers. Blob bytes are
//! reference counted, so cloning an image or handing its layers to a new image
//! never copies layer content. The [`Manifest`] is always derived from the blobs.

use crate::image::config::ConfigFile;
use crate::image::digest::Digest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const MEDIA_TYPE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const MEDIA_TYPE_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
pub const MEDIA_TYPE_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";
pub const MEDIA_TYPE_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Immutable bytes together with the digest computed from them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    data: Arc<[u8]>,
    digest: Digest,
}

impl Blob {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        let digest = Digest::of(&data);
        Self { data, digest }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// True when both blobs share the same allocation
    pub fn shares_bytes_with(&self, other: &Blob) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

/// Compression of a layer blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

/// A filesystem diff, stored exactly as it appeared in the source archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    blob: Blob,
    compression: Compression,
}

impl Layer {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        let blob = Blob::new(data);
        let compression = if blob.data().starts_with(&GZIP_MAGIC) {
            Compression::Gzip
        } else {
            Compression::None
        };
        Self { blob, compression }
    }

    pub fn blob(&self) -> &Blob {
        &self.blob
    }

    pub fn digest(&self) -> &Digest {
        self.blob.digest()
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn media_type(&self) -> &'static str {
        match self.compression {
            Compression::None => MEDIA_TYPE_LAYER,
            Compression::Gzip => MEDIA_TYPE_LAYER_GZIP,
        }
    }

    pub fn descriptor(&self) -> Descriptor {
        Descriptor::new(self.media_type(), &self.blob)
    }
}

/// A container image: one config blob and its ordered layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    config: Blob,
    layers: Vec<Layer>,
}

impl Image {
    pub fn new(config: Blob, layers: Vec<Layer>) -> Self {
        Self { config, layers }
    }

    /// Serialize `config` into a fresh config blob
    pub fn from_config(config: &ConfigFile, layers: Vec<Layer>) -> serde_json::Result<Self> {
        Ok(Self::new(Blob::new(config.to_vec()?), layers))
    }

    pub fn config_blob(&self) -> &Blob {
        &self.config
    }

    /// Parse the config blob into a new, independently owned value
    pub fn config_file(&self) -> serde_json::Result<ConfigFile> {
        ConfigFile::from_slice(self.config.data())
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_digests(&self) -> Vec<&Digest> {
        self.layers.iter().map(Layer::digest).collect()
    }

    /// Combined size of the config and all layers
    pub fn total_size(&self) -> u64 {
        self.config.size() + self.layers.iter().map(|l| l.blob.size()).sum::<u64>()
    }

    /// The manifest describing this image's blobs
    pub fn manifest(&self) -> Manifest {
        Manifest {
            schema_version: 2,
            media_type: MEDIA_TYPE_MANIFEST.to_string(),
            config: Descriptor::new(MEDIA_TYPE_CONFIG, &self.config),
            layers: self.layers.iter().map(Layer::descriptor).collect(),
        }
    }
}

/// Reference to a blob by media type, size and digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Descriptor {
    pub fn new(media_type: &str, blob: &Blob) -> Self {
        Self {
            media_type: media_type.to_string(),
            digest: blob.digest().to_string(),
            size: blob.size(),
            annotations: BTreeMap::new(),
        }
    }
}

/// OCI image manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    pub media_type: String,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

impl Manifest {
    pub fn to_blob(&self) -> serde_json::Result<Blob> {
        Ok(Blob::new(serde_json::to_vec(self)?))
    }
}
