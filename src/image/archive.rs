//! Image archive codec
//!
//! Reads and writes the tarball exchange format produced by `docker save` and
//! consumed by `docker load`. Both the legacy layout (`<id>/layer.tar`,
//! `<hex>.json`) and the OCI layout used by recent engines (`blobs/sha256/<hex>`)
//! are decoded. Encoding always writes the OCI layout together with a
//! `manifest.json`, which every mainstream engine can load.

use crate::error::DecodeError;
use crate::error::EncodeError;
use crate::image::config::ConfigFile;
use crate::image::digest::{Digest, digest_from_path};
use crate::image::model::{
    Blob, Compression, Descriptor, Image, Layer, MEDIA_TYPE_INDEX, MEDIA_TYPE_MANIFEST,
};
use crate::image::reference::Reference;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tar::{Archive, Builder, EntryType, Header};
use tempfile::NamedTempFile;

pub const MANIFEST_JSON: &str = "manifest.json";
pub const INDEX_JSON: &str = "index.json";
pub const OCI_LAYOUT: &str = "oci-layout";

const OCI_LAYOUT_CONTENT: &[u8] = br#"{"imageLayoutVersion":"1.0.0"}"#;
const ANNOTATION_IMAGE_NAME: &str = "io.containerd.image.name";
const ANNOTATION_REF_NAME: &str = "org.opencontainers.image.ref.name";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const MAX_LINK_DEPTH: usize = 8;

/// One image in the archive's `manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArchiveEntry {
    pub config: String,
    #[serde(default)]
    pub repo_tags: Option<Vec<String>>,
    #[serde(default)]
    pub layers: Vec<String>,
}

impl ArchiveEntry {
    fn tags(&self) -> impl Iterator<Item = &str> {
        self.repo_tags.iter().flatten().map(String::as_str)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageIndex {
    schema_version: u32,
    media_type: String,
    manifests: Vec<Descriptor>,
}

/// Regular files of an archive, with symlinks and hardlinks resolved on lookup
#[derive(Debug, Default)]
struct ArchiveFiles {
    files: HashMap<String, Arc<[u8]>>,
    links: HashMap<String, String>,
}

impl ArchiveFiles {
    fn read<R: Read>(reader: R) -> Result<Self, DecodeError> {
        let mut archive = Archive::new(reader);
        let mut contents = ArchiveFiles::default();

        let entries = archive
            .entries()
            .map_err(|e| DecodeError::Malformed(format!("failed to read tar entries: {}", e)))?;

        for entry_result in entries {
            let mut entry = entry_result
                .map_err(|e| DecodeError::Malformed(format!("failed to read tar entry: {}", e)))?;

            let path = entry
                .path()
                .map_err(|e| DecodeError::Malformed(format!("failed to read entry path: {}", e)))?
                .to_string_lossy()
                .to_string();
            let path = normalize_path(Path::new(&path));

            match entry.header().entry_type() {
                EntryType::Regular | EntryType::Continuous => {
                    let declared = entry.size();
                    let mut data = Vec::new();
                    entry.read_to_end(&mut data).map_err(|e| {
                        DecodeError::Malformed(format!("failed to read {}: {}", path, e))
                    })?;
                    if data.len() as u64 != declared {
                        return Err(DecodeError::Malformed(format!(
                            "{} is truncated: header declares {} bytes, archive holds {}",
                            path,
                            declared,
                            data.len()
                        )));
                    }
                    contents.files.insert(path, data.into());
                }
                EntryType::Symlink | EntryType::Link => {
                    let is_symlink = entry.header().entry_type() == EntryType::Symlink;
                    let target = entry
                        .link_name()
                        .map_err(|e| {
                            DecodeError::Malformed(format!("failed to read link {}: {}", path, e))
                        })?
                        .ok_or_else(|| {
                            DecodeError::Malformed(format!("link {} has no target", path))
                        })?;
                    let target = if is_symlink {
                        let parent = Path::new(&path).parent().unwrap_or(Path::new(""));
                        normalize_path(&parent.join(target))
                    } else {
                        normalize_path(&target)
                    };
                    contents.links.insert(path, target);
                }
                _ => {}
            }
        }

        if contents.files.is_empty() {
            return Err(DecodeError::Malformed(
                "archive contains no files".to_string(),
            ));
        }
        Ok(contents)
    }

    fn get(&self, path: &str) -> Option<Arc<[u8]>> {
        let mut current = normalize_path(Path::new(path));
        for _ in 0..MAX_LINK_DEPTH {
            if let Some(data) = self.files.get(&current) {
                return Some(Arc::clone(data));
            }
            current = self.links.get(&current)?.clone();
        }
        None
    }

    fn require(&self, path: &str, what: &str) -> Result<Arc<[u8]>, DecodeError> {
        self.get(path)
            .ok_or_else(|| DecodeError::Malformed(format!("{} {} is missing from archive", what, path)))
    }
}

/// Collapse `.` and `..` components and drop any leading `./` or `/`
fn normalize_path(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    parts.join("/")
}

/// Read an image archive from `path`.
///
/// With a reference, the image tagged with it is selected; an archive holding
/// a single untagged image also matches. Without one, the archive must hold
/// exactly one image. Every blob is checked against the digest it is declared
/// under before the image is returned.
pub fn decode(path: &Path, reference: Option<&Reference>) -> Result<Image, DecodeError> {
    let io_error = |source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(io_error)?;
    let mut reader = BufReader::new(file);
    let gzipped = reader
        .fill_buf()
        .map(|head| head.starts_with(&GZIP_MAGIC))
        .map_err(io_error)?;

    let files = if gzipped {
        ArchiveFiles::read(GzDecoder::new(reader))?
    } else {
        ArchiveFiles::read(reader)?
    };

    decode_files(&files, reference)
}

fn decode_files(files: &ArchiveFiles, reference: Option<&Reference>) -> Result<Image, DecodeError> {
    let manifest_data = files.require(MANIFEST_JSON, "image manifest")?;
    let entries: Vec<ArchiveEntry> = serde_json::from_slice(&manifest_data)
        .map_err(|e| DecodeError::Malformed(format!("failed to parse {}: {}", MANIFEST_JSON, e)))?;

    let entry = select_entry(&entries, reference)?;

    let config = Blob::new(files.require(&entry.config, "config blob")?);
    if let Some(expected) = digest_from_path(&entry.config) {
        check_digest(&entry.config, &expected, config.digest())?;
    }

    let config_file = ConfigFile::from_slice(config.data())
        .map_err(|e| DecodeError::Malformed(format!("failed to parse image config: {}", e)))?;
    let diff_ids = config_file.diff_ids();
    if diff_ids.len() != entry.layers.len() {
        return Err(DecodeError::Malformed(format!(
            "config lists {} diff_ids but manifest lists {} layers",
            diff_ids.len(),
            entry.layers.len()
        )));
    }

    let sources = entry
        .layers
        .iter()
        .map(|path| Ok::<_, DecodeError>((path.as_str(), files.require(path, "layer blob")?)))
        .collect::<Result<Vec<_>, DecodeError>>()?;

    let layers = verify_layers(sources, diff_ids)?;
    Ok(Image::new(config, layers))
}

fn select_entry<'a>(
    entries: &'a [ArchiveEntry],
    reference: Option<&Reference>,
) -> Result<&'a ArchiveEntry, DecodeError> {
    let Some(reference) = reference else {
        return match entries {
            [only] => Ok(only),
            [] => Err(DecodeError::Malformed(format!("{} lists no images", MANIFEST_JSON))),
            _ => Err(DecodeError::NotFound(format!(
                "an unspecified reference among {} images",
                entries.len()
            ))),
        };
    };

    let wanted = [reference.to_string(), reference.qualified()];
    if let Some(entry) = entries
        .iter()
        .find(|entry| entry.tags().any(|tag| wanted.iter().any(|w| w == tag)))
    {
        return Ok(entry);
    }

    match entries {
        [only] if only.tags().next().is_none() => Ok(only),
        _ => Err(DecodeError::NotFound(reference.to_string())),
    }
}

/// Verify layers in parallel; the result keeps manifest order
fn verify_layers(
    sources: Vec<(&str, Arc<[u8]>)>,
    diff_ids: &[String],
) -> Result<Vec<Layer>, DecodeError> {
    let workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    let jobs: Vec<_> = sources.into_iter().zip(diff_ids).collect();
    let mut layers = Vec::with_capacity(jobs.len());

    for batch in jobs.chunks(workers) {
        let verified = thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|((path, data), diff_id)| {
                    scope.spawn(move || verify_layer(path, Arc::clone(data), diff_id))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(DecodeError::Malformed(
                            "layer verification thread panicked".to_string(),
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        })?;
        layers.extend(verified);
    }

    Ok(layers)
}

fn verify_layer(path: &str, data: Arc<[u8]>, diff_id: &str) -> Result<Layer, DecodeError> {
    let layer = Layer::new(data);

    if let Some(expected) = digest_from_path(path) {
        check_digest(path, &expected, layer.digest())?;
    }

    let expected = Digest::parse(diff_id)
        .ok_or_else(|| DecodeError::Malformed(format!("invalid diff_id {:?}", diff_id)))?;
    let actual = match layer.compression() {
        Compression::None => layer.digest().clone(),
        Compression::Gzip => Digest::of_reader(GzDecoder::new(layer.blob().data()))
            .map_err(|e| DecodeError::Malformed(format!("layer {} is not valid gzip: {}", path, e)))?,
    };
    check_digest(path, &expected, &actual)?;

    Ok(layer)
}

fn check_digest(path: &str, expected: &Digest, actual: &Digest) -> Result<(), DecodeError> {
    if expected == actual {
        Ok(())
    } else {
        Err(DecodeError::DigestMismatch {
            path: path.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

/// Write `image` to `path` as an archive tagged with `reference`.
///
/// The archive is assembled in a temporary file next to `path` and renamed
/// into place, so `path` never holds a partial archive. Headers carry fixed
/// ownership, modes and timestamps: the same image always encodes to the same
/// bytes.
pub fn encode(image: &Image, reference: &Reference, path: &Path) -> Result<(), EncodeError> {
    let metadata = ArchiveMetadata::new(image, reference)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let temp = NamedTempFile::new_in(&dir).map_err(|e| EncodeError::io(&dir, e))?;
    write_archive(image, &metadata, temp.as_file()).map_err(|e| EncodeError::io(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| EncodeError::io(temp.path(), e))?;
    temp.persist(path)
        .map_err(|e| EncodeError::io(path, e.error))?;

    Ok(())
}

/// Serialized metadata files written alongside the blobs
struct ArchiveMetadata {
    manifest: Blob,
    index: Vec<u8>,
    entries: Vec<u8>,
}

impl ArchiveMetadata {
    fn new(image: &Image, reference: &Reference) -> Result<Self, EncodeError> {
        let manifest = image
            .manifest()
            .to_blob()
            .map_err(serialize_error("image manifest"))?;

        let mut manifest_descriptor = Descriptor::new(MEDIA_TYPE_MANIFEST, &manifest);
        manifest_descriptor.annotations = BTreeMap::from([
            (ANNOTATION_IMAGE_NAME.to_string(), reference.qualified()),
            (ANNOTATION_REF_NAME.to_string(), reference.tag().to_string()),
        ]);
        let index = ImageIndex {
            schema_version: 2,
            media_type: MEDIA_TYPE_INDEX.to_string(),
            manifests: vec![manifest_descriptor],
        };

        let entries = vec![ArchiveEntry {
            config: image.config_blob().digest().blob_path(),
            repo_tags: Some(vec![reference.to_string()]),
            layers: image
                .layers()
                .iter()
                .map(|layer| layer.digest().blob_path())
                .collect(),
        }];

        Ok(Self {
            manifest,
            index: serde_json::to_vec(&index).map_err(serialize_error(INDEX_JSON))?,
            entries: serde_json::to_vec(&entries).map_err(serialize_error(MANIFEST_JSON))?,
        })
    }
}

fn serialize_error(what: &'static str) -> impl FnOnce(serde_json::Error) -> EncodeError {
    move |source| EncodeError::Serialize { what, source }
}

fn write_archive<W: Write>(image: &Image, metadata: &ArchiveMetadata, out: W) -> io::Result<()> {
    let mut builder = Builder::new(BufWriter::new(out));
    append_dir(&mut builder, "blobs/")?;
    append_dir(&mut builder, "blobs/sha256/")?;

    let mut written = HashSet::new();
    let blobs = std::iter::once(image.config_blob())
        .chain(image.layers().iter().map(Layer::blob))
        .chain(std::iter::once(&metadata.manifest));
    for blob in blobs {
        if written.insert(blob.digest().clone()) {
            append_file(&mut builder, &blob.digest().blob_path(), blob.data())?;
        }
    }

    append_file(&mut builder, INDEX_JSON, &metadata.index)?;
    append_file(&mut builder, MANIFEST_JSON, &metadata.entries)?;
    append_file(&mut builder, OCI_LAYOUT, OCI_LAYOUT_CONTENT)?;

    builder.into_inner()?.into_inner().map_err(|e| e.into_error())?;
    Ok(())
}

fn deterministic_header(entry_type: EntryType, size: u64, mode: u32) -> Header {
    let mut header = Header::new_ustar();
    header.set_entry_type(entry_type);
    header.set_size(size);
    header.set_mode(mode);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header
}

fn append_dir<W: Write>(builder: &mut Builder<W>, name: &str) -> io::Result<()> {
    let mut header = deterministic_header(EntryType::Directory, 0, 0o755);
    builder.append_data(&mut header, name, io::empty())
}

fn append_file<W: Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) -> io::Result<()> {
    let mut header = deterministic_header(EntryType::Regular, data.len() as u64, 0o644);
    builder.append_data(&mut header, name, data)
}
