use canoni::cli::{Args, Settings};
use canoni::cli::runner::{EXIT_SUCCESS, execute};
use canoni::error::{CanoniError, CollaboratorError, DecodeError};
use canoni::image::archive;
use canoni::image::model::{Blob, Layer};
use canoni::image::{Digest, Image, Reference};
use canoni::logging::Logger;
use canoni::pipeline::Pipeline;
use canoni::runtime::ContainerRuntime;
use clap::Parser;
use serde_json::json;
use std::cell::RefCell;
use std::path::{Path, PathBuf};

/// In-memory stand-in for a container engine
struct FakeRuntime {
    images: Vec<(Reference, Image)>,
    corrupt_export: bool,
    fail_import: bool,
    calls: RefCell<Vec<String>>,
    exported_to: RefCell<Option<PathBuf>>,
    imported: RefCell<Vec<Image>>,
}

impl FakeRuntime {
    fn with_image(reference: &Reference, image: Image) -> Self {
        Self {
            images: vec![(reference.clone(), image)],
            corrupt_export: false,
            fail_import: false,
            calls: RefCell::new(Vec::new()),
            exported_to: RefCell::new(None),
            imported: RefCell::new(Vec::new()),
        }
    }
}

impl ContainerRuntime for FakeRuntime {
    fn export_image(&self, reference: &Reference, dest: &Path) -> Result<(), CollaboratorError> {
        self.calls.borrow_mut().push(format!("save {}", reference));
        *self.exported_to.borrow_mut() = Some(dest.to_path_buf());

        let (_, image) = self
            .images
            .iter()
            .find(|(r, _)| r == reference)
            .ok_or_else(|| CollaboratorError::Failed {
                command: format!("fake save {}", reference),
                status: "exit status: 1".to_string(),
                output: format!("Error response from daemon: reference does not exist: {}", reference),
            })?;

        if self.corrupt_export {
            std::fs::write(dest, b"this is not a tarball").unwrap();
        } else {
            archive::encode(image, reference, dest).unwrap();
        }
        Ok(())
    }

    fn import_image(&self, archive_path: &Path) -> Result<(), CollaboratorError> {
        self.calls.borrow_mut().push("load".to_string());
        if self.fail_import {
            return Err(CollaboratorError::Failed {
                command: "fake load".to_string(),
                status: "exit status: 1".to_string(),
                output: "no space left on device".to_string(),
            });
        }
        let image = archive::decode(archive_path, None).unwrap();
        self.imported.borrow_mut().push(image);
        Ok(())
    }

    fn prune_images(&self) -> Result<(), CollaboratorError> {
        self.calls.borrow_mut().push("prune".to_string());
        Ok(())
    }
}

fn layer_tar(name: &str, data: &[u8]) -> Vec<u8> {
    let mut header = tar::Header::new_ustar();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, name, data).unwrap();
    builder.into_inner().unwrap()
}

fn built_on(hostname: &str, container: &str, created: &str) -> Image {
    let layers = vec![
        Layer::new(layer_tar("etc/os-release", b"ID=fixture\n")),
        Layer::new(layer_tar("usr/bin/app", b"\x7fELF fixture")),
    ];
    let diff_ids: Vec<String> = layers.iter().map(|l| l.digest().to_string()).collect();
    let config = json!({
        "architecture": "amd64",
        "os": "linux",
        "created": created,
        "container": container,
        "docker_version": "24.0.5",
        "config": {
            "Hostname": hostname,
            "Env": ["PATH=/usr/bin"],
            "Entrypoint": ["/usr/bin/app"],
            "ExposedPorts": {"8080/tcp": {}},
            "Image": "sha256:0000000000000000000000000000000000000000000000000000000000000000"
        },
        "rootfs": {"type": "layers", "diff_ids": diff_ids}
    });
    Image::new(Blob::new(serde_json::to_vec(&config).unwrap()), layers)
}

fn myapp() -> Reference {
    Reference::parse("myapp:v1").unwrap()
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

#[test]
fn test_pipeline_imports_canonical_image() {
    let work_root = tempfile::tempdir().unwrap();
    let source = built_on("buildbox7", "a1b2c3", "2023-05-01T00:00:00Z");
    let runtime = FakeRuntime::with_image(&myapp(), source.clone());

    let pipeline = Pipeline::new(runtime, Logger::new_quiet())
        .with_work_root(Some(work_root.path().to_path_buf()));
    let report = pipeline.run(&myapp()).unwrap();

    assert_eq!(report.target.to_string(), "myapp-canoni:v1");
    assert_eq!(report.summary.layers, 2);
    assert_eq!(&report.summary.source_config, source.config_blob().digest());

    let runtime = pipeline.runtime();
    assert_eq!(*runtime.calls.borrow(), vec!["save myapp:v1", "load"]);

    let imported = runtime.imported.borrow();
    let canonical = &imported[0];
    assert_eq!(&report.summary.canonical_config, canonical.config_blob().digest());
    assert_eq!(canonical.layer_digests(), source.layer_digests());

    let config = canonical.config_file().unwrap();
    let run = config.config.unwrap();
    assert_eq!(run.hostname, "");
    assert_eq!(run.image, "");
    assert_eq!(config.container, "");
    assert_eq!(config.docker_version, "");
    assert_eq!(config.created.unwrap().timestamp(), 0);
    assert_eq!(run.env, Some(vec!["PATH=/usr/bin".to_string()]));
    assert_eq!(run.entrypoint, Some(vec!["/usr/bin/app".to_string()]));

    let exported_to = runtime.exported_to.borrow().clone().unwrap();
    assert!(exported_to.starts_with(work_root.path()));
    assert!(!exported_to.exists());
    assert!(is_empty_dir(work_root.path()));
}

#[test]
fn test_pipeline_is_deterministic_across_builds() {
    let work_root = tempfile::tempdir().unwrap();
    let mut config_digests: Vec<Digest> = Vec::new();

    for (hostname, container, created) in [
        ("buildbox7", "a1b2c3", "2023-05-01T00:00:00Z"),
        ("ci-runner-12", "deadbeef", "2024-02-29T23:59:59.999Z"),
    ] {
        let runtime = FakeRuntime::with_image(&myapp(), built_on(hostname, container, created));
        let pipeline = Pipeline::new(runtime, Logger::new_quiet())
            .with_work_root(Some(work_root.path().to_path_buf()));
        config_digests.push(pipeline.run(&myapp()).unwrap().summary.canonical_config);
    }

    assert_eq!(config_digests[0], config_digests[1]);
}

#[test]
fn test_pipeline_prunes_when_enabled() {
    let runtime = FakeRuntime::with_image(&myapp(), built_on("h", "c", "2023-05-01T00:00:00Z"));
    let pipeline = Pipeline::new(runtime, Logger::new_quiet()).with_prune(true);
    pipeline.run(&myapp()).unwrap();
    assert_eq!(
        *pipeline.runtime().calls.borrow(),
        vec!["save myapp:v1", "load", "prune"]
    );
}

#[test]
fn test_missing_image_fails_at_export_and_cleans_up() {
    let work_root = tempfile::tempdir().unwrap();
    let runtime = FakeRuntime::with_image(&myapp(), built_on("h", "c", "2023-05-01T00:00:00Z"));
    let pipeline = Pipeline::new(runtime, Logger::new_quiet())
        .with_work_root(Some(work_root.path().to_path_buf()));

    let other = Reference::parse("other:latest").unwrap();
    let err = pipeline.run(&other).unwrap_err();
    match err {
        CanoniError::Collaborator(CollaboratorError::Failed { output, .. }) => {
            assert!(output.contains("reference does not exist"));
        }
        other => panic!("expected collaborator failure, got {:?}", other),
    }
    assert_eq!(*pipeline.runtime().calls.borrow(), vec!["save other:latest"]);
    assert!(is_empty_dir(work_root.path()));
}

#[test]
fn test_corrupt_export_fails_at_decode() {
    let work_root = tempfile::tempdir().unwrap();
    let mut runtime =
        FakeRuntime::with_image(&myapp(), built_on("h", "c", "2023-05-01T00:00:00Z"));
    runtime.corrupt_export = true;
    let pipeline = Pipeline::new(runtime, Logger::new_quiet())
        .with_work_root(Some(work_root.path().to_path_buf()));

    let err = pipeline.run(&myapp()).unwrap_err();
    assert!(matches!(err, CanoniError::Decode(DecodeError::Malformed(_))));
    assert!(err.to_string().starts_with("decode: "));
    assert!(pipeline.runtime().imported.borrow().is_empty());
    assert!(is_empty_dir(work_root.path()));
}

#[test]
fn test_import_failure_is_reported_and_cleans_up() {
    let work_root = tempfile::tempdir().unwrap();
    let mut runtime =
        FakeRuntime::with_image(&myapp(), built_on("h", "c", "2023-05-01T00:00:00Z"));
    runtime.fail_import = true;
    let pipeline = Pipeline::new(runtime, Logger::new_quiet())
        .with_work_root(Some(work_root.path().to_path_buf()));

    let err = pipeline.run(&myapp()).unwrap_err();
    assert!(err.to_string().contains("no space left on device"));
    assert!(is_empty_dir(work_root.path()));
}

#[test]
fn test_execute_reports_success_exit_code() {
    let work_root = tempfile::tempdir().unwrap();
    let work_dir = work_root.path().to_string_lossy().to_string();
    let args = Args::try_parse_from(["canoni", "-q", "myapp:v1"]).unwrap();
    let env = move |key: &str| (key == "CANONI_WORK_DIR").then(|| work_dir.clone());
    let source = built_on("buildbox7", "a1b2c3", "2023-05-01T00:00:00Z");

    let mut usage: Vec<u8> = Vec::new();
    let code = execute(
        &args,
        env,
        |_: &Settings| FakeRuntime::with_image(&myapp(), source),
        &mut usage,
    );

    assert_eq!(code, EXIT_SUCCESS);
    assert!(usage.is_empty());
    assert!(is_empty_dir(work_root.path()));
}
