//! OCI image layout directories.
//!
//! Reads the first image referenced by a layout's `index.json` and writes any
//! image back out as a layout. Layer blobs are streamed, never loaded whole.

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use oci_spec::image::{ImageIndex, MediaType};
use strata_core::error::{Result, StrataError};

use crate::hash::{Hash, HashingWriter};
use crate::image::{Image, ImageCore};
use crate::layer::BlobReader;
use crate::manifest::Manifest;
use crate::partial;

const OCI_LAYOUT: &str = r#"{"imageLayoutVersion":"1.0.0"}"#;

/// An image stored in an OCI layout directory.
#[derive(Debug)]
pub struct LayoutImage {
    /// Root directory of the layout
    root_dir: PathBuf,

    /// Media type recorded for the manifest in `index.json`
    media_type: MediaType,

    raw_manifest: Vec<u8>,
    raw_config: Vec<u8>,
}

impl LayoutImage {
    /// Open the first image of the layout at `path`.
    ///
    /// The directory must contain `oci-layout`, `index.json` and `blobs/`.
    /// The manifest and config are read eagerly and checked against their
    /// digests; layer blobs are opened on demand.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root_dir = path.as_ref().to_path_buf();
        validate_layout(&root_dir)?;

        let index = load_index(&root_dir)?;
        let descriptor = index.manifests().first().ok_or_else(|| {
            StrataError::LayoutError(format!(
                "No manifests in index.json at {}",
                root_dir.display()
            ))
        })?;
        let manifest_digest: Hash = descriptor.digest().to_string().parse()?;
        let media_type = descriptor.media_type().clone();

        let raw_manifest = read_verified(&root_dir, &manifest_digest)?;
        let manifest = Manifest::from_slice(&raw_manifest)?;
        let raw_config = read_verified(&root_dir, &manifest.config.digest)?;

        tracing::debug!(
            path = %root_dir.display(),
            manifest = %manifest_digest,
            layers = manifest.layers.len(),
            "Opened image layout"
        );

        Ok(Self {
            root_dir,
            media_type,
            raw_manifest,
            raw_config,
        })
    }

    /// Get the root directory of the layout.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

impl ImageCore for LayoutImage {
    fn media_type(&self) -> Result<MediaType> {
        Ok(self.media_type.clone())
    }

    fn raw_manifest(&self) -> Result<Vec<u8>> {
        Ok(self.raw_manifest.clone())
    }

    fn raw_config_file(&self) -> Result<Vec<u8>> {
        Ok(self.raw_config.clone())
    }

    fn blob(&self, digest: &Hash) -> Result<BlobReader> {
        let path = blob_path(&self.root_dir, digest);
        match File::open(&path) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StrataError::LayerNotFound(digest.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Open the first image of the layout at `path` as a full [`Image`].
pub fn image(path: impl AsRef<Path>) -> Result<Arc<dyn Image>> {
    Ok(partial::compressed_to_image(LayoutImage::open(path)?))
}

/// Write `image` as an OCI layout at `path` and return its manifest digest.
///
/// Blobs already present under `blobs/` are not rewritten, so several
/// images sharing layers can be written to the same directory. `index.json`
/// is replaced and lists only this image.
pub fn write(image: &dyn Image, path: impl AsRef<Path>) -> Result<Hash> {
    let output_dir = path.as_ref();
    std::fs::create_dir_all(output_dir.join("blobs")).map_err(|e| {
        StrataError::LayoutError(format!(
            "Failed to create blobs dir in {}: {}",
            output_dir.display(),
            e
        ))
    })?;

    let layers = image.layers()?;
    for layer in &layers {
        let digest = layer.digest()?;
        let target = blob_path(output_dir, &digest);
        if target.exists() {
            tracing::debug!(digest = %digest, "Layer blob already present");
            continue;
        }
        write_blob_stream(&target, &digest, layer.compressed()?)?;
    }

    let raw_config = image.raw_config_file()?;
    write_blob(output_dir, &raw_config)?;

    let raw_manifest = image.raw_manifest()?;
    let manifest_digest = write_blob(output_dir, &raw_manifest)?;

    let index = serde_json::json!({
        "schemaVersion": 2,
        "mediaType": MediaType::ImageIndex.to_string(),
        "manifests": [{
            "mediaType": image.media_type()?.to_string(),
            "digest": manifest_digest.to_string(),
            "size": raw_manifest.len()
        }]
    });
    std::fs::write(
        output_dir.join("index.json"),
        serde_json::to_string_pretty(&index)?,
    )
    .map_err(|e| StrataError::LayoutError(format!("Failed to write index.json: {}", e)))?;

    std::fs::write(output_dir.join("oci-layout"), OCI_LAYOUT)
        .map_err(|e| StrataError::LayoutError(format!("Failed to write oci-layout: {}", e)))?;

    tracing::debug!(
        path = %output_dir.display(),
        manifest = %manifest_digest,
        layers = layers.len(),
        "Wrote image layout"
    );

    Ok(manifest_digest)
}

/// Validate that the directory contains an OCI layout.
fn validate_layout(root_dir: &Path) -> Result<()> {
    for required in ["oci-layout", "index.json", "blobs"] {
        if !root_dir.join(required).exists() {
            return Err(StrataError::LayoutError(format!(
                "Not a valid OCI layout: missing {} in {}",
                required,
                root_dir.display()
            )));
        }
    }
    Ok(())
}

fn load_index(root_dir: &Path) -> Result<ImageIndex> {
    let index_path = root_dir.join("index.json");
    let content = std::fs::read_to_string(&index_path).map_err(|e| {
        StrataError::LayoutError(format!(
            "Failed to read index.json at {}: {}",
            index_path.display(),
            e
        ))
    })?;

    serde_json::from_str(&content)
        .map_err(|e| StrataError::LayoutError(format!("Failed to parse index.json: {}", e)))
}

fn blob_path(root_dir: &Path, digest: &Hash) -> PathBuf {
    root_dir
        .join("blobs")
        .join(digest.algorithm())
        .join(digest.hex())
}

/// Read a small blob and check it hashes to `digest`.
fn read_verified(root_dir: &Path, digest: &Hash) -> Result<Vec<u8>> {
    let path = blob_path(root_dir, digest);
    let content = std::fs::read(&path).map_err(|e| {
        StrataError::LayoutError(format!("Failed to read blob {}: {}", path.display(), e))
    })?;

    let actual = Hash::sha256_bytes(&content);
    if actual != *digest {
        return Err(StrataError::LayoutError(format!(
            "Blob {} has digest {}",
            digest, actual
        )));
    }
    Ok(content)
}

fn write_blob(root_dir: &Path, content: &[u8]) -> Result<Hash> {
    let digest = Hash::sha256_bytes(content);
    let target = blob_path(root_dir, &digest);
    if !target.exists() {
        write_blob_stream(&target, &digest, content)?;
    }
    Ok(digest)
}

/// Stream a blob into place, failing if its content does not match `digest`.
fn write_blob_stream(target: &Path, digest: &Hash, mut content: impl io::Read) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let partial_path = target.with_extension("partial");

    let file = File::create(&partial_path)?;
    let mut writer = HashingWriter::new(io::BufWriter::new(file));
    io::copy(&mut content, &mut writer)?;
    writer.flush()?;
    let (actual, size) = writer.finish();

    if actual != *digest {
        let _ = std::fs::remove_file(&partial_path);
        return Err(StrataError::LayoutError(format!(
            "Blob content hashed to {} but was expected to be {}",
            actual, digest
        )));
    }

    std::fs::rename(&partial_path, target)?;
    tracing::debug!(digest = %digest, size, "Wrote blob");
    Ok(())
}
