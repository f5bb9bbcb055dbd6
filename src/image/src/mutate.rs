//! Copy-on-write image mutation.
//!
//! Every function here takes a shared base image and returns a new
//! [`DerivedImage`] holding its own copies of the manifest and config plus
//! the layers it added. The base is never modified, so mutations against the
//! same base can run concurrently without locks.

use std::collections::{BTreeSet, HashMap};
use std::io::Cursor;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use oci_spec::image::{MediaType, ToDockerV2S2};
use strata_core::error::{LayerOperation, Result, StrataError};

use crate::hash::Hash;
use crate::image::{Image, ImageCore};
use crate::layer::{BlobReader, Layer};
use crate::manifest::{Config, ConfigFile, Descriptor, History, Manifest};
use crate::partial;

/// A layer to append, with the history entry that describes it.
#[derive(Debug, Clone, Default)]
pub struct Addendum {
    pub layer: Option<Arc<dyn Layer>>,
    pub history: History,
}

impl Addendum {
    pub fn new(layer: Arc<dyn Layer>) -> Self {
        Self {
            layer: Some(layer),
            history: History::default(),
        }
    }

    pub fn with_history(mut self, history: History) -> Self {
        self.history = history;
        self
    }
}

/// Append layers with empty history entries.
pub fn append_layers(base: Arc<dyn Image>, layers: Vec<Arc<dyn Layer>>) -> Result<Arc<dyn Image>> {
    append(base, layers.into_iter().map(Addendum::new).collect())
}

/// Append layers and their history entries to `base`.
///
/// An empty `addenda` returns `base` itself. Every addendum must carry a
/// layer; this is checked before anything is read.
pub fn append(base: Arc<dyn Image>, addenda: Vec<Addendum>) -> Result<Arc<dyn Image>> {
    if addenda.is_empty() {
        return Ok(base);
    }

    let layers = addenda
        .iter()
        .map(|addendum| {
            addendum.layer.clone().ok_or_else(|| {
                StrataError::Validation("unable to add a missing layer to the image".to_string())
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut image = DerivedImage::from_base(base)?;

    for (layer, addendum) in layers.iter().zip(&addenda) {
        let diff_id = layer
            .diff_id()
            .map_err(|e| StrataError::layer(LayerOperation::DiffId, e))?;
        image.config_file.rootfs.diff_ids.push(diff_id.clone());
        image.config_file.history.push(addendum.history.clone());
        image.diff_id_map.insert(diff_id, layer.clone());
    }

    let layer_type = layer_media_type(&image.media_type()?);
    for layer in &layers {
        let size = layer
            .size()
            .map_err(|e| StrataError::layer(LayerOperation::Size, e))?;
        let digest = layer
            .digest()
            .map_err(|e| StrataError::layer(LayerOperation::Digest, e))?;

        tracing::debug!(digest = %digest, size, "Appending layer");

        image
            .manifest
            .layers
            .push(Descriptor::new(layer_type.clone(), size, digest.clone()));
        image.digest_map.insert(digest, layer.clone());
    }

    image.refresh_config_descriptor()?;

    tracing::debug!(
        added = layers.len(),
        total = image.manifest.layers.len(),
        config = %image.manifest.config.digest,
        "Appended layers"
    );

    Ok(Arc::new(image))
}

/// The generic gzip layer type from the same family as `manifest_type`.
fn layer_media_type(manifest_type: &MediaType) -> MediaType {
    let docker_manifest = MediaType::ImageManifest
        .to_docker_v2s2()
        .map_or(false, |docker| manifest_type.to_string() == docker);
    match MediaType::ImageLayerGzip.to_docker_v2s2() {
        Ok(docker_layer) if docker_manifest => MediaType::from(docker_layer),
        _ => MediaType::ImageLayerGzip,
    }
}

/// Replace the runtime config of `base`. Layers and history are kept.
pub fn config(base: Arc<dyn Image>, config: Config) -> Result<Arc<dyn Image>> {
    let mut image = DerivedImage::from_base(base)?;
    image.config_file.config = config;
    image.refresh_config_descriptor()?;

    tracing::debug!(config = %image.manifest.config.digest, "Replaced runtime config");
    Ok(Arc::new(image))
}

/// Replace the whole config document of `base`.
///
/// The new document must list the same diff ids as the base and keep the
/// same number of history entries.
pub fn config_file(base: Arc<dyn Image>, config_file: ConfigFile) -> Result<Arc<dyn Image>> {
    let mut image = DerivedImage::from_base(base)?;

    if config_file.rootfs.diff_ids != image.config_file.rootfs.diff_ids {
        return Err(StrataError::Validation(
            "replacement config must keep the image's diff ids".to_string(),
        ));
    }
    if config_file.history.len() != image.config_file.history.len() {
        return Err(StrataError::Validation(format!(
            "replacement config has {} history entries, image has {}",
            config_file.history.len(),
            image.config_file.history.len()
        )));
    }

    image.config_file = config_file;
    image.refresh_config_descriptor()?;

    tracing::debug!(config = %image.manifest.config.digest, "Replaced config file");
    Ok(Arc::new(image))
}

/// Override the creation timestamp of `base`.
pub fn created_at(base: Arc<dyn Image>, created: DateTime<Utc>) -> Result<Arc<dyn Image>> {
    let mut image = DerivedImage::from_base(base)?;
    image.config_file.created = Some(created);
    image.refresh_config_descriptor()?;

    tracing::debug!(created = %created, config = %image.manifest.config.digest, "Set creation time");
    Ok(Arc::new(image))
}

/// An image derived from a base by one mutation.
///
/// Owns copies of the manifest and config, and only the layers this
/// mutation added. Everything else resolves through `base`.
pub struct DerivedImage {
    base: Arc<dyn Image>,
    manifest: Manifest,
    config_file: ConfigFile,
    diff_id_map: HashMap<Hash, Arc<dyn Layer>>,
    digest_map: HashMap<Hash, Arc<dyn Layer>>,
}

impl DerivedImage {
    fn from_base(base: Arc<dyn Image>) -> Result<Self> {
        let manifest = base.manifest()?;
        let config_file = base.config_file()?;
        Ok(Self {
            base,
            manifest,
            config_file,
            diff_id_map: HashMap::new(),
            digest_map: HashMap::new(),
        })
    }

    /// Point the manifest's config descriptor at the current config.
    fn refresh_config_descriptor(&mut self) -> Result<()> {
        let raw = self.config_file.to_vec()?;
        self.manifest.config.digest = Hash::sha256_bytes(&raw);
        self.manifest.config.size = raw.len() as u64;
        Ok(())
    }
}

impl ImageCore for DerivedImage {
    fn media_type(&self) -> Result<MediaType> {
        self.base.media_type()
    }

    fn raw_manifest(&self) -> Result<Vec<u8>> {
        self.manifest.to_vec()
    }

    fn raw_config_file(&self) -> Result<Vec<u8>> {
        self.config_file.to_vec()
    }

    fn blob(&self, digest: &Hash) -> Result<BlobReader> {
        if *digest == self.manifest.config.digest {
            return Ok(Box::new(Cursor::new(self.raw_config_file()?)));
        }
        match self.digest_map.get(digest) {
            Some(layer) => layer.compressed(),
            None => self.base.blob(digest),
        }
    }
}

impl Image for DerivedImage {
    fn manifest(&self) -> Result<Manifest> {
        Ok(self.manifest.clone())
    }

    fn config_file(&self) -> Result<ConfigFile> {
        Ok(self.config_file.clone())
    }

    fn digest(&self) -> Result<Hash> {
        partial::digest(self)
    }

    fn config_name(&self) -> Result<Hash> {
        partial::config_name(self)
    }

    fn layers(&self) -> Result<Vec<Arc<dyn Layer>>> {
        self.config_file
            .rootfs
            .diff_ids
            .iter()
            .map(|diff_id| self.layer_by_diff_id(diff_id))
            .collect()
    }

    fn blob_set(&self) -> Result<BTreeSet<Hash>> {
        partial::blob_set(self)
    }

    fn layer_by_digest(&self, digest: &Hash) -> Result<Arc<dyn Layer>> {
        if *digest == self.config_name()? {
            return partial::config_layer(self);
        }
        match self.digest_map.get(digest) {
            Some(layer) => Ok(layer.clone()),
            None => self.base.layer_by_digest(digest),
        }
    }

    fn layer_by_diff_id(&self, diff_id: &Hash) -> Result<Arc<dyn Layer>> {
        match self.diff_id_map.get(diff_id) {
            Some(layer) => Ok(layer.clone()),
            None => self.base.layer_by_diff_id(diff_id),
        }
    }
}
