//! Lazy derivation helpers.
//!
//! Given only the primitives of [`ImageCore`], these functions derive the
//! rest of an image's observable properties. They hold no state, perform no
//! writes, and return the same answer for the same input.

use std::collections::BTreeSet;
use std::fmt;
use std::io::{BufRead, BufReader, Cursor};
use std::sync::Arc;

use flate2::read::GzDecoder;
use oci_spec::image::MediaType;
use strata_core::error::{LayerOperation, Result, StrataError};

use crate::hash::Hash;
use crate::image::{Image, ImageCore};
use crate::layer::{BlobReader, Layer, GZIP_MAGIC};
use crate::manifest::{ConfigFile, Descriptor, Manifest};

/// Parse the manifest from its raw form.
pub fn manifest<I: ImageCore + ?Sized>(image: &I) -> Result<Manifest> {
    Manifest::from_slice(&image.raw_manifest()?)
}

/// Parse the config document from its raw form.
pub fn config_file<I: ImageCore + ?Sized>(image: &I) -> Result<ConfigFile> {
    ConfigFile::from_slice(&image.raw_config_file()?)
}

/// Hash of the raw manifest. Fails if the manifest does not parse.
pub fn digest<I: ImageCore + ?Sized>(image: &I) -> Result<Hash> {
    let raw = image.raw_manifest()?;
    Manifest::from_slice(&raw)?;
    Ok(Hash::sha256_bytes(&raw))
}

/// Hash of the raw config document.
pub fn config_name<I: ImageCore + ?Sized>(image: &I) -> Result<Hash> {
    Ok(Hash::sha256_bytes(&image.raw_config_file()?))
}

/// The config's diff id list, in order.
pub fn diff_ids<I: ImageCore + ?Sized>(image: &I) -> Result<Vec<Hash>> {
    Ok(config_file(image)?.rootfs.diff_ids)
}

/// Every digest reachable from the manifest: the config and each layer.
pub fn blob_set<I: ImageCore + ?Sized>(image: &I) -> Result<BTreeSet<Hash>> {
    let manifest = manifest(image)?;
    let mut blobs = BTreeSet::new();
    blobs.insert(manifest.config.digest);
    blobs.extend(manifest.layers.into_iter().map(|layer| layer.digest));
    Ok(blobs)
}

/// Wrap the raw config document as a layer so it resolves by digest.
pub fn config_layer<I: ImageCore + ?Sized>(image: &I) -> Result<Arc<dyn Layer>> {
    Ok(Arc::new(ConfigLayer::new(image.raw_config_file()?)))
}

/// A pseudo-layer over the raw config bytes.
///
/// The config is stored uncompressed, so digest and diff id coincide.
pub struct ConfigLayer {
    content: Arc<[u8]>,
    hash: Hash,
}

impl ConfigLayer {
    pub fn new(content: Vec<u8>) -> Self {
        let hash = Hash::sha256_bytes(&content);
        Self {
            content: Arc::from(content),
            hash,
        }
    }
}

impl fmt::Debug for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigLayer")
            .field("hash", &self.hash)
            .field("size", &self.content.len())
            .finish()
    }
}

impl Layer for ConfigLayer {
    fn digest(&self) -> Result<Hash> {
        Ok(self.hash.clone())
    }

    fn diff_id(&self) -> Result<Hash> {
        Ok(self.hash.clone())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.content.len() as u64)
    }

    fn compressed(&self) -> Result<BlobReader> {
        Ok(Box::new(Cursor::new(self.content.clone())))
    }

    fn uncompressed(&self) -> Result<BlobReader> {
        Ok(Box::new(Cursor::new(self.content.clone())))
    }

    fn media_type(&self) -> MediaType {
        MediaType::ImageConfig
    }
}

/// Upgrade any [`ImageCore`] into a full [`Image`].
pub fn compressed_to_image<C: ImageCore + 'static>(core: C) -> Arc<dyn Image> {
    Arc::new(CompressedImage {
        core: Arc::new(core),
    })
}

/// An [`Image`] whose every property is derived from an [`ImageCore`].
///
/// Layers are read through [`ImageCore::blob`]; their diff ids come from the
/// config at the same position as the manifest descriptor.
pub struct CompressedImage<C> {
    core: Arc<C>,
}

impl<C: ImageCore + 'static> CompressedImage<C> {
    /// Manifest and config, checked to describe the same number of layers.
    fn documents(&self) -> Result<(Manifest, ConfigFile)> {
        let manifest = manifest(self.core.as_ref())?;
        let config = config_file(self.core.as_ref())?;
        if manifest.layers.len() != config.rootfs.diff_ids.len() {
            return Err(StrataError::Validation(format!(
                "manifest lists {} layers but config lists {} diff ids",
                manifest.layers.len(),
                config.rootfs.diff_ids.len()
            )));
        }
        Ok((manifest, config))
    }

    fn blob_layer(&self, descriptor: Descriptor, diff_id: Hash) -> Arc<dyn Layer> {
        Arc::new(BlobLayer {
            core: self.core.clone(),
            descriptor,
            diff_id,
        })
    }
}

impl<C: ImageCore + 'static> ImageCore for CompressedImage<C> {
    fn media_type(&self) -> Result<MediaType> {
        self.core.media_type()
    }

    fn raw_manifest(&self) -> Result<Vec<u8>> {
        self.core.raw_manifest()
    }

    fn raw_config_file(&self) -> Result<Vec<u8>> {
        self.core.raw_config_file()
    }

    fn blob(&self, digest: &Hash) -> Result<BlobReader> {
        self.core.blob(digest)
    }
}

impl<C: ImageCore + 'static> Image for CompressedImage<C> {
    fn manifest(&self) -> Result<Manifest> {
        manifest(self.core.as_ref())
    }

    fn config_file(&self) -> Result<ConfigFile> {
        config_file(self.core.as_ref())
    }

    fn digest(&self) -> Result<Hash> {
        digest(self.core.as_ref())
    }

    fn config_name(&self) -> Result<Hash> {
        config_name(self.core.as_ref())
    }

    fn layers(&self) -> Result<Vec<Arc<dyn Layer>>> {
        let (manifest, config) = self.documents()?;
        Ok(manifest
            .layers
            .into_iter()
            .zip(config.rootfs.diff_ids)
            .map(|(descriptor, diff_id)| self.blob_layer(descriptor, diff_id))
            .collect())
    }

    fn blob_set(&self) -> Result<BTreeSet<Hash>> {
        blob_set(self.core.as_ref())
    }

    fn layer_by_digest(&self, digest: &Hash) -> Result<Arc<dyn Layer>> {
        if *digest == self.config_name()? {
            return config_layer(self.core.as_ref());
        }

        let (manifest, config) = self.documents()?;
        manifest
            .layers
            .into_iter()
            .zip(config.rootfs.diff_ids)
            .find(|(descriptor, _)| descriptor.digest == *digest)
            .map(|(descriptor, diff_id)| self.blob_layer(descriptor, diff_id))
            .ok_or_else(|| StrataError::LayerNotFound(digest.to_string()))
    }

    fn layer_by_diff_id(&self, diff_id: &Hash) -> Result<Arc<dyn Layer>> {
        let (manifest, config) = self.documents()?;
        manifest
            .layers
            .into_iter()
            .zip(config.rootfs.diff_ids)
            .find(|(_, candidate)| candidate == diff_id)
            .map(|(descriptor, diff_id)| self.blob_layer(descriptor, diff_id))
            .ok_or_else(|| StrataError::LayerNotFound(diff_id.to_string()))
    }
}

/// A layer read from an image's blob store.
struct BlobLayer {
    core: Arc<dyn ImageCore>,
    descriptor: Descriptor,
    diff_id: Hash,
}

impl fmt::Debug for BlobLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobLayer")
            .field("digest", &self.descriptor.digest)
            .field("diff_id", &self.diff_id)
            .field("size", &self.descriptor.size)
            .finish()
    }
}

impl Layer for BlobLayer {
    fn digest(&self) -> Result<Hash> {
        Ok(self.descriptor.digest.clone())
    }

    fn diff_id(&self) -> Result<Hash> {
        Ok(self.diff_id.clone())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.descriptor.size)
    }

    fn compressed(&self) -> Result<BlobReader> {
        self.core
            .blob(&self.descriptor.digest)
            .map_err(|e| StrataError::layer(LayerOperation::Compressed, e))
    }

    fn uncompressed(&self) -> Result<BlobReader> {
        let blob = self
            .core
            .blob(&self.descriptor.digest)
            .map_err(|e| StrataError::layer(LayerOperation::Uncompressed, e))?;

        // Uncompressed layer blobs are legal; sniff instead of trusting the media type.
        let mut reader = BufReader::new(blob);
        let gzipped = reader
            .fill_buf()
            .map_err(|e| StrataError::layer(LayerOperation::Uncompressed, e))?
            .starts_with(&GZIP_MAGIC);

        if gzipped {
            Ok(Box::new(GzDecoder::new(reader)))
        } else {
            Ok(Box::new(reader))
        }
    }

    fn media_type(&self) -> MediaType {
        self.descriptor.media_type.clone()
    }
}
