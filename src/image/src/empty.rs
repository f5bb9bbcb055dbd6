//! The empty image: no layers, a minimal config.
//!
//! Building an image from scratch means appending layers to this.

use std::io::Cursor;
use std::sync::Arc;

use oci_spec::image::MediaType;
use strata_core::error::{Result, StrataError};

use crate::hash::Hash;
use crate::image::{Image, ImageCore};
use crate::layer::BlobReader;
use crate::manifest::{ConfigFile, Descriptor, Manifest};
use crate::partial;

struct EmptyCore {
    manifest: Vec<u8>,
    config: Vec<u8>,
    config_digest: Hash,
}

impl ImageCore for EmptyCore {
    fn media_type(&self) -> Result<MediaType> {
        Ok(MediaType::ImageManifest)
    }

    fn raw_manifest(&self) -> Result<Vec<u8>> {
        Ok(self.manifest.clone())
    }

    fn raw_config_file(&self) -> Result<Vec<u8>> {
        Ok(self.config.clone())
    }

    fn blob(&self, digest: &Hash) -> Result<BlobReader> {
        if *digest == self.config_digest {
            return Ok(Box::new(Cursor::new(self.config.clone())));
        }
        Err(StrataError::LayerNotFound(digest.to_string()))
    }
}

/// An image with no layers and a linux/amd64 config.
pub fn image() -> Result<Arc<dyn Image>> {
    let config = ConfigFile {
        architecture: "amd64".to_string(),
        os: "linux".to_string(),
        ..Default::default()
    }
    .to_vec()?;
    let config_digest = Hash::sha256_bytes(&config);

    let manifest = Manifest {
        schema_version: 2,
        media_type: Some(MediaType::ImageManifest),
        config: Descriptor::new(
            MediaType::ImageConfig,
            config.len() as u64,
            config_digest.clone(),
        ),
        layers: Vec::new(),
        annotations: None,
        extra: Default::default(),
    }
    .to_vec()?;

    Ok(partial::compressed_to_image(EmptyCore {
        manifest,
        config,
        config_digest,
    }))
}
