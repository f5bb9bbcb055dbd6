//! The image abstraction.
//!
//! [`ImageCore`] is the minimal set of primitives a source must supply: the
//! raw manifest, the raw config document, and a way to open a blob by digest.
//! [`Image`] is the full capability set; everything in it beyond the core can
//! be derived with the helpers in [`crate::partial`].

use std::collections::BTreeSet;
use std::sync::Arc;

use oci_spec::image::MediaType;
use strata_core::error::Result;

use crate::hash::Hash;
use crate::layer::{BlobReader, Layer};
use crate::manifest::{ConfigFile, Manifest};

/// Minimal primitives an image source supplies.
pub trait ImageCore: Send + Sync {
    /// Media type of the manifest.
    fn media_type(&self) -> Result<MediaType>;

    /// Serialized manifest bytes.
    fn raw_manifest(&self) -> Result<Vec<u8>>;

    /// Serialized config document bytes.
    fn raw_config_file(&self) -> Result<Vec<u8>>;

    /// Open the compressed blob with the given digest.
    fn blob(&self, digest: &Hash) -> Result<BlobReader>;
}

/// An immutable, content-addressable image.
///
/// Invariants every implementation upholds:
/// - `manifest().layers`, `config_file().rootfs.diff_ids` and
///   `config_file().history` describe the same layers in the same order;
/// - `manifest().config.digest == config_name()`;
/// - `digest()` is the hash of `raw_manifest()`.
pub trait Image: ImageCore {
    /// Parsed manifest. Callers own the returned copy.
    fn manifest(&self) -> Result<Manifest>;

    /// Parsed config document. Callers own the returned copy.
    fn config_file(&self) -> Result<ConfigFile>;

    /// Hash of the serialized manifest.
    fn digest(&self) -> Result<Hash>;

    /// Hash of the serialized config document.
    fn config_name(&self) -> Result<Hash>;

    /// Layers in order, oldest first.
    fn layers(&self) -> Result<Vec<Arc<dyn Layer>>>;

    /// Every blob digest the image references (config and layers).
    fn blob_set(&self) -> Result<BTreeSet<Hash>>;

    /// Look a layer up by its compressed digest.
    fn layer_by_digest(&self, digest: &Hash) -> Result<Arc<dyn Layer>>;

    /// Look a layer up by its uncompressed diff id.
    fn layer_by_diff_id(&self, diff_id: &Hash) -> Result<Arc<dyn Layer>>;
}
