//! The layer abstraction.
//!
//! A layer is one filesystem delta, addressed two ways: its *digest* is the
//! hash of the compressed blob (what registries store), its *diff id* is the
//! hash of the uncompressed tar (what the image config lists).

use std::fmt::Debug;
use std::io::Read;

use oci_spec::image::MediaType;
use strata_core::error::Result;

use crate::hash::Hash;

/// Leading bytes of every gzip stream.
pub(crate) const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A readable byte stream handed out by layers and images.
pub type BlobReader = Box<dyn Read + Send>;

/// One content-addressable filesystem delta.
///
/// Implementations must keep `digest()` and `diff_id()` stable for the
/// lifetime of the value and consistent with the bytes `compressed()` and
/// `uncompressed()` produce.
pub trait Layer: Send + Sync + Debug {
    /// Hash of the compressed representation.
    fn digest(&self) -> Result<Hash>;

    /// Hash of the uncompressed tar stream.
    fn diff_id(&self) -> Result<Hash>;

    /// Size of the compressed representation in bytes.
    fn size(&self) -> Result<u64>;

    /// Open the compressed representation.
    fn compressed(&self) -> Result<BlobReader>;

    /// Open the uncompressed tar stream.
    fn uncompressed(&self) -> Result<BlobReader>;

    /// Media type of the compressed representation.
    fn media_type(&self) -> MediaType {
        MediaType::ImageLayerGzip
    }
}
