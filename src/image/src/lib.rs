//! Strata Image - content-addressed container image composition.
//!
//! Images are immutable. Each layer is addressed twice: by the digest of its
//! compressed blob and by the diff id of its uncompressed tar. Mutations
//! return new images that share everything they did not change with their
//! base, and [`extract`] flattens any image into a single tar stream with
//! whiteouts applied.
//!
//! # Architecture
//!
//! ```text
//!   layout::image ──▶ CompressedImage ─┐
//!   empty::image  ──▶ CompressedImage ─┤
//!                                       ▼
//!                          mutate::append / config
//!                                       │
//!                                       ▼
//!                      DerivedImage ──▶ DerivedImage ──▶ ...
//!                                       │
//!                     ┌─────────────────┴─────────────────┐
//!                     ▼                                   ▼
//!              layout::write                     extract::extract
//!         (OCI layout directory)            (tar stream via bounded pipe)
//! ```

#![allow(clippy::result_large_err)]

pub mod empty;
pub mod extract;
pub mod hash;
pub mod image;
pub mod layer;
pub mod layout;
pub mod manifest;
pub mod mutate;
pub mod partial;
pub mod pipe;
pub mod tarball;

// Re-export common types
pub use extract::{extract, extract_with_config, Extraction, WHITEOUT_PREFIX};
pub use hash::Hash;
pub use image::{Image, ImageCore};
pub use layer::{BlobReader, Layer};
pub use layout::LayoutImage;
pub use manifest::{Config, ConfigFile, Descriptor, History, Manifest, RootFs};
pub use mutate::{Addendum, DerivedImage};
pub use tarball::TarballLayer;

/// Strata Image version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
