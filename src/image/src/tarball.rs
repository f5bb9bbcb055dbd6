//! Layers backed by tar archives.
//!
//! A [`TarballLayer`] wraps a tar archive on disk or in memory, plain or
//! gzip-compressed. Both hashes and the compressed size are computed once
//! when the layer is created; later reads regenerate the same bytes.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression;
use strata_core::error::{LayerOperation, Result, StrataError};

use crate::hash::Hash;
use crate::layer::{BlobReader, Layer, GZIP_MAGIC};

#[derive(Debug, Clone)]
enum Source {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
}

impl Source {
    fn open(&self) -> std::io::Result<BlobReader> {
        match self {
            Source::Path(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
            Source::Bytes(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
        }
    }

    fn is_gzip(&self) -> std::io::Result<bool> {
        let mut magic = [0u8; 2];
        let mut reader = self.open()?;
        let mut filled = 0;
        while filled < magic.len() {
            let n = reader.read(&mut magic[filled..])?;
            if n == 0 {
                return Ok(false);
            }
            filled += n;
        }
        Ok(magic == GZIP_MAGIC)
    }
}

/// A layer built from a tar archive.
#[derive(Debug, Clone)]
pub struct TarballLayer {
    source: Source,
    gzipped: bool,
    digest: Hash,
    diff_id: Hash,
    size: u64,
}

impl TarballLayer {
    /// Create a layer from a tar (or tar.gz) file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(StrataError::Other(format!(
                "Layer file not found: {}",
                path.display()
            )));
        }
        Self::new(Source::Path(path.to_path_buf()))
    }

    /// Create a layer from an in-memory tar (or tar.gz) archive.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Result<Self> {
        Self::new(Source::Bytes(Arc::from(data.into())))
    }

    fn new(source: Source) -> Result<Self> {
        let gzipped = source
            .is_gzip()
            .map_err(|e| StrataError::layer(LayerOperation::Uncompressed, e))?;

        let (diff_id, _) = open_uncompressed(&source, gzipped)
            .and_then(Hash::sha256_reader)
            .map_err(|e| StrataError::layer(LayerOperation::DiffId, e))?;

        let (digest, size) = open_compressed(&source, gzipped)
            .and_then(Hash::sha256_reader)
            .map_err(|e| StrataError::layer(LayerOperation::Digest, e))?;

        tracing::debug!(
            digest = %digest,
            diff_id = %diff_id,
            size,
            gzipped,
            "Created tarball layer"
        );

        Ok(Self {
            source,
            gzipped,
            digest,
            diff_id,
            size,
        })
    }
}

fn open_uncompressed(source: &Source, gzipped: bool) -> std::io::Result<BlobReader> {
    let raw = source.open()?;
    if gzipped {
        Ok(Box::new(GzDecoder::new(raw)))
    } else {
        Ok(raw)
    }
}

fn open_compressed(source: &Source, gzipped: bool) -> std::io::Result<BlobReader> {
    let raw = source.open()?;
    if gzipped {
        Ok(raw)
    } else {
        Ok(Box::new(GzEncoder::new(raw, Compression::default())))
    }
}

impl Layer for TarballLayer {
    fn digest(&self) -> Result<Hash> {
        Ok(self.digest.clone())
    }

    fn diff_id(&self) -> Result<Hash> {
        Ok(self.diff_id.clone())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn compressed(&self) -> Result<BlobReader> {
        open_compressed(&self.source, self.gzipped)
            .map_err(|e| StrataError::layer(LayerOperation::Compressed, e))
    }

    fn uncompressed(&self) -> Result<BlobReader> {
        open_uncompressed(&self.source, self.gzipped)
            .map_err(|e| StrataError::layer(LayerOperation::Uncompressed, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder as GzWriter;
    use std::io::Write;
    use tempfile::TempDir;

    fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *content).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzWriter::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn read_all(mut reader: BlobReader) -> Vec<u8> {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_from_bytes_plain_tar() {
        let tar = tar_bytes(&[("hello.txt", b"hello")]);
        let layer = TarballLayer::from_bytes(tar.clone()).unwrap();

        assert_eq!(layer.diff_id().unwrap(), Hash::sha256_bytes(&tar));
        assert_eq!(read_all(layer.uncompressed().unwrap()), tar);

        let compressed = read_all(layer.compressed().unwrap());
        assert_eq!(layer.digest().unwrap(), Hash::sha256_bytes(&compressed));
        assert_eq!(layer.size().unwrap(), compressed.len() as u64);
        assert_ne!(layer.digest().unwrap(), layer.diff_id().unwrap());
    }

    #[test]
    fn test_from_bytes_gzipped_tar() {
        let tar = tar_bytes(&[("a/b.txt", b"content")]);
        let blob = gzip(&tar);
        let layer = TarballLayer::from_bytes(blob.clone()).unwrap();

        assert_eq!(layer.digest().unwrap(), Hash::sha256_bytes(&blob));
        assert_eq!(layer.size().unwrap(), blob.len() as u64);
        assert_eq!(layer.diff_id().unwrap(), Hash::sha256_bytes(&tar));
        assert_eq!(read_all(layer.compressed().unwrap()), blob);
        assert_eq!(read_all(layer.uncompressed().unwrap()), tar);
    }

    #[test]
    fn test_compressed_stream_is_stable() {
        let tar = tar_bytes(&[("x", b"1"), ("y", b"22")]);
        let layer = TarballLayer::from_bytes(tar).unwrap();

        let first = read_all(layer.compressed().unwrap());
        let second = read_all(layer.compressed().unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn test_from_path_matches_from_bytes() {
        let tmp = TempDir::new().unwrap();
        let tar = tar_bytes(&[("etc/os-release", b"ID=test\n")]);
        let path = tmp.path().join("layer.tar");
        std::fs::write(&path, &tar).unwrap();

        let from_path = TarballLayer::from_path(&path).unwrap();
        let from_bytes = TarballLayer::from_bytes(tar).unwrap();

        assert_eq!(from_path.diff_id().unwrap(), from_bytes.diff_id().unwrap());
        assert_eq!(from_path.digest().unwrap(), from_bytes.digest().unwrap());
    }

    #[test]
    fn test_from_path_nonexistent() {
        let err = TarballLayer::from_path("/nonexistent/layer.tar").unwrap_err();
        assert!(err.to_string().contains("Layer file not found"));
    }

    #[test]
    fn test_corrupt_gzip_reports_diff_id_operation() {
        let mut blob = gzip(&tar_bytes(&[("f", b"data")]));
        blob.truncate(12);

        let err = TarballLayer::from_bytes(blob).unwrap_err();
        assert!(matches!(
            err,
            StrataError::Layer {
                operation: LayerOperation::DiffId,
                ..
            }
        ));
    }
}
