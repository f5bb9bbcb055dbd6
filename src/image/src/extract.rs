//! Flatten an image into a single tar stream.
//!
//! Layers are walked newest first. Each path is decided the first time it is
//! seen: a live entry is written through, a whiteout marker records a
//! tombstone, and every later (older) mention of that path, or of anything
//! below a tombstoned directory, is skipped.
//!
//! The walk runs on a background thread writing into a bounded [`pipe`], so
//! a slow consumer throttles the producer and the flattened filesystem is
//! never held in memory.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread::JoinHandle;

use strata_core::config::ExtractConfig;
use strata_core::error::{Result, StrataError};

use crate::image::Image;
use crate::pipe::{pipe, PipeReader, PipeWriter};

/// Base-name prefix marking a deleted path.
pub const WHITEOUT_PREFIX: &str = ".wh.";

/// Flatten `image` with the default pipe settings.
pub fn extract(image: Arc<dyn Image>) -> Result<Extraction> {
    extract_with_config(image, &ExtractConfig::default())
}

/// Flatten `image`, buffering at most `pipe_depth` chunks of `chunk_size`.
pub fn extract_with_config(image: Arc<dyn Image>, config: &ExtractConfig) -> Result<Extraction> {
    config.validate()?;

    let (writer, reader) = pipe(config.pipe_depth, config.chunk_size);
    let producer = std::thread::Builder::new()
        .name("strata-extract".to_string())
        .spawn(move || produce(image, writer))?;

    Ok(Extraction {
        reader: Some(reader),
        producer: Some(producer),
    })
}

/// The flattened tar stream.
///
/// Reading to EOF yields the complete archive; a failure inside the walk is
/// returned as the final read error. Dropping or closing the stream early
/// stops the producer.
pub struct Extraction {
    reader: Option<PipeReader>,
    producer: Option<JoinHandle<()>>,
}

impl Extraction {
    /// Stop reading and wait for the producer to exit.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.take() {
            reader.close();
        }
        match self.producer.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| StrataError::Other("extraction thread panicked".to_string())),
            None => Ok(()),
        }
    }
}

impl Read for Extraction {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reader.as_mut() {
            Some(reader) => reader.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for Extraction {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[derive(Debug, Default)]
struct ExtractStats {
    layers: usize,
    entries: usize,
    whiteouts: usize,
    shadowed: usize,
}

fn produce(image: Arc<dyn Image>, writer: PipeWriter) {
    let mut builder = tar::Builder::new(writer);

    let outcome = flatten(image.as_ref(), &mut builder).and_then(|stats| {
        builder.finish().map_err(write_error)?;
        Ok(stats)
    });

    if builder.get_ref().is_disconnected() {
        tracing::debug!("Extraction cancelled by reader");
        return;
    }

    match outcome {
        Ok(stats) => {
            tracing::debug!(
                layers = stats.layers,
                entries = stats.entries,
                whiteouts = stats.whiteouts,
                shadowed = stats.shadowed,
                "Flattened image"
            );
            if let Err(e) = builder.get_mut().close_with_error(None) {
                tracing::debug!(error = %e, "Reader went away before end of archive");
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "Extraction failed");
            let _ = builder.get_mut().close_with_error(Some(e.into_io()));
        }
    }
}

/// A GNU long name, long link or PAX header that describes the member after it.
struct Extension {
    header: tar::Header,
    data: Vec<u8>,
}

fn flatten<W: Write>(image: &dyn Image, builder: &mut tar::Builder<W>) -> Result<ExtractStats> {
    let layers = image.layers()?;
    let mut resolved: HashMap<Vec<u8>, bool> = HashMap::new();
    let mut stats = ExtractStats::default();

    for layer in layers.iter().rev() {
        stats.layers += 1;

        let contents = layer
            .uncompressed()
            .map_err(|e| StrataError::ArchiveError(format!("reading layer contents: {e}")))?;
        let mut archive = tar::Archive::new(contents);
        let mut extensions: Vec<Extension> = Vec::new();

        for entry in archive.entries().map_err(read_error)?.raw(true) {
            let mut entry = entry.map_err(read_error)?;
            let entry_type = entry.header().entry_type();

            if entry_type.is_pax_global_extensions() {
                tracing::debug!("Dropping global PAX header");
                continue;
            }
            if entry_type.is_gnu_longname()
                || entry_type.is_gnu_longlink()
                || entry_type.is_pax_local_extensions()
            {
                let header = entry.header().clone();
                let mut data = Vec::new();
                entry.read_to_end(&mut data).map_err(read_error)?;
                extensions.push(Extension { header, data });
                continue;
            }

            let member = std::mem::take(&mut extensions);
            let raw_path = member_path(&member, entry.header());
            let is_dir = entry_type.is_dir() || raw_path.ends_with(b"/");
            let path = normalize(&raw_path);

            let (dir, base) = match path.iter().rposition(|&b| b == b'/') {
                Some(i) => (&path[..i], &path[i + 1..]),
                None => (&path[..0], path),
            };
            let (name, tombstone) = match base.strip_prefix(WHITEOUT_PREFIX.as_bytes()) {
                Some(name) => (name, true),
                None => (base, false),
            };
            if tombstone && name.is_empty() {
                tracing::warn!(
                    path = %String::from_utf8_lossy(&raw_path),
                    "Ignoring whiteout marker without a target"
                );
                continue;
            }

            let canonical = if is_dir {
                path.to_vec()
            } else if dir.is_empty() {
                name.to_vec()
            } else {
                [dir, &b"/"[..], name].concat()
            };

            if resolved.contains_key(&canonical) || in_whiteout_dir(&resolved, &canonical) {
                stats.shadowed += 1;
                continue;
            }
            resolved.insert(canonical, tombstone || !is_dir);

            if tombstone {
                stats.whiteouts += 1;
                continue;
            }

            write_member(builder, &member, &mut entry)?;
            stats.entries += 1;
        }

        if !extensions.is_empty() {
            return Err(StrataError::ArchiveError(
                "reading tar: extension header without a following entry".to_string(),
            ));
        }
    }

    Ok(stats)
}

/// The member's full name: a GNU long name, then a PAX `path` record, then the header.
fn member_path(extensions: &[Extension], header: &tar::Header) -> Vec<u8> {
    if let Some(long) = extensions
        .iter()
        .find(|e| e.header.entry_type().is_gnu_longname())
    {
        let mut name = long.data.as_slice();
        while let Some(rest) = name.strip_suffix(b"\0") {
            name = rest;
        }
        return name.to_vec();
    }

    let pax_path = extensions
        .iter()
        .filter(|e| e.header.entry_type().is_pax_local_extensions())
        .flat_map(|e| tar::PaxExtensions::new(&e.data))
        .filter_map(|record| record.ok())
        .filter(|record| record.key_bytes() == b"path")
        .map(|record| record.value_bytes().to_vec())
        .last();

    pax_path.unwrap_or_else(|| header.path_bytes().into_owned())
}

/// Replay a member's extension headers, header and body byte for byte.
fn write_member<W: Write, R: Read>(
    builder: &mut tar::Builder<W>,
    extensions: &[Extension],
    entry: &mut tar::Entry<'_, R>,
) -> Result<()> {
    for extension in extensions {
        builder
            .append(&extension.header, extension.data.as_slice())
            .map_err(write_error)?;
    }
    let header = entry.header().clone();
    builder.append(&header, entry).map_err(write_error)
}

/// True if some ancestor directory of `path` is tombstoned.
fn in_whiteout_dir(resolved: &HashMap<Vec<u8>, bool>, path: &[u8]) -> bool {
    let mut current = path;
    while let Some(i) = current.iter().rposition(|&b| b == b'/') {
        let parent = &current[..i];
        if resolved.get(parent).copied().unwrap_or(false) {
            return true;
        }
        current = parent;
    }
    false
}

/// Strip `./` prefixes and leading or trailing slashes.
fn normalize(path: &[u8]) -> &[u8] {
    let mut path = path;
    while let Some(rest) = path.strip_prefix(b"./") {
        path = rest;
    }
    if path == b"." {
        return &[];
    }
    while let Some(rest) = path.strip_prefix(b"/") {
        path = rest;
    }
    while let Some(rest) = path.strip_suffix(b"/") {
        path = rest;
    }
    path
}

fn read_error(e: io::Error) -> StrataError {
    StrataError::ArchiveError(format!("reading tar: {e}"))
}

fn write_error(e: io::Error) -> StrataError {
    StrataError::ArchiveError(format!("copying entry: {e}"))
}
