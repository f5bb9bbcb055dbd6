//! Bounded in-memory pipe between a producer thread and a reader.
//!
//! The writer accumulates bytes into fixed-size chunks and hands them over a
//! bounded channel, so a producer can never run more than `depth` chunks
//! ahead of its consumer. Dropping the reader disconnects the channel and the
//! producer's next send fails with `BrokenPipe`.

use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, SyncSender};

type Chunk = io::Result<Vec<u8>>;

/// Create a pipe holding at most `depth` chunks of `chunk_size` bytes.
pub fn pipe(depth: usize, chunk_size: usize) -> (PipeWriter, PipeReader) {
    let chunk_size = chunk_size.max(1);
    let (sender, receiver) = mpsc::sync_channel(depth);
    (
        PipeWriter {
            sender: Some(sender),
            buffer: Vec::with_capacity(chunk_size),
            chunk_size,
            disconnected: false,
        },
        PipeReader {
            receiver,
            current: Vec::new(),
            position: 0,
            finished: false,
            failure: None,
        },
    )
}

/// Producer end of a [`pipe`].
pub struct PipeWriter {
    sender: Option<SyncSender<Chunk>>,
    buffer: Vec<u8>,
    chunk_size: usize,
    disconnected: bool,
}

impl PipeWriter {
    /// True once a send has failed because the reader was dropped.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// End the stream.
    ///
    /// Buffered bytes are delivered first. With `Some(error)` the reader's
    /// read after the last byte returns that error instead of EOF. Writes
    /// after closing fail with `BrokenPipe`.
    pub fn close_with_error(&mut self, error: Option<io::Error>) -> io::Result<()> {
        let result = self.flush_buffer().and_then(|()| match error {
            Some(error) => self.send(Err(error)),
            None => Ok(()),
        });
        self.sender = None;
        result
    }

    fn send(&mut self, chunk: Chunk) -> io::Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "pipe already closed"))?;
        if sender.send(chunk).is_err() {
            self.disconnected = true;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed"));
        }
        Ok(())
    }

    fn flush_buffer(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_size));
        self.send(Ok(chunk))
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let room = self.chunk_size - self.buffer.len();
        let n = room.min(buf.len());
        self.buffer.extend_from_slice(&buf[..n]);
        if self.buffer.len() >= self.chunk_size {
            self.flush_buffer()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer()
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        if self.sender.is_some() {
            // Never let an abandoned writer look like a clean EOF.
            let _ = self.send(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "pipe writer dropped before closing",
            )));
        }
    }
}

/// Consumer end of a [`pipe`].
pub struct PipeReader {
    receiver: Receiver<Chunk>,
    current: Vec<u8>,
    position: usize,
    finished: bool,
    failure: Option<(io::ErrorKind, String)>,
}

impl PipeReader {
    /// Release the consumer end before EOF.
    pub fn close(self) {}
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.position < self.current.len() {
                let available = &self.current[self.position..];
                let n = available.len().min(buf.len());
                buf[..n].copy_from_slice(&available[..n]);
                self.position += n;
                return Ok(n);
            }
            if let Some((kind, message)) = &self.failure {
                return Err(io::Error::new(*kind, message.clone()));
            }
            if self.finished {
                return Ok(0);
            }
            match self.receiver.recv() {
                Ok(Ok(chunk)) => {
                    self.current = chunk;
                    self.position = 0;
                }
                Ok(Err(error)) => {
                    self.failure = Some((error.kind(), error.to_string()));
                    return Err(error);
                }
                Err(_) => self.finished = true,
            }
        }
    }
}
