//! In-memory tar archives for uploading files into a container
//!
//! The Docker upload endpoint only accepts a tar stream, so every injected
//! file is wrapped in a single-entry archive first. Each stage reports its own
//! error so a broken upload can be traced to header, payload or trailer.

use std::io::{self, Read, Write};

use tar::{Builder, EntryType, Header};
use thiserror::Error;

/// Size of one tar block
const BLOCK_SIZE: usize = 512;

/// Permission bits for injected files
const DEFAULT_MODE: u32 = 0o644;

/// Errors raised while building an archive
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("invalid archive entry name {0:?}")]
    InvalidName(String),

    #[error("failed write file header to tar: {0}")]
    Header(#[source] io::Error),

    #[error("failed to copy file to tar: {0}")]
    Payload(#[source] io::Error),

    #[error("failed to close tar: {0}")]
    Finish(#[source] io::Error),
}

/// Reader handed to `tar::Builder` that records whether the payload was
/// touched. The builder writes every header block before its first read.
struct PayloadReader<R> {
    inner: io::Take<R>,
    started: bool,
    copied: u64,
}

impl<R: Read> Read for PayloadReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.started = true;
        let n = self.inner.read(buf)?;
        self.copied += n as u64;
        Ok(n)
    }
}

/// Streaming writer for a tar archive holding regular files.
///
/// Ownership, permission bits and timestamps are fixed defaults; only the
/// entry name and exact length are taken from the caller. Names longer than
/// the 100 byte header field get a GNU long-name entry.
pub struct ArchiveBuilder<W: Write> {
    inner: Builder<W>,
}

impl<W: Write> ArchiveBuilder<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Builder::new(inner),
        }
    }

    /// Append `name` holding exactly `size` bytes read from `payload`.
    pub fn append_file<R: Read>(
        &mut self,
        name: &str,
        size: u64,
        payload: R,
    ) -> Result<(), ArchiveError> {
        validate_entry_name(name)?;

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(size);
        header.set_mode(DEFAULT_MODE);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(0);

        let mut reader = PayloadReader {
            inner: payload.take(size),
            started: false,
            copied: 0,
        };
        match self.inner.append_data(&mut header, name, &mut reader) {
            Ok(()) if reader.copied == size => Ok(()),
            Ok(()) => Err(ArchiveError::Payload(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("payload ended after {} of {} bytes", reader.copied, size),
            ))),
            Err(e) if reader.started => Err(ArchiveError::Payload(e)),
            Err(e) => Err(ArchiveError::Header(e)),
        }
    }

    /// Append the end-of-archive marker and hand back the writer.
    pub fn finish(self) -> Result<W, ArchiveError> {
        let mut inner = self.inner.into_inner().map_err(ArchiveError::Finish)?;
        inner.flush().map_err(ArchiveError::Finish)?;
        Ok(inner)
    }
}

/// Build a complete archive containing one file called `name`.
pub fn single_file_archive(name: &str, payload: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let mut builder = ArchiveBuilder::new(Vec::with_capacity(payload.len() + BLOCK_SIZE * 6));
    builder.append_file(name, payload.len() as u64, payload)?;
    builder.finish()
}

/// Entry names are bare file names; the upload destination supplies the directory.
fn validate_entry_name(name: &str) -> Result<(), ArchiveError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(ArchiveError::InvalidName(name.to_string()));
    }
    Ok(())
}
