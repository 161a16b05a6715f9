//! Byte-offset access to plain and gzip-compressed dumps
//!
//! Registries publish most dumps gzipped. Chunk offsets always refer to the
//! decompressed byte stream: a plain file is opened with a seek, a gzip file is
//! decompressed from the start and the first `offset` bytes are discarded.
//!
//! # Examples
//!
//! ```rust,ignore
//! use ipindex_ingest::common::decompression::SourceFile;
//!
//! let source = SourceFile::new("ripe.db.inetnum.gz");
//! let size = source.len()?;
//! let reader = source.open_at(size / 2)?;
//! ```

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Compression of a dump, detected from its file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

impl Compression {
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gz") => Compression::Gzip,
            _ => Compression::None,
        }
    }
}

/// A dump file on local disk
#[derive(Debug, Clone)]
pub struct SourceFile {
    path: PathBuf,
    compression: Compression,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let compression = Compression::detect(&path);
        Self { path, compression }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Length in bytes of the (decompressed) content
    pub fn len(&self) -> io::Result<u64> {
        match self.compression {
            Compression::None => Ok(std::fs::metadata(&self.path)?.len()),
            Compression::Gzip => {
                let mut decoder = MultiGzDecoder::new(BufReader::new(File::open(&self.path)?));
                let len = io::copy(&mut decoder, &mut io::sink())?;
                debug!(path = %self.path.display(), decompressed = len, "Measured gzip dump");
                Ok(len)
            },
        }
    }

    /// Reader positioned at `offset` of the (decompressed) content.
    ///
    /// An offset past the end yields a reader that is already at EOF.
    pub fn open_at(&self, offset: u64) -> io::Result<Box<dyn BufRead + Send>> {
        let file = File::open(&self.path)?;

        match self.compression {
            Compression::None => {
                let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
                reader.seek(SeekFrom::Start(offset))?;
                Ok(Box::new(reader))
            },
            Compression::Gzip => {
                let decoder = MultiGzDecoder::new(BufReader::new(file));
                let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, decoder);
                io::copy(&mut (&mut reader).take(offset), &mut io::sink())?;
                Ok(Box::new(reader))
            },
        }
    }

    /// Reader positioned at `offset`, together with up to `window` bytes of
    /// content right before it
    pub fn open_with_preceding(
        &self,
        offset: u64,
        window: u64,
    ) -> io::Result<(Vec<u8>, Box<dyn BufRead + Send>)> {
        let from = offset.saturating_sub(window);
        let mut reader = self.open_at(from)?;
        let mut preceding = Vec::new();
        reader.by_ref().take(offset - from).read_to_end(&mut preceding)?;
        Ok((preceding, reader))
    }

    /// Forward-only reader over the (decompressed) content, starting at 0
    pub fn open_forward(&self) -> io::Result<ForwardReader> {
        let file = File::open(&self.path)?;
        let inner = match self.compression {
            Compression::None => Forward::Plain(BufReader::with_capacity(READ_BUFFER_SIZE, file)),
            Compression::Gzip => Forward::Gzip(BufReader::with_capacity(
                READ_BUFFER_SIZE,
                MultiGzDecoder::new(BufReader::new(file)),
            )),
        };
        Ok(ForwardReader { inner, position: 0 })
    }
}

enum Forward {
    Plain(BufReader<File>),
    Gzip(BufReader<MultiGzDecoder<BufReader<File>>>),
}

/// Reads lines at increasing offsets in one pass.
///
/// Plain files skip ahead with a seek; gzip streams are decompressed once
/// from start to finish no matter how many offsets are visited.
pub struct ForwardReader {
    inner: Forward,
    position: u64,
}

impl ForwardReader {
    /// Offset of the next byte to be read
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move forward to `offset`; skipping past the end leaves the reader at EOF
    pub fn skip_to(&mut self, offset: u64) -> io::Result<()> {
        if offset < self.position {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot skip back from {} to {offset}", self.position),
            ));
        }
        let gap = offset - self.position;

        match &mut self.inner {
            Forward::Plain(reader) => {
                let gap = i64::try_from(gap)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "skip too large"))?;
                reader.seek_relative(gap)?;
                self.position = offset;
            },
            Forward::Gzip(reader) => {
                self.position += io::copy(&mut reader.by_ref().take(gap), &mut io::sink())?;
            },
        }
        Ok(())
    }

    /// Append the next line, terminator included, to `buf`; returns its length
    pub fn read_line(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        let n = match &mut self.inner {
            Forward::Plain(reader) => reader.read_until(b'\n', buf)?,
            Forward::Gzip(reader) => reader.read_until(b'\n', buf)?,
        };
        self.position += n as u64;
        Ok(n)
    }
}
