//! Opening dump inputs with transparent decompression.
//!
//! The first bytes of the input decide how it is read: gzip (`1f 8b`) and
//! bzip2 (`BZh`) streams are wrapped in the matching multi-member decoder,
//! anything else is read as-is. Files are rewound after sniffing; stdin
//! cannot seek, so the sniffed prefix is chained back in front of it.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use log::info;

use crate::errors::{FanoutError, Result};

/// Buffer size for reading dump inputs.
pub const IO_BUFFER_SIZE: usize = 256 * 1024;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";
const MAGIC_LEN: usize = 3;

/// Compression format of an input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
}

impl Compression {
    /// Identify the format from the leading bytes of a stream.
    #[must_use]
    pub fn detect(magic: &[u8]) -> Self {
        if magic.starts_with(GZIP_MAGIC) {
            Self::Gzip
        } else if magic.starts_with(BZIP2_MAGIC) {
            Self::Bzip2
        } else {
            Self::None
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "uncompressed"),
            Self::Gzip => write!(f, "gzip"),
            Self::Bzip2 => write!(f, "bzip2"),
        }
    }
}

/// Check if a path refers to stdin (`-` or `/dev/stdin`).
///
/// ```
/// use wikifan_lib::input::is_stdin_path;
///
/// assert!(is_stdin_path("-"));
/// assert!(is_stdin_path("/dev/stdin"));
/// assert!(!is_stdin_path("enwiki.xml.bz2"));
/// ```
pub fn is_stdin_path<P: AsRef<Path>>(path: P) -> bool {
    let path_str = path.as_ref().to_string_lossy();
    path_str == "-" || path_str == "/dev/stdin"
}

/// Read up to three bytes, stopping early only at end of input.
fn read_magic<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut magic = Vec::with_capacity(MAGIC_LEN);
    reader.by_ref().take(MAGIC_LEN as u64).read_to_end(&mut magic)?;
    Ok(magic)
}

/// Wrap a positioned-at-start reader in the decoder for `compression`.
pub fn wrap_stream<R: Read + Send + 'static>(
    reader: R,
    compression: Compression,
) -> Box<dyn BufRead + Send> {
    match compression {
        Compression::None => Box::new(BufReader::with_capacity(IO_BUFFER_SIZE, reader)),
        Compression::Gzip => Box::new(BufReader::with_capacity(
            IO_BUFFER_SIZE,
            MultiGzDecoder::new(BufReader::new(reader)),
        )),
        Compression::Bzip2 => Box::new(BufReader::with_capacity(
            IO_BUFFER_SIZE,
            MultiBzDecoder::new(BufReader::new(reader)),
        )),
    }
}

/// Sniff a seekable reader, rewind it and wrap it.
///
/// # Errors
///
/// Returns an I/O error if the magic bytes cannot be read and
/// [`FanoutError::Rewind`] if the reader cannot be moved back to the start.
pub fn sniff_seekable<R: Read + Seek + Send + 'static>(
    mut reader: R,
) -> Result<(Compression, Box<dyn BufRead + Send>)> {
    let compression = Compression::detect(&read_magic(&mut reader)?);
    reader.seek(SeekFrom::Start(0)).map_err(FanoutError::Rewind)?;
    Ok((compression, wrap_stream(reader, compression)))
}

/// Sniff a non-seekable reader by replaying the consumed prefix.
///
/// # Errors
///
/// Returns an I/O error if the magic bytes cannot be read.
pub fn sniff_stream<R: Read + Send + 'static>(
    mut reader: R,
) -> Result<(Compression, Box<dyn BufRead + Send>)> {
    let magic = read_magic(&mut reader)?;
    let compression = Compression::detect(&magic);
    Ok((compression, wrap_stream(Cursor::new(magic).chain(reader), compression)))
}

/// Open a dump file, or stdin for `-`, with compression detection.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read, or cannot be
/// rewound after sniffing.
pub fn open_input<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();
    let (compression, reader) = if is_stdin_path(path) {
        sniff_stream(io::stdin())?
    } else {
        let file = File::open(path).map_err(|e| FanoutError::InvalidFileFormat {
            file_type: "Input dump".to_string(),
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        sniff_seekable(file)?
    };
    info!("Reading {} ({compression})", path.display());
    Ok(reader)
}
