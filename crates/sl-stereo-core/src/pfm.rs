//! Portable float map (`Pf`) reader/writer and atomic file publishing.
//!
//! Layout: `Pf\n<width> <height>\n<scale>\n` followed by `width*height` raw
//! `f32` values, bottom row first. A negative scale means little-endian
//! samples. Fields are written little-endian with scale `-1`.

use crate::{ScalarField, INVALID};
use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum PfmError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("not a grayscale PFM (magic {0:?})")]
    BadMagic(String),
    #[error("malformed PFM header: {0}")]
    BadHeader(&'static str),
    #[error("PFM payload too short (expected {expected} bytes, got {got})")]
    Truncated { expected: usize, got: usize },
}

struct HeaderCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> HeaderCursor<'a> {
    fn token(&mut self) -> Option<&'a str> {
        let bytes = self.bytes;
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        let start = self.pos;
        while self.pos < bytes.len() && !bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if start == self.pos {
            return None;
        }
        std::str::from_utf8(&bytes[start..self.pos]).ok()
    }
}

/// Decode a PFM image held in memory.
pub fn decode_pfm(bytes: &[u8]) -> Result<ScalarField, PfmError> {
    let mut cur = HeaderCursor { bytes, pos: 0 };
    let magic = cur.token().ok_or(PfmError::BadHeader("missing magic"))?;
    if magic != "Pf" {
        return Err(PfmError::BadMagic(magic.to_string()));
    }
    let width: usize = cur
        .token()
        .and_then(|t| t.parse().ok())
        .ok_or(PfmError::BadHeader("width"))?;
    let height: usize = cur
        .token()
        .and_then(|t| t.parse().ok())
        .ok_or(PfmError::BadHeader("height"))?;
    let scale: f32 = cur
        .token()
        .and_then(|t| t.parse().ok())
        .ok_or(PfmError::BadHeader("scale"))?;
    if scale == 0.0 || !scale.is_finite() {
        return Err(PfmError::BadHeader("scale"));
    }
    // exactly one whitespace byte separates the header from the payload
    let payload = bytes.get(cur.pos + 1..).unwrap_or(&[]);

    let count = width
        .checked_mul(height)
        .ok_or(PfmError::BadHeader("dimensions overflow"))?;
    let expected = count
        .checked_mul(4)
        .ok_or(PfmError::BadHeader("dimensions overflow"))?;
    if payload.len() < expected {
        return Err(PfmError::Truncated {
            expected,
            got: payload.len(),
        });
    }

    let little_endian = scale < 0.0;
    let mut data = vec![INVALID; count];
    for (i, chunk) in payload[..expected].chunks_exact(4).enumerate() {
        let raw = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let v = if little_endian {
            f32::from_le_bytes(raw)
        } else {
            f32::from_be_bytes(raw)
        };
        let file_row = i / width;
        let x = i % width;
        let y = height - 1 - file_row;
        data[y * width + x] = v;
    }

    let mut field = ScalarField {
        width,
        height,
        data,
    };
    field.normalize_invalid();
    Ok(field)
}

/// Encode a field as little-endian PFM.
pub fn encode_pfm<W: Write + ?Sized>(field: &ScalarField, out: &mut W) -> io::Result<()> {
    write!(out, "Pf\n{} {}\n-1\n", field.width, field.height)?;
    for y in (0..field.height).rev() {
        let row = &field.data[y * field.width..(y + 1) * field.width];
        for v in row {
            out.write_all(&v.to_le_bytes())?;
        }
    }
    Ok(())
}

/// Read a PFM file from disk.
pub fn read_pfm(path: impl AsRef<Path>) -> Result<ScalarField, PfmError> {
    let mut bytes = Vec::new();
    fs::File::open(path)?.read_to_end(&mut bytes)?;
    decode_pfm(&bytes)
}

/// Write a PFM file atomically (see [`write_atomic`]).
pub fn write_pfm(path: impl AsRef<Path>, field: &ScalarField) -> io::Result<()> {
    write_atomic(path.as_ref(), |w| encode_pfm(field, w))
}

/// Write `path` through a temporary sibling file, then rename it into place.
///
/// Readers never observe a partially written file; on error the previous
/// content (if any) is left untouched. Parent directories are created.
pub fn write_atomic(
    path: &Path,
    contents: impl FnOnce(&mut dyn Write) -> io::Result<()>,
) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut w = BufWriter::new(tmp.as_file());
        contents(&mut w)?;
        w.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
