//! Lua cache decoder.
//!
//! Cache directories mix three on-disk shapes: plain script text, zlib
//! streams (bare, or behind the 4-byte length prefix the engine writes in
//! front of cached Lua), and compiled binary chunks whose string table still
//! carries the asset paths we want. `decode` classifies the bytes and
//! normalizes all three to text; decompression runs under a hard output cap
//! so a hostile payload cannot balloon a worker.

use crate::services::ScanError;
use flate2::read::ZlibDecoder;
use std::io::Read;

/// How many leading bytes are examined for the plain-text check.
const TEXT_PROBE_LEN: usize = 4096;
/// Minimum printable run kept by binary string-table extraction.
const MIN_RUN_LEN: usize = 4;

const SCRIPT_MARKERS: &[&str] = &["SWEP", "function", "local ", "--", "end", "include", " = "];

/// On-disk shape the decoder recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFormat {
    /// Readable script source, passed through unchanged.
    PlainText,
    /// Zlib stream, bare or behind a 4-byte length prefix.
    CompressedPayload,
    /// Compiled binary chunk; only its printable string runs are kept.
    BinaryTable,
}

/// Normalized text plus the shape it was recovered from.
#[derive(Debug, Clone)]
pub struct DecodedSource {
    pub text: String,
    pub format: CacheFormat,
}

/// Classifies raw cache bytes and normalizes them to scannable text.
pub struct CacheDecoder {
    max_decompressed_bytes: u64,
}

impl CacheDecoder {
    pub fn new(max_decompressed_bytes: u64) -> Self {
        Self {
            max_decompressed_bytes,
        }
    }

    /// Decode one file's bytes.
    ///
    /// Detection order: plain script text, then a zlib magic at offset 0 or
    /// 4, then binary string-table extraction. Bytes that fit none of the
    /// three yield [`ScanError::UnknownFormat`]; a bad or cap-exceeding
    /// compressed stream yields [`ScanError::CorruptPayload`]. Both are
    /// per-file outcomes the caller records without aborting the scan.
    pub fn decode(&self, data: &[u8]) -> Result<DecodedSource, ScanError> {
        if data.is_empty() {
            return Err(ScanError::UnknownFormat);
        }

        if is_plain_script(data) {
            return Ok(DecodedSource {
                text: String::from_utf8_lossy(data).into_owned(),
                format: CacheFormat::PlainText,
            });
        }

        if let Some(offset) = zlib_offset(data) {
            let text = self.decompress(&data[offset..])?;
            return Ok(DecodedSource {
                text,
                format: CacheFormat::CompressedPayload,
            });
        }

        let runs = printable_runs(data);
        if runs.is_empty() {
            return Err(ScanError::UnknownFormat);
        }
        Ok(DecodedSource {
            text: runs.join("\n"),
            format: CacheFormat::BinaryTable,
        })
    }

    fn decompress(&self, stream: &[u8]) -> Result<String, ScanError> {
        let mut decoder = ZlibDecoder::new(stream).take(self.max_decompressed_bytes + 1);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| ScanError::CorruptPayload(e.to_string()))?;
        if out.len() as u64 > self.max_decompressed_bytes {
            return Err(ScanError::CorruptPayload(format!(
                "decompressed output exceeds {} byte cap",
                self.max_decompressed_bytes
            )));
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

/// Plain script text: no NUL in the probe window and at least one Lua marker.
fn is_plain_script(data: &[u8]) -> bool {
    let probe = &data[..data.len().min(TEXT_PROBE_LEN)];
    if probe.contains(&0) {
        return false;
    }
    let text = String::from_utf8_lossy(probe);
    SCRIPT_MARKERS.iter().any(|m| text.contains(m))
}

/// Position of a zlib magic, checked bare and behind the length prefix.
fn zlib_offset(data: &[u8]) -> Option<usize> {
    for offset in [0usize, 4] {
        if let Some(window) = data.get(offset..offset + 2) {
            if window[0] == 0x78 && matches!(window[1], 0x01 | 0x5e | 0x9c | 0xda) {
                return Some(offset);
            }
        }
    }
    None
}

fn printable_runs(data: &[u8]) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();
    for &b in data {
        if (0x20..0x7f).contains(&b) {
            current.push(b as char);
        } else {
            if current.len() >= MIN_RUN_LEN {
                runs.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }
    if current.len() >= MIN_RUN_LEN {
        runs.push(current);
    }
    runs
}
