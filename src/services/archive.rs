//! GMA addon archive reader.
//!
//! Garry's Mod addon archives bundle many named entries behind a small
//! header and a sequential entry index:
//!
//! ```text
//! "GMAD" | version u8 | steamid u64 LE | timestamp u64 LE
//! [version > 1: required-content C-strings until an empty one]
//! name C-string | description C-string | author C-string | addon version i32
//! repeated: file number u32 (0 terminates) | name C-string | size i64 | crc u32
//! entry bodies, laid out sequentially in index order
//! ```
//!
//! The reader parses the index strictly first. If the index is damaged it
//! falls back to a best-effort linear scan for entry-header shapes; entries
//! whose bodies fall outside the file are skipped and counted rather than
//! failing the whole archive.

use crate::services::ScanError;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

const GMA_MAGIC: &[u8; 4] = b"GMAD";
/// Fixed bytes before the metadata strings: magic + version + steamid + timestamp.
const FIXED_HEADER_LEN: usize = 4 + 1 + 8 + 8;
const MAX_ENTRY_NAME_LEN: usize = 255;

/// Name and size of one archive entry, as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDescriptor {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    size: u64,
    offset: usize,
}

/// Reader over one GMA addon archive.
///
/// The archive is read into memory once at `open`; `read_entry` hands out
/// slices of that buffer, so repeated reads are cheap and restartable.
pub struct ArchiveReader {
    path: Utf8PathBuf,
    data: Vec<u8>,
    entries: Vec<Entry>,
    recovered_via_fallback: bool,
    skipped_entries: u64,
}

impl ArchiveReader {
    /// Open an archive and parse its entry index.
    ///
    /// A damaged index triggers the linear fallback scan. Only a missing
    /// magic or an index that yields no recoverable entries at all is fatal.
    pub fn open(path: &Utf8Path) -> Result<Self, ScanError> {
        let data = fs::read(path)?;
        Self::from_bytes(path.to_path_buf(), data)
    }

    pub fn from_bytes(path: Utf8PathBuf, data: Vec<u8>) -> Result<Self, ScanError> {
        if data.len() < FIXED_HEADER_LEN || &data[0..4] != GMA_MAGIC {
            return Err(ScanError::ArchiveCorrupt(format!(
                "{path}: missing GMAD magic"
            )));
        }

        match parse_index_strict(&data) {
            Ok(entries) => Ok(Self {
                path,
                data,
                entries,
                recovered_via_fallback: false,
                skipped_entries: 0,
            }),
            Err(err) => {
                tracing::warn!(
                    "Index parse failed for {} ({}), attempting linear fallback scan",
                    path,
                    err
                );
                let (entries, skipped) = scan_index_fallback(&data)?;
                tracing::info!(
                    "Recovered {} entries from {} via fallback ({} skipped)",
                    entries.len(),
                    path,
                    skipped
                );
                Ok(Self {
                    path,
                    data,
                    entries,
                    recovered_via_fallback: true,
                    skipped_entries: skipped,
                })
            }
        }
    }

    /// Lazy, restartable sequence of entry descriptors.
    pub fn list_entries(&self) -> impl Iterator<Item = EntryDescriptor> + '_ {
        self.entries.iter().map(|e| EntryDescriptor {
            name: e.name.clone(),
            size: e.size,
        })
    }

    /// Read one entry's bytes by name.
    pub fn read_entry(&self, name: &str) -> Result<&[u8], ScanError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| ScanError::EntryNotFound(name.to_string()))?;

        let end = entry.offset + entry.size as usize;
        self.data
            .get(entry.offset..end)
            .ok_or_else(|| ScanError::ArchiveCorrupt(format!("{}: entry {name} out of bounds", self.path)))
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn recovered_via_fallback(&self) -> bool {
        self.recovered_via_fallback
    }

    /// Entries the fallback scan found but could not place within the file.
    pub fn skipped_entries(&self) -> u64 {
        self.skipped_entries
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ScanError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= self.buf.len())
            .ok_or_else(|| ScanError::ArchiveCorrupt("unexpected end of archive".to_string()))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_u32(&mut self) -> Result<u32, ScanError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_i64(&mut self) -> Result<i64, ScanError> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn skip(&mut self, n: usize) -> Result<(), ScanError> {
        self.take(n).map(|_| ())
    }

    /// Read a NUL-terminated entry name; names must be printable ASCII.
    fn read_name(&mut self) -> Result<String, ScanError> {
        let bytes = self.read_cstring_bytes()?;
        if !bytes.iter().all(|&b| (0x20..0x7f).contains(&b)) {
            return Err(ScanError::ArchiveCorrupt("non-printable entry name".to_string()));
        }
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Read a NUL-terminated metadata string; description and author fields
    /// may carry arbitrary UTF-8.
    fn read_metadata(&mut self) -> Result<String, ScanError> {
        let bytes = self.read_cstring_bytes()?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn read_cstring_bytes(&mut self) -> Result<&'a [u8], ScanError> {
        let buf: &'a [u8] = self.buf;
        let rest = &buf[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| ScanError::ArchiveCorrupt("unterminated string".to_string()))?;
        self.pos += nul + 1;
        Ok(&rest[..nul])
    }
}

fn parse_index_strict(data: &[u8]) -> Result<Vec<Entry>, ScanError> {
    let mut cur = Cursor::new(data, 4);
    let version = cur.take(1)?[0];
    if version == 0 || version > 3 {
        return Err(ScanError::ArchiveCorrupt(format!(
            "unsupported format version {version}"
        )));
    }
    cur.skip(16)?; // steamid + timestamp

    // Required-content strings only exist past version 1.
    if version > 1 {
        loop {
            if cur.read_metadata()?.is_empty() {
                break;
            }
        }
    }

    cur.read_metadata()?; // addon name
    cur.read_metadata()?; // description
    cur.read_metadata()?; // author
    cur.skip(4)?; // addon version

    let mut raw = Vec::new();
    loop {
        let file_number = cur.read_u32()?;
        if file_number == 0 {
            break;
        }
        let name = cur.read_name()?;
        if name.is_empty() || name.len() > MAX_ENTRY_NAME_LEN {
            return Err(ScanError::ArchiveCorrupt("bad entry name".to_string()));
        }
        let size = cur.read_i64()?;
        if size < 0 || size as usize > data.len() {
            return Err(ScanError::ArchiveCorrupt(format!(
                "implausible entry size {size}"
            )));
        }
        cur.skip(4)?; // crc
        raw.push((name, size as u64));
    }

    // Bodies are laid out sequentially right after the index terminator.
    let mut offset = cur.pos;
    let mut entries = Vec::with_capacity(raw.len());
    for (name, size) in raw {
        let end = offset
            .checked_add(size as usize)
            .filter(|&e| e <= data.len())
            .ok_or_else(|| ScanError::ArchiveCorrupt(format!("entry {name} extends past end")))?;
        entries.push(Entry { name, size, offset });
        offset = end;
    }
    Ok(entries)
}

/// Best-effort linear scan for entry-header shapes in a damaged index.
///
/// A candidate record is a u32 file number, a printable path-like
/// NUL-terminated name, a plausible i64 size and a u32 crc. Scanning
/// advances one byte at a time past anything that does not parse. The body
/// region is assumed to start after the 4-byte index terminator slot that
/// follows the last recovered record; entries whose bodies would extend past
/// the end of the file are dropped and counted.
fn scan_index_fallback(data: &[u8]) -> Result<(Vec<Entry>, u64), ScanError> {
    let mut pos = FIXED_HEADER_LEN;
    let mut raw: Vec<(String, u64)> = Vec::new();
    let mut scan_end = pos;

    while pos + 18 <= data.len() {
        let file_number = u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap());
        if file_number == 0 && !raw.is_empty() {
            scan_end = pos;
            break;
        }
        match parse_candidate(data, pos + 4) {
            Some((name, size, end)) => {
                raw.push((name, size));
                scan_end = end;
                pos = end;
            }
            None => pos += 1,
        }
    }

    if raw.is_empty() {
        return Err(ScanError::ArchiveCorrupt(
            "no entries recoverable by linear scan".to_string(),
        ));
    }

    // The index terminator occupies 4 bytes whether or not it survived.
    let mut offset = scan_end + 4;
    let mut entries = Vec::new();
    let mut skipped = 0u64;
    for (name, size) in raw {
        match offset.checked_add(size as usize) {
            Some(end) if end <= data.len() => {
                entries.push(Entry { name, size, offset });
                offset = end;
            }
            _ => {
                tracing::debug!("Dropping unrecoverable entry {name} ({size} bytes)");
                skipped += 1;
                // Later entries cannot be placed either once one body is lost.
                offset = data.len();
            }
        }
    }

    Ok((entries, skipped))
}

fn parse_candidate(data: &[u8], name_start: usize) -> Option<(String, u64, usize)> {
    let rest = data.get(name_start..)?;
    let nul = rest
        .iter()
        .take(MAX_ENTRY_NAME_LEN + 1)
        .position(|&b| b == 0)?;
    if nul == 0 {
        return None;
    }
    let bytes = &rest[..nul];
    if !bytes.iter().all(|&b| (0x20..0x7f).contains(&b)) {
        return None;
    }
    let name = String::from_utf8_lossy(bytes).into_owned();
    // Entry names are relative file paths; require a path-ish shape.
    if !(name.contains('.') || name.contains('/')) {
        return None;
    }

    let size_start = name_start + nul + 1;
    let size_bytes = data.get(size_start..size_start + 8)?;
    let size = i64::from_le_bytes(size_bytes.try_into().unwrap());
    if size <= 0 || size as usize > data.len() {
        return None;
    }
    // Skip the crc.
    let end = size_start + 8 + 4;
    if end > data.len() {
        return None;
    }
    Some((name, size as u64, end))
}
