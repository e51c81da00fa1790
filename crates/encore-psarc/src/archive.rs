//! PSARC archive reader.
//!
//! Opening an archive decrypts and parses the whole table of contents up
//! front and resolves every entry's name from the name list in entry 0. Entry
//! contents are decoded on demand by walking the entry's chunks through the
//! chunk-size table.

use std::fs::File;
use std::ops::Deref;
use std::path::Path;

use encore_common::memchr::memchr_iter;
use encore_common::BinaryReader;
use memmap2::Mmap;
use tracing::{debug, trace, warn};

use crate::cipher::BlockCipher;
use crate::entry::PsarcEntry;
use crate::header::{ArchiveFlags, ArchiveHeader, HEADER_SIZE};
use crate::inflate;
use crate::options::ArchiveOptions;
use crate::toc::{self, ChunkSizeTable};
use crate::{Error, Result};

/// Raw archive bytes, owned or memory-mapped.
enum Source {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl Deref for Source {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        match self {
            Source::Owned(data) => data,
            Source::Mapped(mmap) => mmap,
        }
    }
}

/// A parsed song package.
///
/// Entry contents are decoded from the underlying bytes on each read; nothing
/// is cached. Reads take `&self`, so one archive can serve many threads.
pub struct PsarcArchive {
    /// Archive bytes
    data: Source,
    /// Archive file name
    name: String,
    header: ArchiveHeader,
    chunks: ChunkSizeTable,
    /// Entry 0, the name list
    manifest: PsarcEntry,
    /// Named entries in TOC order
    entries: Vec<PsarcEntry>,
}

impl PsarcArchive {
    /// Memory-map and parse an archive with default options.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, ArchiveOptions::default())
    }

    /// Memory-map and parse an archive.
    pub fn open_with<P: AsRef<Path>>(path: P, options: ArchiveOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        // The mapping is read-only; the file must not be truncated while open.
        let mmap = unsafe { Mmap::map(&file)? };

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Self::parse(Source::Mapped(mmap), name, &options)
    }

    /// Parse an archive held in memory with default options.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with(data, ArchiveOptions::default())
    }

    /// Parse an archive held in memory.
    pub fn from_bytes_with(data: Vec<u8>, options: ArchiveOptions) -> Result<Self> {
        Self::parse(Source::Owned(data), "memory".to_string(), &options)
    }

    /// Get the archive name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the parsed header.
    #[inline]
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    #[inline]
    pub fn flags(&self) -> ArchiveFlags {
        self.header.archive_flags()
    }

    /// Get the chunk-size table shared by all entries.
    #[inline]
    pub fn chunk_table(&self) -> &ChunkSizeTable {
        &self.chunks
    }

    /// Get the name-list entry.
    #[inline]
    pub fn manifest(&self) -> &PsarcEntry {
        &self.manifest
    }

    /// Get the named entries, name list excluded.
    #[inline]
    pub fn entries(&self) -> &[PsarcEntry] {
        &self.entries
    }

    /// Get the number of named entries.
    #[inline]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &PsarcEntry> + '_ {
        self.entries.iter()
    }

    /// Get entry by index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&PsarcEntry> {
        self.entries.get(index)
    }

    /// Find an entry by exact name, ignoring case when the archive says so.
    pub fn find(&self, name: &str) -> Option<&PsarcEntry> {
        let ignore_case = self.flags().ignore_case();
        self.entries.iter().find(|e| {
            if ignore_case {
                e.name().eq_ignore_ascii_case(name)
            } else {
                e.name() == name
            }
        })
    }

    /// Find the first entry whose name ends with `suffix` (ASCII case-insensitive).
    pub fn find_suffix(&self, suffix: &str) -> Option<&PsarcEntry> {
        self.entries
            .iter()
            .find(|e| ends_with_ignore_case(e.name(), suffix))
    }

    /// All entries whose name ends with `suffix` (ASCII case-insensitive).
    pub fn entries_with_suffix<'a>(
        &'a self,
        suffix: &'a str,
    ) -> impl Iterator<Item = &'a PsarcEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| ends_with_ignore_case(e.name(), suffix))
    }

    /// Decode an entry's contents.
    pub fn read(&self, entry: &PsarcEntry) -> Result<Vec<u8>> {
        let length = self.checked_length(entry)?;
        let mut output = vec![0u8; length];
        self.decode_into(entry, &mut output)?;
        Ok(output)
    }

    /// Decode an entry into `buffer`, returning the number of bytes written.
    ///
    /// Fails before decoding anything when `buffer` is shorter than the
    /// entry's declared length.
    pub fn read_into(&self, entry: &PsarcEntry, buffer: &mut [u8]) -> Result<usize> {
        let length = self.checked_length(entry)?;
        if buffer.len() < length {
            return Err(Error::BufferTooSmall {
                needed: entry.length(),
                available: buffer.len(),
            });
        }
        self.decode_into(entry, &mut buffer[..length])?;
        Ok(length)
    }

    /// Decode entry by index.
    pub fn read_index(&self, index: usize) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| Error::EntryNotFound(format!("index {index}")))?;
        self.read(entry)
    }

    /// Decode an entry by name.
    pub fn read_name(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .find(name)
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))?;
        self.read(entry)
    }

    /// Parallel extraction of multiple entries.
    #[cfg(feature = "parallel")]
    pub fn read_parallel(&self, entries: &[&PsarcEntry]) -> Vec<Result<Vec<u8>>> {
        use rayon::prelude::*;

        entries.par_iter().map(|entry| self.read(entry)).collect()
    }

    /// Parallel extraction with callback for streaming.
    ///
    /// A failed entry is handed to the callback like any other; only an
    /// out-of-range index stops the walk.
    #[cfg(feature = "parallel")]
    pub fn extract_parallel<F>(&self, indices: &[usize], mut callback: F) -> Result<()>
    where
        F: FnMut(usize, &PsarcEntry, Result<Vec<u8>>) + Send,
    {
        use parking_lot::Mutex;
        use rayon::prelude::*;

        let callback = Mutex::new(&mut callback);

        indices.par_iter().try_for_each(|&idx| {
            let entry = self
                .entries
                .get(idx)
                .ok_or_else(|| Error::EntryNotFound(format!("index {idx}")))?;

            let result = self.read(entry);
            let mut callback = callback.lock();
            (*callback)(idx, entry, result);
            Ok(())
        })
    }

    // Internal methods

    fn parse(data: Source, name: String, options: &ArchiveOptions) -> Result<Self> {
        let bytes: &[u8] = &data;

        if bytes.len() < HEADER_SIZE {
            return Err(truncated("header", 0, HEADER_SIZE, bytes));
        }
        let header: ArchiveHeader = BinaryReader::new(bytes).read_struct()?;
        header.validate()?;

        debug!(
            archive = %name,
            version = %format_args!("{}.{}", header.version_major(), header.version_minor()),
            compression = %header.compression_method(),
            toc_length = header.toc_length.get(),
            toc_entry_size = header.toc_entry_size.get(),
            num_files = header.num_files.get(),
            block_size = header.block_size.get(),
            flags = header.flags.get(),
            "parsed archive header"
        );

        let toc_end = header.toc_length.get() as usize;
        let encrypted = bytes.get(HEADER_SIZE..toc_end).ok_or_else(|| {
            truncated(
                "table of contents",
                HEADER_SIZE as u64,
                toc_end - HEADER_SIZE,
                bytes,
            )
        })?;

        let mut cipher = BlockCipher::with_iv(&options.toc_key, &options.toc_iv)?;
        let toc = toc::decrypt(&mut cipher, encrypted)?;

        let num_files = header.num_files.get() as usize;
        let stride = header.toc_entry_size.get() as usize;
        let records = toc::parse_records(&toc, num_files, stride)?;

        let chunks =
            ChunkSizeTable::parse(&toc[num_files * stride..], header.chunk_size_width()?)?;

        let manifest = PsarcEntry::from_record(String::new(), &records[0]);
        let block_size = header.block_size.get() as usize;

        let mut listing = vec![0u8; checked_length(&chunks, block_size, &manifest)?];
        decode_chunks(bytes, &chunks, block_size, &manifest, &mut listing)?;
        let mut names = split_names(&listing)?;

        let expected = num_files - 1;
        if names.len() < expected {
            if options.strict_names {
                return Err(Error::NameCountMismatch {
                    expected,
                    actual: names.len(),
                });
            }
            warn!(
                expected,
                actual = names.len(),
                "name list is short, naming the remaining entries by index"
            );
            names.extend((names.len()..expected).map(|i| format!("unnamed_{:05}", i + 1)));
        } else if names.len() > expected {
            debug!(extra = names.len() - expected, "ignoring surplus names");
        }

        let entries: Vec<PsarcEntry> = records[1..]
            .iter()
            .zip(names)
            .map(|(record, name)| PsarcEntry::from_record(name, record))
            .collect();

        if options.verify_name_hashes {
            if let Some(bad) = entries.iter().find(|e| !e.name_hash_matches()) {
                return Err(Error::NameHashMismatch(bad.name().to_string()));
            }
        }

        debug!(entries = entries.len(), chunks = chunks.len(), "resolved entry names");

        Ok(Self {
            data,
            name,
            header,
            chunks,
            manifest,
            entries,
        })
    }

    #[inline]
    fn block_size(&self) -> usize {
        self.header.block_size.get() as usize
    }

    #[inline]
    fn checked_length(&self, entry: &PsarcEntry) -> Result<usize> {
        checked_length(&self.chunks, self.block_size(), entry)
    }

    #[inline]
    fn decode_into(&self, entry: &PsarcEntry, output: &mut [u8]) -> Result<()> {
        decode_chunks(&self.data, &self.chunks, self.block_size(), entry, output)
    }
}

impl std::fmt::Debug for PsarcArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PsarcArchive")
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

/// Walk an entry's chunks, filling `output` (exactly the entry's length).
///
/// Each chunk is one of:
/// - size 0: stored at the full block size, copied up to what is left;
/// - starts with a zlib header: decoded on its own;
/// - anything else: copied verbatim, recorded size bytes.
fn decode_chunks(
    data: &[u8],
    chunks: &ChunkSizeTable,
    block_size: usize,
    entry: &PsarcEntry,
    output: &mut [u8],
) -> Result<()> {
    let length = output.len();
    let mut written = 0usize;
    let mut index = entry.zindex() as usize;
    let mut offset = entry.offset();

    trace!(
        entry = entry.name(),
        length,
        zindex = index,
        offset,
        "decoding entry"
    );

    while written < length {
        let size = chunks.get(index).ok_or(Error::ChunkTableOverrun {
            index,
            len: chunks.len(),
        })? as usize;
        let remaining = length - written;

        if size == 0 {
            let take = remaining.min(block_size);
            let src = region(data, offset, take, "stored chunk")?;
            output[written..written + take].copy_from_slice(src);
            trace!(chunk = index, offset, bytes = take, "stored chunk");
            written += take;
            offset += block_size as u64;
        } else {
            let src = region(data, offset, size, "compressed chunk")?;

            if is_chunk_marker(src) {
                let inflated = inflate::inflate(src, &mut output[written..])
                    .map_err(|source| Error::Inflate { chunk: index, source })?;
                if inflated.size > remaining {
                    return Err(Error::OutputOverflow {
                        chunk: index,
                        produced: inflated.size,
                        remaining,
                    });
                }
                trace!(chunk = index, offset, size, bytes = inflated.size, "zlib chunk");
                written += inflated.size;
            } else {
                if size > remaining {
                    return Err(Error::OutputOverflow {
                        chunk: index,
                        produced: size,
                        remaining,
                    });
                }
                output[written..written + size].copy_from_slice(src);
                trace!(chunk = index, offset, size, "raw chunk");
                written += size;
            }
            offset += size as u64;
        }

        index += 1;
    }

    Ok(())
}

/// Split the name list into lines. A trailing newline does not start
/// another name, and `\r` line endings are tolerated.
fn split_names(listing: &[u8]) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut start = 0;

    let ends = memchr_iter(b'\n', listing).chain(
        (listing.last().is_some_and(|&b| b != b'\n')).then_some(listing.len()),
    );

    for end in ends {
        let line = &listing[start..end];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let name = std::str::from_utf8(line).map_err(encore_common::Error::from)?;
        names.push(name.to_string());
        start = end + 1;
    }

    Ok(names)
}

/// Whether a compressed chunk starts with one of the zlib headers an encoder
/// writes: deflate with a 32 KiB window, no preset dictionary, any level.
/// Other valid headers such as `H\r` are left to the raw-copy path so short
/// text tails are not mistaken for zlib streams.
#[inline]
fn is_chunk_marker(chunk: &[u8]) -> bool {
    matches!(chunk, [0x78, 0x01 | 0x5E | 0x9C | 0xDA, ..])
}

#[inline]
fn ends_with_ignore_case(name: &str, suffix: &str) -> bool {
    name.len() >= suffix.len()
        && name.as_bytes()[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
}

/// Declared length of `entry`, refused up front when the chunks left in the
/// table could not possibly hold it.
fn checked_length(chunks: &ChunkSizeTable, block_size: usize, entry: &PsarcEntry) -> Result<usize> {
    let zindex = entry.zindex() as usize;
    let capacity = chunks.len().saturating_sub(zindex) as u64 * block_size as u64;
    if entry.length() > capacity {
        return Err(Error::ChunkTableOverrun {
            index: zindex.max(chunks.len()),
            len: chunks.len(),
        });
    }
    usize::try_from(entry.length()).map_err(|_| Error::BufferTooSmall {
        needed: entry.length(),
        available: usize::MAX,
    })
}

fn region<'a>(data: &'a [u8], offset: u64, len: usize, what: &'static str) -> Result<&'a [u8]> {
    usize::try_from(offset)
        .ok()
        .and_then(|start| data.get(start..start.checked_add(len)?))
        .ok_or_else(|| truncated(what, offset, len, data))
}

#[inline]
fn truncated(what: &'static str, offset: u64, needed: usize, data: &[u8]) -> Error {
    Error::Truncated {
        what,
        offset,
        needed: needed as u64,
        available: data.len() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_names() {
        assert_eq!(split_names(b"file.txt\n").unwrap(), vec!["file.txt"]);
        assert_eq!(split_names(b"a\r\nb\r\nc").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(split_names(b"a\n\nc\n").unwrap(), vec!["a", "", "c"]);
        assert!(split_names(b"").unwrap().is_empty());
        assert!(split_names(b"ok\n\xFF\xFE\n").is_err());
    }

    #[test]
    fn test_suffix_match() {
        assert!(ends_with_ignore_case("songs/bin/generic/song_lead.sng", "_lead.SNG"));
        assert!(!ends_with_ignore_case("sng", "lead.sng"));
        assert!(ends_with_ignore_case("anything", ""));
    }

    #[test]
    fn test_region_bounds() {
        let data = [1u8, 2, 3, 4];
        assert_eq!(region(&data, 1, 3, "test").unwrap(), &[2, 3, 4]);
        assert!(matches!(
            region(&data, 2, 3, "test"),
            Err(Error::Truncated {
                offset: 2,
                needed: 3,
                available: 4,
                ..
            })
        ));
        assert!(region(&data, u64::MAX, 1, "test").is_err());
    }

    fn chunk_table(sizes: &[u16]) -> ChunkSizeTable {
        let bytes: Vec<u8> = sizes.iter().flat_map(|s| s.to_be_bytes()).collect();
        ChunkSizeTable::parse(&bytes, 2).unwrap()
    }

    fn entry(zindex: u32, length: u64, offset: u64) -> PsarcEntry {
        let record = toc::TocRecord {
            hash: [0; 16],
            zindex,
            length,
            offset,
        };
        PsarcEntry::from_record("test".to_string(), &record)
    }

    #[test]
    fn test_stored_chunk_uses_block_stride() {
        // Two stored chunks with a 4-byte block size, then a raw tail.
        let data = b"abcdefghXY";
        let chunks = chunk_table(&[0, 0, 2]);
        let mut out = vec![0u8; 10];
        decode_chunks(data, &chunks, 4, &entry(0, 10, 0), &mut out).unwrap();
        assert_eq!(&out, b"abcdefghXY");
    }

    #[test]
    fn test_chunk_table_overrun() {
        let chunks = chunk_table(&[0]);
        let mut out = vec![0u8; 8];
        assert!(matches!(
            decode_chunks(&[0u8; 8], &chunks, 4, &entry(0, 8, 0), &mut out),
            Err(Error::ChunkTableOverrun { index: 1, len: 1 })
        ));
    }

    #[test]
    fn test_raw_chunk_larger_than_remaining() {
        let chunks = chunk_table(&[6]);
        let mut out = vec![0u8; 4];
        assert!(matches!(
            decode_chunks(b"abcdef", &chunks, 65536, &entry(0, 4, 0), &mut out),
            Err(Error::OutputOverflow {
                chunk: 0,
                produced: 6,
                remaining: 4
            })
        ));
    }

    #[test]
    fn test_length_checked_against_chunk_capacity() {
        let chunks = chunk_table(&[0, 0, 0]);
        assert_eq!(checked_length(&chunks, 4, &entry(1, 8, 0)).unwrap(), 8);
        assert!(matches!(
            checked_length(&chunks, 4, &entry(1, 9, 0)),
            Err(Error::ChunkTableOverrun { index: 3, len: 3 })
        ));
        assert!(matches!(
            checked_length(&chunks, 4, &entry(7, 1 << 39, 0)),
            Err(Error::ChunkTableOverrun { index: 7, len: 3 })
        ));
        assert_eq!(checked_length(&chunks, 4, &entry(7, 0, 0)).unwrap(), 0);
    }

    #[test]
    fn test_chunk_marker() {
        assert!(is_chunk_marker(&[0x78, 0x9C, 0x03, 0x00]));
        assert!(is_chunk_marker(&[0x78, 0x01]));
        assert!(is_chunk_marker(&[0x78, 0x5E]));
        assert!(is_chunk_marker(&[0x78, 0xDA]));
        // Valid zlib headers that encoders never emit for chunks.
        assert!(inflate::is_zlib_header(b'H', b'\r'));
        assert!(!is_chunk_marker(b"H\r\n"));
        assert!(!is_chunk_marker(&[0x78, 0xBB]));
        assert!(!is_chunk_marker(&[0x78]));
        assert!(!is_chunk_marker(&[]));
    }

    #[test]
    fn test_raw_tail_resembling_zlib_header() {
        let data = b"H\r\nab";
        let chunks = chunk_table(&[5]);
        let mut out = vec![0u8; 5];
        decode_chunks(data, &chunks, 65536, &entry(0, 5, 0), &mut out).unwrap();
        assert_eq!(&out, data);
    }

    #[test]
    fn test_zero_length_entry_reads_nothing() {
        let chunks = ChunkSizeTable::default();
        let mut out = [0u8; 0];
        decode_chunks(&[], &chunks, 65536, &entry(5, 0, 999), &mut out).unwrap();
    }
}
