//! In-memory archive builder and zip finalization.
//!
//! Workers insert `(name, bytes)` pairs concurrently through
//! [`ArchiveBuilder::insert`]. Once every fetch has finished the orchestrator
//! takes the entries out and compresses them in one pass with
//! [`finalize_entries`], on the blocking pool.
//!
//! Entry names are not required to be unique. By default a later insert with
//! the same name replaces the earlier bytes (last write wins);
//! [`DuplicateNamePolicy::Suffix`] keeps both by renaming the newcomer to
//! `name (2).ext`, `name (3).ext`, and so on.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

use super::error::ArchiveError;

/// What to do when two attachments map to the same entry name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicateNamePolicy {
    /// Replace the earlier entry.
    #[default]
    LastWriteWins,
    /// Keep both, renaming the later one with a ` (n)` suffix.
    Suffix,
}

#[derive(Debug, Default)]
struct BuilderInner {
    entries: Vec<(String, Vec<u8>)>,
    index: HashMap<String, usize>,
}

/// Shared accumulator of fetched attachments.
#[derive(Debug)]
pub struct ArchiveBuilder {
    policy: DuplicateNamePolicy,
    inner: Mutex<BuilderInner>,
}

impl ArchiveBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(policy: DuplicateNamePolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(BuilderInner::default()),
        }
    }

    /// Adds one entry and returns the name it was stored under.
    pub fn insert(&self, name: &str, bytes: Vec<u8>) -> String {
        let mut inner = self.lock();
        let stored_name = match (inner.index.get(name).copied(), self.policy) {
            (None, _) => name.to_string(),
            (Some(existing), DuplicateNamePolicy::LastWriteWins) => {
                warn!(
                    entry = name,
                    "duplicate archive entry name; replacing earlier attachment"
                );
                inner.entries[existing].1 = bytes;
                return name.to_string();
            }
            (Some(_), DuplicateNamePolicy::Suffix) => {
                let renamed = next_free_name(&inner.index, name);
                debug!(entry = name, renamed = %renamed, "duplicate archive entry name; renaming");
                renamed
            }
        };

        let position = inner.entries.len();
        inner.entries.push((stored_name.clone(), bytes));
        inner.index.insert(stored_name.clone(), position);
        stored_name
    }

    /// Number of distinct entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether nothing has been inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves the accumulated entries out in insertion order.
    ///
    /// Called once, after all workers have finished.
    #[must_use]
    pub fn take_entries(&self) -> Vec<(String, Vec<u8>)> {
        let mut inner = self.lock();
        inner.index.clear();
        std::mem::take(&mut inner.entries)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BuilderInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn next_free_name(index: &HashMap<String, usize>, name: &str) -> String {
    let (stem, ext) = match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    };
    (2usize..)
        .map(|n| format!("{stem} ({n}){ext}"))
        .find(|candidate| !index.contains_key(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// Size and digest of one archived entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySummary {
    /// Entry name inside the archive.
    pub name: String,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// Lowercase hex SHA-256 of the entry bytes.
    pub sha256: String,
}

/// Listing of a finalized archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    /// Entries in archive order.
    pub entries: Vec<EntrySummary>,
}

impl ArchiveSummary {
    /// Sum of uncompressed entry sizes.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

/// A compressed archive ready to hand to the user.
#[derive(Debug, Clone)]
pub struct FinalizedArchive {
    bytes: Vec<u8>,
    summary: ArchiveSummary,
}

impl FinalizedArchive {
    /// Zip container bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the archive, returning the zip bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Entry listing with sizes and digests.
    #[must_use]
    pub fn summary(&self) -> &ArchiveSummary {
        &self.summary
    }

    /// Number of entries in the archive.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.summary.entries.len()
    }
}

/// Compresses entries into a single zip buffer.
///
/// CPU-bound; the pipeline runs it on the blocking pool.
///
/// # Errors
///
/// Returns [`ArchiveError`] if the zip writer fails for any entry or while
/// writing the central directory.
#[instrument(level = "debug", skip(entries), fields(entries = entries.len()))]
pub fn finalize_entries(entries: Vec<(String, Vec<u8>)>) -> Result<FinalizedArchive, ArchiveError> {
    let capacity = entries.iter().map(|(_, bytes)| bytes.len()).sum::<usize>();
    let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(capacity)));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(capacity > u32::MAX as usize);

    let mut summary = ArchiveSummary::default();
    for (name, bytes) in entries {
        writer
            .start_file(name.as_str(), options)
            .map_err(|source| ArchiveError::Zip {
                entry: name.clone(),
                source,
            })?;
        writer.write_all(&bytes).map_err(|source| ArchiveError::Io {
            entry: name.clone(),
            source,
        })?;

        summary.entries.push(EntrySummary {
            sha256: format!("{:x}", Sha256::digest(&bytes)),
            size: bytes.len() as u64,
            name,
        });
    }

    let cursor = writer.finish().map_err(|source| ArchiveError::Zip {
        entry: "<central directory>".to_string(),
        source,
    })?;
    let bytes = cursor.into_inner();

    debug!(
        archive_bytes = bytes.len(),
        content_bytes = summary.total_bytes(),
        "archive finalized"
    );
    Ok(FinalizedArchive { bytes, summary })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Read;

    use super::*;

    fn read_back(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut content = Vec::new();
                file.read_to_end(&mut content).unwrap();
                (file.name().to_string(), content)
            })
            .collect()
    }

    #[test]
    fn test_insert_distinct_names() {
        let builder = ArchiveBuilder::new(DuplicateNamePolicy::default());
        assert!(builder.is_empty());
        builder.insert("a.jpg", b"a".to_vec());
        builder.insert("b.jpg", b"b".to_vec());
        assert_eq!(builder.len(), 2);
    }

    #[test]
    fn test_duplicate_name_last_write_wins() {
        let builder = ArchiveBuilder::new(DuplicateNamePolicy::LastWriteWins);
        builder.insert("photo.jpg", b"first".to_vec());
        let stored = builder.insert("photo.jpg", b"second".to_vec());

        assert_eq!(stored, "photo.jpg");
        let entries = builder.take_entries();
        assert_eq!(entries, vec![("photo.jpg".to_string(), b"second".to_vec())]);
    }

    #[test]
    fn test_duplicate_name_suffix_policy() {
        let builder = ArchiveBuilder::new(DuplicateNamePolicy::Suffix);
        builder.insert("photo.jpg", b"1".to_vec());
        let second = builder.insert("photo.jpg", b"2".to_vec());
        let third = builder.insert("photo.jpg", b"3".to_vec());
        let no_ext = builder.insert("notes", b"n".to_vec());
        let no_ext_dup = builder.insert("notes", b"n2".to_vec());

        assert_eq!(second, "photo (2).jpg");
        assert_eq!(third, "photo (3).jpg");
        assert_eq!(no_ext, "notes");
        assert_eq!(no_ext_dup, "notes (2)");
        assert_eq!(builder.len(), 5);
    }

    #[test]
    fn test_suffix_policy_skips_taken_suffix() {
        let builder = ArchiveBuilder::new(DuplicateNamePolicy::Suffix);
        builder.insert("a (2).pdf", b"x".to_vec());
        builder.insert("a.pdf", b"y".to_vec());
        assert_eq!(builder.insert("a.pdf", b"z".to_vec()), "a (3).pdf");
    }

    #[test]
    fn test_suffix_policy_dotfile_keeps_whole_name_as_stem() {
        let builder = ArchiveBuilder::new(DuplicateNamePolicy::Suffix);
        builder.insert(".env", b"x".to_vec());
        assert_eq!(builder.insert(".env", b"y".to_vec()), ".env (2)");
    }

    #[test]
    fn test_take_entries_preserves_insertion_order() {
        let builder = ArchiveBuilder::new(DuplicateNamePolicy::default());
        for name in ["c", "a", "b"] {
            builder.insert(name, name.as_bytes().to_vec());
        }
        let names: Vec<_> = builder.take_entries().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
        assert!(builder.is_empty());
    }

    #[test]
    fn test_finalize_entries_round_trips_contents() {
        let archive = finalize_entries(vec![
            ("report.pdf".to_string(), b"%PDF-1.7 quote".to_vec()),
            ("site.jpg".to_string(), vec![0xFF, 0xD8, 0xFF, 0x00]),
        ])
        .unwrap();

        assert_eq!(archive.entry_count(), 2);
        let entries = read_back(archive.bytes());
        assert_eq!(entries[0], ("report.pdf".to_string(), b"%PDF-1.7 quote".to_vec()));
        assert_eq!(entries[1].1, vec![0xFF, 0xD8, 0xFF, 0x00]);
    }

    #[test]
    fn test_finalize_entries_summary_digest() {
        let archive = finalize_entries(vec![("hello.txt".to_string(), b"hello".to_vec())]).unwrap();
        let entry = &archive.summary().entries[0];
        assert_eq!(entry.size, 5);
        assert_eq!(
            entry.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(archive.summary().total_bytes(), 5);
    }

    #[test]
    fn test_finalize_empty_entries_produces_valid_zip() {
        let archive = finalize_entries(Vec::new()).unwrap();
        assert_eq!(archive.entry_count(), 0);
        assert!(read_back(archive.bytes()).is_empty());
    }

    #[test]
    fn test_concurrent_inserts() {
        use std::sync::Arc;
        use std::thread;

        let builder = Arc::new(ArchiveBuilder::new(DuplicateNamePolicy::default()));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let builder = Arc::clone(&builder);
                thread::spawn(move || {
                    for i in 0..50 {
                        builder.insert(&format!("{t}-{i}.bin"), vec![0; 16]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(builder.len(), 400);
    }
}
