use crate::error::{Result, SessionError};
use log::{debug, warn};
use std::cell::RefCell;
use std::fmt;
use std::io::{Cursor, Read};
use std::path::Path;
use zip::ZipArchive;

/// Upper bound on the buffer reserved from an entry's declared size.
const MAX_PREALLOCATION: u64 = 1 << 20;

/// A user-supplied book file, already read into memory.
#[derive(Clone)]
pub struct BookFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl BookFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Ok(Self::new(name, bytes))
    }
}

impl fmt::Debug for BookFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BookFile")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Binary entry content tagged with the caller-supplied mime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Lazily-decompressing view over a zip container.
///
/// Entries are only inflated when asked for. The zip reader needs `&mut`
/// to seek, so it lives behind a `RefCell`; the session is single-threaded.
pub struct Archive {
    zip: RefCell<ZipArchive<Cursor<Vec<u8>>>>,
    names: Vec<String>,
}

impl Archive {
    pub fn open(file: BookFile) -> Result<Self> {
        let zip = ZipArchive::new(Cursor::new(file.bytes)).map_err(|e| {
            warn!("{} is not a zip container: {e}", file.name);
            SessionError::unsupported(format!("{} is not a zip container: {e}", file.name))
        })?;
        let names = zip.file_names().map(str::to_string).collect::<Vec<_>>();
        debug!("Opened archive {} with {} entries", file.name, names.len());
        Ok(Self {
            zip: RefCell::new(zip),
            names,
        })
    }

    pub fn entry_names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    fn read_entry(&self, name: &str) -> Option<Vec<u8>> {
        let mut zip = self.zip.borrow_mut();
        let mut entry = zip.by_name(name).ok()?;
        let mut buf = Vec::with_capacity(initial_capacity(entry.size()));
        match entry.read_to_end(&mut buf) {
            Ok(_) => Some(buf),
            Err(e) => {
                warn!("Failed to inflate {name}: {e}");
                None
            }
        }
    }

    pub fn load_text(&self, name: &str) -> Option<String> {
        let bytes = self.read_entry(name)?;
        Some(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    pub fn load_blob(&self, name: &str, mime_type: &str) -> Option<Blob> {
        self.read_entry(name).map(|bytes| Blob {
            mime_type: mime_type.to_string(),
            bytes,
        })
    }

    /// Uncompressed size of an entry, 0 when absent.
    pub fn get_size(&self, name: &str) -> u64 {
        let mut zip = self.zip.borrow_mut();
        zip.by_name(name).map(|entry| entry.size()).unwrap_or(0)
    }
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("entries", &self.names.len())
            .finish()
    }
}

/// The declared size comes from the zip header and is not trusted beyond
/// a small preallocation; the buffer grows with the actual data.
fn initial_capacity(declared: u64) -> usize {
    declared.min(MAX_PREALLOCATION) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_rejects_non_zip_input() {
        let err = Archive::open(BookFile::new("notes.txt", b"plain text".to_vec())).unwrap_err();
        assert!(err.is_unsupported_format());
    }

    #[test]
    fn test_lazy_accessors() {
        let bytes = build_zip(&[
            ("mimetype", b"application/epub+zip"),
            ("OEBPS/cover.png", &[0x89, 0x50, 0x4e, 0x47]),
        ]);
        let archive = Archive::open(BookFile::new("book.epub", bytes)).unwrap();

        assert_eq!(
            archive.load_text("mimetype").as_deref(),
            Some("application/epub+zip")
        );
        let blob = archive.load_blob("OEBPS/cover.png", "image/png").unwrap();
        assert_eq!(blob.mime_type, "image/png");
        assert_eq!(blob.bytes.len(), 4);
        assert_eq!(archive.get_size("mimetype"), 20);
    }

    #[test]
    fn test_initial_capacity_is_capped() {
        assert_eq!(initial_capacity(20), 20);
        assert_eq!(initial_capacity(u64::MAX), MAX_PREALLOCATION as usize);
    }

    #[test]
    fn test_inflated_declared_size_still_reads() {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let stored = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file("OEBPS/ch1.xhtml", stored).unwrap();
        zip.write_all(b"<p>short</p>").unwrap();
        let mut bytes = zip.finish().unwrap().into_inner();

        // Uncompressed size field of the central directory header.
        let central = bytes
            .windows(4)
            .position(|w| w == b"PK\x01\x02")
            .unwrap();
        bytes[central + 24..central + 28].copy_from_slice(&0x7fff_fff0u32.to_le_bytes());

        let archive = Archive::open(BookFile::new("book.epub", bytes)).unwrap();
        assert_eq!(
            archive.load_text("OEBPS/ch1.xhtml").as_deref(),
            Some("<p>short</p>")
        );
    }

    #[test]
    fn test_missing_entries() {
        let bytes = build_zip(&[("mimetype", b"application/epub+zip")]);
        let archive = Archive::open(BookFile::new("book.epub", bytes)).unwrap();

        assert!(archive.load_text("missing.xhtml").is_none());
        assert!(archive.load_blob("missing.png", "image/png").is_none());
        assert_eq!(archive.get_size("missing.xhtml"), 0);
        assert!(!archive.contains("missing.xhtml"));
    }
}
