//! File utilities for ingest and snapshot operations.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;

/// SHA-256 checksum of a byte buffer, hex encoded.
pub fn calculate_checksum(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    hex::encode(hash)
}

/// Text of a document read from disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    /// Invalid UTF-8 bytes dropped while decoding.
    pub skipped_bytes: usize,
}

/// Decode bytes as UTF-8, dropping invalid sequences instead of failing.
pub fn decode_lossy(bytes: &[u8]) -> DecodedText {
    let mut decoded = DecodedText {
        text: String::with_capacity(bytes.len()),
        skipped_bytes: 0,
    };
    for chunk in bytes.utf8_chunks() {
        decoded.text.push_str(chunk.valid());
        decoded.skipped_bytes += chunk.invalid().len();
    }
    decoded
}

/// Check if a file is likely a text file.
pub fn is_text_file(path: &Path) -> bool {
    // Check by extension
    if let Some(ext) = path.extension() {
        let ext = ext.to_string_lossy().to_lowercase();
        if is_binary_extension(&ext) {
            return false;
        }
        if is_text_extension(&ext) {
            return true;
        }
    }

    // Check by reading first bytes
    if let Ok(file) = fs::File::open(path) {
        let mut buffer = [0u8; 512];
        let mut reader = std::io::BufReader::new(file);
        if let Ok(n) = reader.read(&mut buffer) {
            if n == 0 {
                return true; // Empty file is text
            }
            // Check for null bytes (binary indicator)
            if buffer[..n].contains(&0) {
                return false;
            }
            return true;
        }
    }

    false
}

/// Read a document with a size limit, decoding it leniently.
pub fn read_document(path: &Path, max_size: u64) -> std::io::Result<DecodedText> {
    let metadata = fs::metadata(path)?;

    if metadata.len() > max_size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "file exceeds maximum size: {} > {}",
                metadata.len(),
                max_size
            ),
        ));
    }

    Ok(decode_lossy(&fs::read(path)?))
}

/// Check if extension indicates a binary file.
fn is_binary_extension(ext: &str) -> bool {
    matches!(
        ext,
        "exe"
            | "dll"
            | "so"
            | "dylib"
            | "a"
            | "o"
            | "obj"
            | "png"
            | "jpg"
            | "jpeg"
            | "gif"
            | "bmp"
            | "ico"
            | "webp"
            | "mp3"
            | "mp4"
            | "avi"
            | "mkv"
            | "mov"
            | "wav"
            | "flac"
            | "zip"
            | "tar"
            | "gz"
            | "bz2"
            | "xz"
            | "7z"
            | "rar"
            | "pdf"
            | "doc"
            | "docx"
            | "xls"
            | "xlsx"
            | "ppt"
            | "pptx"
            | "woff"
            | "woff2"
            | "ttf"
            | "otf"
            | "class"
            | "jar"
            | "pyc"
            | "db"
            | "sqlite"
            | "sqlite3"
            | "bin"
            | "onnx"
    )
}

/// Check if extension indicates a text file.
fn is_text_extension(ext: &str) -> bool {
    matches!(
        ext,
        // Documents
        "md" | "markdown" | "rst" | "txt" | "adoc" | "org" | "text" | "log"
            // Tabular
            | "csv" | "tsv"
            // Data/Config
            | "json" | "jsonl" | "yaml" | "yml" | "toml" | "xml" | "ini" | "cfg"
            // Web
            | "html" | "htm" | "css"
            // Source code
            | "rs" | "py" | "js" | "ts" | "go" | "java" | "c" | "h" | "cpp" | "rb"
            | "sh" | "sql"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_calculate_checksum() {
        let checksum = calculate_checksum(b"hello world");
        assert_eq!(
            checksum,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_decode_lossy_drops_invalid_bytes() {
        let decoded = decode_lossy(b"caf\xc3\xa9 \xff\xfeok");
        assert_eq!(decoded.text, "caf\u{e9} ok");
        assert_eq!(decoded.skipped_bytes, 2);
    }

    #[test]
    fn test_read_document_enforces_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        fs::write(&path, "x".repeat(100)).unwrap();
        assert!(read_document(&path, 10).is_err());

        let decoded = read_document(&path, 1000).unwrap();
        assert_eq!(decoded.text.len(), 100);
        assert_eq!(decoded.skipped_bytes, 0);
    }

    #[test]
    fn test_is_binary_extension() {
        assert!(is_binary_extension("exe"));
        assert!(is_binary_extension("png"));
        assert!(!is_binary_extension("csv"));
        assert!(!is_binary_extension("md"));
    }

    #[test]
    fn test_is_text_extension() {
        assert!(is_text_extension("txt"));
        assert!(is_text_extension("csv"));
        assert!(is_text_extension("md"));
        assert!(!is_text_extension("png"));
    }

    #[test]
    fn test_is_text_file() {
        let path = PathBuf::from("ledger.csv");
        assert!(is_text_file(&path));

        let path = PathBuf::from("scan.png");
        assert!(!is_text_file(&path));
    }
}
