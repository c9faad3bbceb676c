//! Utility modules.

pub mod file;
pub mod text;

pub use file::{DecodedText, calculate_checksum, decode_lossy, is_text_file, read_document};
pub use text::truncate_chars;
