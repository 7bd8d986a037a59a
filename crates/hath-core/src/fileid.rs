//! Content-addressed file identifiers.
//!
//! A file id is the canonical string
//! `hash-size-xres-yres-ext` where `hash` is 40 lowercase hex characters
//! (the SHA-1 of the file), `size` is the byte length (1-8 digits), `xres`
//! and `yres` are the pixel dimensions (1-5 digits each), and `ext` is one
//! of `jpg`, `png`, `gif`, `wbm`. The id is both the storage key and the
//! integrity descriptor of a blob; the first four hash characters name the
//! static range the file belongs to.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Length of the hex hash component.
pub const HASH_LEN: usize = 40;

/// Length of a static range prefix.
pub const STATIC_RANGE_LEN: usize = 4;

/// Error parsing a file id.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FileIdError {
    /// Wrong number of `-`-separated fields
    #[error("expected 5 fields, got {0}")]
    FieldCount(usize),

    /// Hash is not 40 lowercase hex characters
    #[error("invalid hash component")]
    InvalidHash,

    /// Size field out of range or non-numeric
    #[error("invalid size component")]
    InvalidSize,

    /// Resolution field out of range or non-numeric
    #[error("invalid resolution component")]
    InvalidResolution,

    /// Unknown file extension
    #[error("unknown extension: {0}")]
    UnknownExtension(String),
}

/// File extensions the network serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    /// JPEG image
    Jpg,
    /// PNG image
    Png,
    /// GIF image
    Gif,
    /// WebM video
    Wbm,
}

impl Extension {
    /// Returns the extension token used in file ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            Extension::Jpg => "jpg",
            Extension::Png => "png",
            Extension::Gif => "gif",
            Extension::Wbm => "wbm",
        }
    }

    /// Returns the MIME type served for this extension.
    pub fn mime(&self) -> &'static str {
        match self {
            Extension::Jpg => "image/jpeg",
            Extension::Png => "image/png",
            Extension::Gif => "image/gif",
            Extension::Wbm => "video/webm",
        }
    }
}

impl FromStr for Extension {
    type Err = FileIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jpg" => Ok(Extension::Jpg),
            "png" => Ok(Extension::Png),
            "gif" => Ok(Extension::Gif),
            "wbm" => Ok(Extension::Wbm),
            other => Err(FileIdError::UnknownExtension(other.to_string())),
        }
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed file identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileId {
    /// Lowercase hex SHA-1 of the file contents
    pub hash: String,
    /// File size in bytes
    pub size: u64,
    /// Horizontal resolution
    pub xres: u32,
    /// Vertical resolution
    pub yres: u32,
    /// File extension
    pub ext: Extension,
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn digits(s: &str, max_len: usize) -> bool {
    !s.is_empty() && s.len() <= max_len && s.bytes().all(|b| b.is_ascii_digit())
}

impl FileId {
    /// Parses a file id string, rejecting anything outside the grammar.
    pub fn parse(s: &str) -> Result<Self, FileIdError> {
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 5 {
            return Err(FileIdError::FieldCount(parts.len()));
        }

        let hash = parts[0];
        if hash.len() != HASH_LEN || !is_lower_hex(hash) {
            return Err(FileIdError::InvalidHash);
        }
        if !digits(parts[1], 8) {
            return Err(FileIdError::InvalidSize);
        }
        if !digits(parts[2], 5) || !digits(parts[3], 5) {
            return Err(FileIdError::InvalidResolution);
        }

        Ok(Self {
            hash: hash.to_string(),
            size: parts[1].parse().map_err(|_| FileIdError::InvalidSize)?,
            xres: parts[2].parse().map_err(|_| FileIdError::InvalidResolution)?,
            yres: parts[3].parse().map_err(|_| FileIdError::InvalidResolution)?,
            ext: parts[4].parse()?,
        })
    }

    /// Returns the canonical id string, the storage key of the blob.
    pub fn canonical(&self) -> String {
        format!("{}-{}-{}-{}-{}", self.hash, self.size, self.xres, self.yres, self.ext)
    }

    /// Returns the static range prefix this file belongs to.
    pub fn static_range(&self) -> &str {
        &self.hash[..STATIC_RANGE_LEN]
    }

    /// Returns the MIME type to serve this file with.
    pub fn mime(&self) -> &'static str {
        self.ext.mime()
    }
}

impl FromStr for FileId {
    type Err = FileIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_id() -> String {
        format!("{}-1234-800-600-jpg", "a".repeat(40))
    }

    #[test]
    fn test_parse_valid() {
        let fid = FileId::parse(&valid_id()).unwrap();
        assert_eq!(fid.hash, "a".repeat(40));
        assert_eq!(fid.size, 1234);
        assert_eq!(fid.xres, 800);
        assert_eq!(fid.yres, 600);
        assert_eq!(fid.ext, Extension::Jpg);
        assert_eq!(fid.static_range(), "aaaa");
    }

    #[test]
    fn test_canonical_roundtrip() {
        let fid = FileId::parse(&valid_id()).unwrap();
        assert_eq!(FileId::parse(&fid.canonical()).unwrap(), fid);
        assert_eq!(fid.canonical(), valid_id());
    }

    #[test]
    fn test_hash_length_boundary() {
        // 39 characters rejected, 40 accepted.
        let short = format!("{}-1234-800-600-jpg", "a".repeat(39));
        assert_eq!(FileId::parse(&short), Err(FileIdError::InvalidHash));
        assert!(FileId::parse(&valid_id()).is_ok());

        let long = format!("{}-1234-800-600-jpg", "a".repeat(41));
        assert_eq!(FileId::parse(&long), Err(FileIdError::InvalidHash));
    }

    #[test]
    fn test_rejects_uppercase_and_nonhex() {
        let upper = format!("{}-1234-800-600-jpg", "A".repeat(40));
        assert_eq!(FileId::parse(&upper), Err(FileIdError::InvalidHash));

        let nonhex = format!("{}-1234-800-600-jpg", "g".repeat(40));
        assert_eq!(FileId::parse(&nonhex), Err(FileIdError::InvalidHash));
    }

    #[test]
    fn test_unknown_extension() {
        let id = format!("{}-1234-800-600-bmp", "a".repeat(40));
        assert!(matches!(FileId::parse(&id), Err(FileIdError::UnknownExtension(_))));
    }

    #[test]
    fn test_field_width_limits() {
        let big_size = format!("{}-123456789-800-600-jpg", "a".repeat(40));
        assert_eq!(FileId::parse(&big_size), Err(FileIdError::InvalidSize));

        let big_res = format!("{}-1234-123456-600-jpg", "a".repeat(40));
        assert_eq!(FileId::parse(&big_res), Err(FileIdError::InvalidResolution));

        let empty_res = format!("{}-1234--600-jpg", "a".repeat(40));
        assert!(FileId::parse(&empty_res).is_err());
    }

    #[test]
    fn test_field_count() {
        assert_eq!(FileId::parse("abc"), Err(FileIdError::FieldCount(1)));
        let six = format!("{}-1-2-3-4-jpg", "a".repeat(40));
        assert_eq!(FileId::parse(&six), Err(FileIdError::FieldCount(6)));
    }

    #[test]
    fn test_mime_mapping() {
        assert_eq!(Extension::Jpg.mime(), "image/jpeg");
        assert_eq!(Extension::Png.mime(), "image/png");
        assert_eq!(Extension::Gif.mime(), "image/gif");
        assert_eq!(Extension::Wbm.mime(), "video/webm");
    }
}
