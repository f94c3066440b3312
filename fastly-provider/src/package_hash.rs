//! Package hash for Compute deployment packages
//!
//! A package is a gzip-compressed tar archive. Its hash is the SHA-512 of
//! every regular file's content, concatenated in byte-wise order of the
//! archive path names. Member order, directory entries and header metadata
//! (timestamps, modes, owners) do not contribute, so repacking the same files
//! yields the same hash. Stored hashes depend on this exact construction.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use fastly_core::attrs::{AttributeError, Attributes, FromAttributes};
use fastly_core::resource::Value;
use fastly_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha512};
use tar::{Archive, EntryType};

/// Ceiling on the sum of declared entry sizes
pub const MAX_PACKAGE_SIZE: u64 = 100_000_000;

/// Errors raised while hashing a package
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("invalid base64 package content: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("failed to open package {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read package archive: {0}")]
    Archive(#[source] std::io::Error),

    #[error("package size exceeded limit")]
    SizeExceeded { limit: u64 },
}

/// Where the package bytes come from
#[derive(Debug, Clone, PartialEq)]
pub enum PackageSource {
    /// Base64-encoded archive bytes
    Content(String),
    /// Path to the archive on disk
    Filename(PathBuf),
}

/// Hash a package from either source
pub fn package_hash(source: &PackageSource) -> Result<String, PackageError> {
    match source {
        PackageSource::Content(encoded) => {
            let bytes = STANDARD.decode(encoded.trim())?;
            hash_archive(Cursor::new(bytes))
        }
        PackageSource::Filename(path) => {
            let file = File::open(path).map_err(|source| PackageError::Open {
                path: path.clone(),
                source,
            })?;
            hash_archive(BufReader::new(file))
        }
    }
}

/// Hash a gzip-compressed tar stream
pub fn hash_archive<R: Read>(reader: R) -> Result<String, PackageError> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut files: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
    let mut total: u64 = 0;

    for entry in archive.entries().map_err(PackageError::Archive)? {
        let mut entry = entry.map_err(PackageError::Archive)?;

        // Checked before any content is read so a hostile header cannot make
        // us inflate the body.
        total = total.saturating_add(entry.size());
        if total > MAX_PACKAGE_SIZE {
            return Err(PackageError::SizeExceeded {
                limit: MAX_PACKAGE_SIZE,
            });
        }

        if entry.header().entry_type() != EntryType::Regular {
            continue;
        }

        let name = entry.path_bytes().into_owned();
        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(PackageError::Archive)?;
        files.insert(name, content);
    }

    let mut hasher = Sha512::new();
    for content in files.values() {
        hasher.update(content);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Configuration of the `package_hash` data source
#[derive(Debug, Clone, PartialEq)]
pub struct PackageHashConfig {
    pub source: PackageSource,
}

impl FromAttributes for PackageHashConfig {
    fn schema() -> ResourceSchema {
        ResourceSchema::new("package_hash")
            .with_description("Content hash of a Compute deployment package")
            .attribute(
                AttributeSchema::new("content", AttributeType::String)
                    .with_description("Base64-encoded package. Conflicts with filename"),
            )
            .attribute(
                AttributeSchema::new("filename", AttributeType::String)
                    .with_description("Path to the package. Conflicts with content"),
            )
            .attribute(
                AttributeSchema::new("hash", AttributeType::String)
                    .computed()
                    .with_description("SHA-512 of the package's files"),
            )
    }

    fn from_validated(attrs: Attributes<'_>) -> Result<Self, AttributeError> {
        let source = match attrs.exactly_one_of(&["content", "filename"])? {
            "content" => PackageSource::Content(attrs.string("content")?),
            _ => PackageSource::Filename(PathBuf::from(attrs.string("filename")?)),
        };
        Ok(Self { source })
    }
}

impl PackageHashConfig {
    /// Attributes exposed after evaluation
    pub fn state_attributes(&self, hash: &str) -> HashMap<String, Value> {
        let mut attrs = HashMap::new();
        match &self.source {
            PackageSource::Content(c) => {
                attrs.insert("content".to_string(), Value::String(c.clone()));
            }
            PackageSource::Filename(p) => {
                attrs.insert(
                    "filename".to_string(),
                    Value::String(p.to_string_lossy().into_owned()),
                );
            }
        }
        attrs.insert("hash".to_string(), Value::String(hash.to_string()));
        attrs
    }
}
