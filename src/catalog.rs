//! File catalog and block access.
//!
//! The server scans its files directory once at startup into a list of
//! [`CatalogFile`] records; the SHA-256 of a file's bytes is its id across
//! the whole system and the MD5 is what downloads are verified against.
//! Blocks are fixed-size slices numbered from 0; the last block may be
//! short and out-of-range indices read as an empty payload.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use md5::Md5;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

/// Errors that can occur during catalog and block-file operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Filesystem I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested file does not exist in the catalog directory.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The configured catalog path exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),
}

/// Metadata for one file served out of the catalog directory.
///
/// `id` is the lowercase hex SHA-256 of the file's bytes and uniquely
/// identifies the file across server, clients, and trusted peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogFile {
    pub name: String,
    pub id: String,
    pub md5: String,
}

/// Random access to the files of one directory, in fixed-size blocks.
pub struct FileCatalog {
    dir: PathBuf,
    block_size: usize,
}

impl FileCatalog {
    /// Opens a catalog over `dir`, creating the directory if it is missing.
    pub fn new(dir: impl Into<PathBuf>, block_size: usize) -> Result<Self, CatalogError> {
        let dir = dir.into();
        if dir.exists() && !dir.is_dir() {
            return Err(CatalogError::NotADirectory(dir.display().to_string()));
        }
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, block_size })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Scans the directory and hashes every regular file.
    pub async fn scan(&self) -> Result<Vec<CatalogFile>, CatalogError> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let data = fs::read(entry.path()).await?;
            files.push(CatalogFile {
                id: sha256_hex(&data),
                md5: md5_hex(&data),
                name,
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        info!(
            count = files.len(),
            dir = %self.dir.display(),
            "catalog scanned"
        );
        Ok(files)
    }

    /// Reads the `index`-th block of a cataloged file.
    pub async fn block(&self, name: &str, index: u64) -> Result<Bytes, CatalogError> {
        read_block(&self.dir.join(name), self.block_size, index).await
    }

    /// Writes `data` under `name` in the catalog directory.
    pub async fn save(&self, data: &[u8], name: &str) -> Result<PathBuf, CatalogError> {
        let path = self.dir.join(name);
        fs::write(&path, data).await?;
        debug!(path = %path.display(), bytes = data.len(), "file saved");
        Ok(path)
    }

    /// Recomputes the MD5 of a previously saved file.
    pub async fn md5_of(&self, name: &str) -> Result<String, CatalogError> {
        let data = fs::read(self.dir.join(name))
            .await
            .map_err(|_| CatalogError::FileNotFound(name.to_string()))?;
        Ok(md5_hex(&data))
    }
}

/// Reads one `block_size`-sized slice of the file at `path`.
///
/// Block `i` covers bytes `[i*B, min((i+1)*B, len))`; the slice past the end
/// of the file is empty rather than an error.
pub async fn read_block(
    path: &Path,
    block_size: usize,
    index: u64,
) -> Result<Bytes, CatalogError> {
    let mut file = File::open(path)
        .await
        .map_err(|_| CatalogError::FileNotFound(path.display().to_string()))?;
    let len = file.metadata().await?.len();

    let Some(offset) = index.checked_mul(block_size as u64) else {
        return Ok(Bytes::new());
    };
    if offset >= len {
        return Ok(Bytes::new());
    }

    let take = (len - offset).min(block_size as u64) as usize;
    let mut buf = vec![0u8; take];
    file.seek(SeekFrom::Start(offset)).await?;
    file.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}

/// Lowercase hex SHA-256 of a byte slice.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex_encode(&hasher.finalize())
}

/// Lowercase hex MD5 of a byte slice.
pub fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex_encode(&hasher.finalize())
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[tokio::test]
    async fn test_scan_lists_regular_files() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("b.txt"), b"bravo").unwrap();
        std::fs::write(temp.path().join("a.txt"), b"alpha").unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();

        let catalog = FileCatalog::new(temp.path(), 100).unwrap();
        let files = catalog.scan().await.unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "a.txt");
        assert_eq!(files[0].id, sha256_hex(b"alpha"));
        assert_eq!(files[0].md5, md5_hex(b"alpha"));
        assert_eq!(files[1].name, "b.txt");
    }

    #[tokio::test]
    async fn test_block_slicing_with_short_tail() {
        let temp = TempDir::new().unwrap();
        let data: Vec<u8> = (0..250u32).map(|i| (i % 256) as u8).collect();
        std::fs::write(temp.path().join("data.bin"), &data).unwrap();

        let catalog = FileCatalog::new(temp.path(), 100).unwrap();

        let b0 = catalog.block("data.bin", 0).await.unwrap();
        let b1 = catalog.block("data.bin", 1).await.unwrap();
        let b2 = catalog.block("data.bin", 2).await.unwrap();
        let b3 = catalog.block("data.bin", 3).await.unwrap();

        assert_eq!(b0.as_ref(), &data[0..100]);
        assert_eq!(b1.as_ref(), &data[100..200]);
        assert_eq!(b2.as_ref(), &data[200..250]);
        assert!(b3.is_empty());
    }

    #[tokio::test]
    async fn test_block_of_empty_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("empty"), b"").unwrap();

        let catalog = FileCatalog::new(temp.path(), 100).unwrap();
        assert!(catalog.block("empty", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_block_of_missing_file() {
        let temp = TempDir::new().unwrap();
        let catalog = FileCatalog::new(temp.path(), 100).unwrap();

        let err = catalog.block("nope", 0).await.unwrap_err();
        assert!(matches!(err, CatalogError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_save_and_md5_round_trip() {
        let temp = TempDir::new().unwrap();
        let catalog = FileCatalog::new(temp.path(), 100).unwrap();

        let path = catalog.save(b"payload", "output_x.bin").await.unwrap();
        assert!(path.ends_with("output_x.bin"));
        assert_eq!(
            catalog.md5_of("output_x.bin").await.unwrap(),
            md5_hex(b"payload")
        );
    }

    #[test]
    fn test_new_creates_missing_directory() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("deep").join("er");
        let catalog = FileCatalog::new(&nested, 64).unwrap();
        assert!(nested.is_dir());
        assert_eq!(catalog.block_size(), 64);
    }

    #[test]
    fn test_new_rejects_file_path() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            FileCatalog::new(&file, 64),
            Err(CatalogError::NotADirectory(_))
        ));
    }
}
