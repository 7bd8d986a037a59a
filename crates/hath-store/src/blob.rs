//! Blob storage over RocksDB.

use std::path::Path;

use hath_core::FileId;
use rocksdb::{Options, DB};
use tracing::{debug, warn};

use crate::StoreError;

/// Local store of cached blobs keyed by canonical file id.
pub struct BlobStore {
    db: DB,
}

impl BlobStore {
    /// Opens (or creates) the store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path).map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(Self { db })
    }

    /// Retrieves a blob.
    ///
    /// A stored value whose length does not match the id is corrupt and is
    /// reported as a miss so the request path can re-fetch it.
    pub fn get(&self, fid: &FileId) -> Result<Vec<u8>, StoreError> {
        let key = fid.canonical();
        match self.db.get(key.as_bytes()).map_err(|e| StoreError::Database(e.to_string()))? {
            Some(data) if data.len() as u64 == fid.size => Ok(data),
            Some(data) => {
                warn!(file_id = %fid, stored = data.len(), "stored blob length mismatch, treating as miss");
                Err(StoreError::NotFound)
            }
            None => Err(StoreError::NotFound),
        }
    }

    /// Stores a blob. The byte length must match the id.
    pub fn put(&self, fid: &FileId, data: &[u8]) -> Result<(), StoreError> {
        if data.len() as u64 != fid.size {
            return Err(StoreError::SizeMismatch {
                expected: fid.size,
                actual: data.len() as u64,
            });
        }

        let key = fid.canonical();
        self.db
            .put(key.as_bytes(), data)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        debug!(file_id = %fid, bytes = data.len(), "stored blob");
        Ok(())
    }

    /// Returns true if a well-formed blob is present for the id.
    pub fn contains(&self, fid: &FileId) -> bool {
        self.get(fid).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hath_core::mac::sha1_hex_bytes;
    use tempfile::TempDir;

    fn fid_for(data: &[u8]) -> FileId {
        FileId::parse(&format!("{}-{}-800-600-jpg", sha1_hex_bytes(data), data.len())).unwrap()
    }

    #[test]
    fn test_put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();

        let data = vec![0xAB; 1234];
        let fid = fid_for(&data);

        store.put(&fid, &data).unwrap();
        assert_eq!(store.get(&fid).unwrap(), data);
        assert!(store.contains(&fid));
    }

    #[test]
    fn test_missing_blob_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();

        let fid = fid_for(b"absent");
        assert!(matches!(store.get(&fid), Err(StoreError::NotFound)));
        assert!(!store.contains(&fid));
    }

    #[test]
    fn test_put_rejects_wrong_length() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();

        let data = vec![0xAB; 100];
        let fid = fid_for(&data);

        let err = store.put(&fid, &data[..50]).unwrap_err();
        assert!(matches!(err, StoreError::SizeMismatch { expected: 100, actual: 50 }));
    }

    #[test]
    fn test_corrupt_length_surfaces_as_miss() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();

        let data = vec![0xCD; 200];
        let fid = fid_for(&data);
        store.put(&fid, &data).unwrap();

        // Overwrite the raw key with a short value behind the adapter's back.
        store.db.put(fid.canonical().as_bytes(), b"short").unwrap();
        assert!(matches!(store.get(&fid), Err(StoreError::NotFound)));
    }
}
