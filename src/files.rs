use std::path::{Path, PathBuf};

use crate::errors::CampanileError;

/// On-disk store for uploaded file content, keyed by the generated file id.
/// Metadata (name, content type, digest) lives in the `stored_files` table;
/// this type only moves bytes.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CampanileError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ids are URL-safe base64 from the storage layer; anything that could
    /// name a path outside the root is rejected.
    fn path_for(&self, id: &str) -> Result<PathBuf, CampanileError> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(CampanileError::BadRequest(format!("invalid file id `{id}`")));
        }
        Ok(self.root.join(id))
    }

    pub fn save(&self, id: &str, bytes: &[u8]) -> Result<(), CampanileError> {
        let path = self.path_for(id)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn open(&self, id: &str) -> Result<Option<Vec<u8>>, CampanileError> {
        let path = self.path_for(id)?;
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn delete(&self, id: &str) -> Result<(), CampanileError> {
        let path = self.path_for(id)?;
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
