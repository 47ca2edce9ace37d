//! Storage context for documents and markup produced by the workspace
//!
//! Ids are opaque strings handed back to collaborators; they end with a
//! sanitized form of the name hint so a download keeps a readable name.

use crate::error::{PdfEditError, Result};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use uuid::Uuid;

pub trait Storage: Send + Sync {
    fn read(&self, id: &str) -> Result<Vec<u8>>;

    /// Store `bytes` and return the id they can be read back with
    fn write(&self, name_hint: &str, bytes: &[u8]) -> Result<String>;

    fn remove(&self, id: &str) -> Result<()>;
}

/// Keep `[A-Za-z0-9._-]`, drop everything else
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

fn new_id(name_hint: &str) -> String {
    let short = Uuid::new_v4().simple().to_string();
    format!("{}_{}", &short[..12], sanitize_name(name_hint))
}

fn checked_id(id: &str) -> Result<&str> {
    if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
        return Err(PdfEditError::Validation(format!("Invalid storage id: {}", id)));
    }
    Ok(id)
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> PdfEditError {
        PdfEditError::OperationError("storage lock poisoned".to_string())
    }
}

impl Storage for MemoryStorage {
    fn read(&self, id: &str) -> Result<Vec<u8>> {
        let entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        entries
            .get(id)
            .cloned()
            .ok_or_else(|| PdfEditError::NotFound(format!("No stored file {}", id)))
    }

    fn write(&self, name_hint: &str, bytes: &[u8]) -> Result<String> {
        let id = new_id(name_hint);
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        entries.insert(id.clone(), bytes.to_vec());
        Ok(id)
    }

    fn remove(&self, id: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        entries
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PdfEditError::NotFound(format!("No stored file {}", id)))
    }
}

/// Files in one directory; writes land through a temp file and a rename
#[derive(Debug, Clone)]
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, id: &str) -> Result<PathBuf> {
        Ok(self.root.join(checked_id(id)?))
    }
}

impl Storage for DirStorage {
    fn read(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.path_of(id)?;
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PdfEditError::NotFound(format!("No stored file {}", id)),
            _ => PdfEditError::Io(e),
        })
    }

    fn write(&self, name_hint: &str, bytes: &[u8]) -> Result<String> {
        let id = new_id(name_hint);
        let mut file = NamedTempFile::new_in(&self.root)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.persist(self.root.join(&id)).map_err(|e| PdfEditError::Io(e.error))?;
        Ok(id)
    }

    fn remove(&self, id: &str) -> Result<()> {
        let path = self.path_of(id)?;
        fs::remove_file(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PdfEditError::NotFound(format!("No stored file {}", id)),
            _ => PdfEditError::Io(e),
        })
    }
}
