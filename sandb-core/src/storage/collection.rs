//! Collection directories

use crate::{Result, SanError};
use regex::Regex;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;

const MAX_NAME_LEN: usize = 255;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_\-][A-Za-z0-9_.\-]*$").expect("collection name pattern is valid")
    })
}

/// Reject names that are empty, too long, or not safe as a single path
/// component
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SanError::invalid("collection name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(SanError::invalid(format!(
            "collection name longer than {} bytes",
            MAX_NAME_LEN
        )));
    }
    if !name_pattern().is_match(name) {
        return Err(SanError::invalid(format!("invalid collection name '{}'", name)));
    }
    Ok(())
}

/// Result of creating a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Collection directory lifecycle under the data root
#[derive(Debug, Clone)]
pub struct CollectionStore {
    data_dir: PathBuf,
}

impl CollectionStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Directory of a collection (not checked for existence)
    pub fn dir(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    /// Check if a collection exists
    pub fn exists(&self, name: &str) -> bool {
        validate_collection_name(name).is_ok() && self.dir(name).is_dir()
    }

    /// Resolve an existing collection's directory
    pub fn require(&self, name: &str) -> Result<PathBuf> {
        validate_collection_name(name)?;
        let dir = self.dir(name);
        if !dir.is_dir() {
            return Err(SanError::CollectionNotFound(name.to_string()));
        }
        Ok(dir)
    }

    /// Sorted names of all collections; hidden directories are skipped
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    /// Create a collection directory
    pub fn create(&self, name: &str) -> Result<CreateOutcome> {
        validate_collection_name(name)?;
        match fs::create_dir(self.dir(name)) {
            Ok(()) => Ok(CreateOutcome::Created),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(CreateOutcome::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    /// Rename a collection directory
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        let from = self.require(old)?;
        validate_collection_name(new)?;
        let to = self.dir(new);
        if to.exists() {
            return Err(SanError::CollectionExists(new.to_string()));
        }
        fs::rename(from, to)?;
        Ok(())
    }

    /// Remove a collection directory and everything in it
    pub fn remove(&self, name: &str) -> Result<()> {
        let dir = self.require(name)?;
        fs::remove_dir_all(dir)?;
        Ok(())
    }
}
