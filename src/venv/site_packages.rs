// src/venv/site_packages.rs

//! Process-scoped extra module search path.
//!
//! Environments opting in with `add_as_extra_site_packages` contribute their
//! site-packages directories here; `Context::run` exports the list as
//! `PYTHONPATH`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    entries: Arc<Mutex<Vec<PathBuf>>>,
}

impl SearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PathBuf>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append the paths not already present; returns those actually added.
    pub fn append_unique<I>(&self, paths: I) -> Vec<PathBuf>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut entries = self.lock();
        let mut added = Vec::new();
        for path in paths {
            if !entries.contains(&path) {
                entries.push(path.clone());
                added.push(path);
            }
        }
        added
    }

    pub fn remove(&self, paths: &[PathBuf]) {
        self.lock().retain(|p| !paths.contains(p));
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().iter().any(|p| p == path)
    }

    pub fn entries(&self) -> Vec<PathBuf> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// `existing` followed by our entries, joined with the platform separator.
    pub fn pythonpath(&self, existing: Option<OsString>) -> Option<OsString> {
        let entries = self.entries();
        if entries.is_empty() {
            return existing;
        }
        let mut all: Vec<PathBuf> = existing
            .filter(|v| !v.is_empty())
            .map(|v| std::env::split_paths(&v).collect())
            .unwrap_or_default();
        all.extend(entries);
        std::env::join_paths(all).ok()
    }
}
