use crate::protocol::Source;
use crate::weak_error;
use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source `{0}` not found")]
    NotFound(String),
    #[error("source `{0}` isn't backed by a file")]
    NotAFile(String),
    #[error("write source file {path}: {err}")]
    Write {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

/// Chunk sources seen by the debuggee, in the order they were met.
#[derive(Debug, Default)]
pub struct SourceManager {
    sources: IndexMap<String, Source>,
    string_count: u32,
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines().map(ToString::to_string).collect()
}

impl SourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chunk by its source key. Return true if the key wasn't known yet.
    ///
    /// `@path` keys are files, the file is read right away. `=name` keys are named chunks
    /// without text. Anything else is the chunk text itself.
    pub fn add(&mut self, key: &str) -> bool {
        if self.sources.contains_key(key) {
            return false;
        }

        let source = if let Some(path) = key.strip_prefix('@') {
            let path = PathBuf::from(path);
            let title = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string_lossy().into_owned());
            let lines = weak_error!(fs::read_to_string(&path), "read source file:")
                .map(|text| split_lines(&text))
                .unwrap_or_default();
            Source {
                key: key.to_string(),
                title,
                path: Some(path),
                lines,
            }
        } else if let Some(name) = key.strip_prefix('=') {
            Source {
                key: key.to_string(),
                title: name.to_string(),
                path: None,
                lines: vec![],
            }
        } else {
            self.string_count += 1;
            Source {
                key: key.to_string(),
                title: format!("[string {}]", self.string_count),
                path: None,
                lines: split_lines(key),
            }
        };

        self.sources.insert(key.to_string(), source);
        true
    }

    /// Register a fully described source, replacing a known one with the same key.
    pub fn insert(&mut self, source: Source) {
        self.sources.insert(source.key.clone(), source);
    }

    pub fn get(&self, key: &str) -> Option<&Source> {
        self.sources.get(key)
    }

    /// Find a string chunk by the beginning of its text.
    ///
    /// Lua abbreviates string chunk names in messages, only the prefix survives.
    pub fn get_string(&self, prefix: &str) -> Option<&Source> {
        self.sources
            .values()
            .find(|src| !src.is_file() && src.key.starts_with(prefix))
    }

    /// Find a file source by its path suffix, `main.lua` finds `@scripts/main.lua`.
    pub fn find_file(&self, name: &str) -> Option<&Source> {
        let wanted = Path::new(name);
        self.sources.values().find(|src| {
            src.path
                .as_deref()
                .map(|path| path == wanted || path.ends_with(wanted))
                .unwrap_or(false)
        })
    }

    /// Replace source lines and write them back to the file.
    pub fn save(&mut self, key: &str, lines: Vec<String>) -> Result<(), SourceError> {
        let source = self
            .sources
            .get_mut(key)
            .ok_or_else(|| SourceError::NotFound(key.to_string()))?;
        let path = source
            .path
            .clone()
            .ok_or_else(|| SourceError::NotAFile(key.to_string()))?;

        let mut text = lines.join("\n");
        text.push('\n');
        fs::write(&path, text).map_err(|err| SourceError::Write { path, err })?;
        source.lines = lines;
        Ok(())
    }

    pub fn list(&self) -> impl Iterator<Item = &Source> {
        self.sources.values()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
