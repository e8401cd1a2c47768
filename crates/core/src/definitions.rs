//! File-backed loaders for script and token definitions.
//!
//! A definition named `deploy` lives at `{dir}/deploy.json`,
//! `{dir}/deploy.yaml` or `{dir}/deploy.yml` (searched in that order).
//! Missing files are not errors: the loaders return `Ok(None)`.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::CoreError;
use crate::model::{Script, Token};

/// Extensions searched when resolving a definition by base name.
pub const DEFINITION_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// Whether `name` can be used as a file base name without escaping `dir`.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

/// Locate `{dir}/{base_name}.{ext}` for the first extension that exists.
pub async fn find_by_base_name(dir: &Path, base_name: &str, extensions: &[&str]) -> Option<PathBuf> {
    for ext in extensions {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if tokio::fs::metadata(&candidate)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return Some(candidate);
        }
    }
    None
}

/// Generic loader for definitions stored one per file in a directory.
#[derive(Debug, Clone)]
pub struct FileDefinitionLoader {
    dir: PathBuf,
}

impl FileDefinitionLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load and deserialize the definition named `name`.
    pub async fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, CoreError> {
        if !is_safe_name(name) {
            tracing::debug!(name, "Rejected unsafe definition name");
            return Ok(None);
        }

        let Some(path) = find_by_base_name(&self.dir, name, DEFINITION_EXTENSIONS).await else {
            return Ok(None);
        };

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            // Removed between lookup and read.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CoreError::Internal(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        let parsed = if is_json {
            serde_json::from_str(&contents).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&contents).map_err(|e| e.to_string())
        };

        parsed.map(Some).map_err(|e| {
            CoreError::Internal(format!("Invalid definition {}: {e}", path.display()))
        })
    }
}

/// Loads [`Script`] definitions by script name.
#[derive(Debug, Clone)]
pub struct ScriptLoader(FileDefinitionLoader);

impl ScriptLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self(FileDefinitionLoader::new(dir))
    }

    pub async fn load(&self, name: &str) -> Result<Option<Script>, CoreError> {
        let script: Option<Script> = self.0.load(name).await?;
        Ok(script.map(|mut s| {
            s.name = name.to_string();
            s
        }))
    }
}

/// Loads [`Token`] definitions by token identifier.
#[derive(Debug, Clone)]
pub struct TokenLoader(FileDefinitionLoader);

impl TokenLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self(FileDefinitionLoader::new(dir))
    }

    pub async fn load(&self, token_id: &str) -> Result<Option<Token>, CoreError> {
        self.0.load(token_id).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
