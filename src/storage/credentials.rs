use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{
    config::{ApiKeys, Provider},
    error::{Result, WorkbenchError},
};

pub const API_KEYS_FILE: &str = "api-keys.json";
/// Single OpenAI key stored as plain text by older releases.
pub const LEGACY_API_KEY_FILE: &str = "api-key";

/// Per-provider API keys kept outside any project directory.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `WORKBENCH_CONFIG_DIR`, falling back to `.image-workbench` in the working directory.
    pub fn from_env() -> Self {
        let dir = env::var("WORKBENCH_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".image-workbench"));
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn keys_path(&self) -> PathBuf {
        self.dir.join(API_KEYS_FILE)
    }

    fn legacy_path(&self) -> PathBuf {
        self.dir.join(LEGACY_API_KEY_FILE)
    }

    /// Reads stored keys. A legacy single key is moved into the map on the way.
    pub fn load(&self) -> Result<ApiKeys> {
        let keys_path = self.keys_path();
        if keys_path.exists() {
            let content = fs::read_to_string(&keys_path)?;
            let keys: ApiKeys = serde_json::from_str(&content).map_err(|e| {
                WorkbenchError::CredentialError(format!(
                    "failed to parse {}: {}",
                    keys_path.display(),
                    e
                ))
            })?;
            if !keys.is_empty() {
                return Ok(keys);
            }
        }

        let legacy_path = self.legacy_path();
        if legacy_path.exists() {
            let legacy = fs::read_to_string(&legacy_path)?;
            let keys = ApiKeys::new().with_key(Provider::OpenAi, legacy.trim());
            if !keys.is_empty() {
                log::info!("🔑 Migrating legacy OpenAI key into {}", API_KEYS_FILE);
                self.save(&keys)?;
            }
            fs::remove_file(&legacy_path)?;
            return Ok(keys);
        }

        Ok(ApiKeys::new())
    }

    pub fn save(&self, keys: &ApiKeys) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.keys_path(), serde_json::to_string_pretty(keys)?)?;
        log::debug!("API keys written to {}", self.keys_path().display());
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        for path in [self.keys_path(), self.legacy_path()] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}
