//! TOML configuration.
//!
//! A single settings file drives the database location, the upload directory
//! and file policy, chunking defaults, and the HTTP bind address. Every
//! command loads it through [`load_config`], which also rejects settings the
//! pipeline cannot run with.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    pub db: DbConfig,
    pub files: FilesConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_app_version")]
    pub version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
        }
    }
}

fn default_app_name() -> String {
    "docchunk".to_string()
}
fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Upload storage and validation policy.
#[derive(Debug, Deserialize, Clone)]
pub struct FilesConfig {
    /// Root directory; each project gets a subdirectory named after its `project_id`.
    pub dir: PathBuf,
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,
    /// Size of each piece written to disk while streaming an upload.
    #[serde(default = "default_read_buffer_bytes")]
    pub read_buffer_bytes: usize,
}

impl FilesConfig {
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb * 1024 * 1024
    }
}

fn default_allowed_types() -> Vec<String> {
    vec!["text/plain".to_string(), "text/markdown".to_string()]
}
fn default_max_size_mb() -> u64 {
    10
}
fn default_read_buffer_bytes() -> usize {
    512_000
}

/// Defaults used when a process request omits its window parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap_size")]
    pub overlap_size: usize,
    /// Records per insert sub-batch.
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap_size: default_overlap_size(),
            insert_batch_size: default_insert_batch_size(),
        }
    }
}

fn default_chunk_size() -> usize {
    100
}
fn default_overlap_size() -> usize {
    20
}
fn default_insert_batch_size() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap_size >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.overlap_size ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.overlap_size,
            config.chunking.chunk_size
        );
    }
    if config.chunking.insert_batch_size == 0 {
        anyhow::bail!("chunking.insert_batch_size must be > 0");
    }

    // Validate files
    if config.files.max_size_mb == 0 {
        anyhow::bail!("files.max_size_mb must be > 0");
    }
    if config.files.read_buffer_bytes == 0 {
        anyhow::bail!("files.read_buffer_bytes must be > 0");
    }
    if config.files.allowed_types.is_empty() {
        anyhow::bail!("files.allowed_types must list at least one content type");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    const MINIMAL: &str = r#"
[db]
path = "./data/docchunk.sqlite"

[files]
dir = "./data/files"

[server]
bind = "127.0.0.1:7440"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(MINIMAL).unwrap();
        assert_eq!(config.app.name, "docchunk");
        assert_eq!(config.chunking.chunk_size, 100);
        assert_eq!(config.chunking.overlap_size, 20);
        assert_eq!(config.chunking.insert_batch_size, 100);
        assert_eq!(config.files.max_size_bytes(), 10 * 1024 * 1024);
        assert!(config.files.allowed_types.contains(&"text/plain".to_string()));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let toml_str = format!("{}\n[chunking]\nchunk_size = 10\noverlap_size = 10\n", MINIMAL);
        let err = parse(&toml_str).unwrap_err();
        assert!(err.to_string().contains("overlap_size"));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let toml_str = format!("{}\n[chunking]\ninsert_batch_size = 0\n", MINIMAL);
        assert!(parse(&toml_str).is_err());
    }

    #[test]
    fn test_empty_allowed_types_rejected() {
        let toml_str = MINIMAL.replace(
            "dir = \"./data/files\"",
            "dir = \"./data/files\"\nallowed_types = []",
        );
        assert!(parse(&toml_str).is_err());
    }
}
