use anyhow::Context;
use std::{
    borrow::Cow,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{error, info, warn};

use crate::config::{PatternConfig, clash::ClashConfig};
use crate::error::LoadError;

const YAML_HEADER: &str = "# YAML Starting...";

/// Prepends a comment line unless the text already starts with one.
pub fn with_header(text: &str) -> Cow<'_, str> {
    if text.starts_with('#') {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("{YAML_HEADER}\n{text}"))
    }
}

pub fn parse_document(text: &str, path: &Path) -> Result<ClashConfig, LoadError> {
    if text.trim().is_empty() {
        return Err(LoadError::Empty(path.to_path_buf()));
    }

    serde_yaml::from_str(&with_header(text)).map_err(|source| LoadError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

pub async fn read_document(path: &Path) -> Result<ClashConfig, LoadError> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }
        Err(source) => {
            return Err(LoadError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    parse_document(&text, path)
}

/// Loads a document, logging and returning `None` on any failure.
pub async fn load_document(path: &Path) -> Option<ClashConfig> {
    match read_document(path).await {
        Ok(config) => {
            info!(
                "Loaded {} ({} proxies, {} groups, {} rules)",
                path.display(),
                config.proxy_list().len(),
                config.group_list().len(),
                config.rule_list().len()
            );
            Some(config)
        }
        Err(e) => {
            error!("Failed to load document: {}", e);
            None
        }
    }
}

pub async fn write_document(config: &ClashConfig, path: &Path) -> anyhow::Result<()> {
    let text = serde_yaml::to_string(config).context("Failed to serialize document")?;
    tokio::fs::write(path, text)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Saves a document, logging failures. Returns whether the file was written.
pub async fn save_document(config: &ClashConfig, path: &Path) -> bool {
    match write_document(config, path).await {
        Ok(_) => {
            info!("Merged configuration saved to: {}", path.display());
            true
        }
        Err(e) => {
            error!("{:#}", e);
            false
        }
    }
}

/// Reads the cleanup sidecar. A missing or broken file means no patterns.
pub async fn load_patterns(path: &Path) -> PatternConfig {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No cleanup patterns at {}", path.display());
            return PatternConfig::default();
        }
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            return PatternConfig::default();
        }
    };

    if text.trim().is_empty() {
        return PatternConfig::default();
    }

    match serde_yaml::from_str::<PatternConfig>(&with_header(&text)) {
        Ok(patterns) => {
            info!(
                "Loaded {} remove and {} replace patterns from {}",
                patterns.remove.len(),
                patterns.replace.len(),
                path.display()
            );
            patterns
        }
        Err(e) => {
            warn!("Ignoring malformed patterns file {}: {}", path.display(), e);
            PatternConfig::default()
        }
    }
}

/// Reads a newline separated list of file names, e.g. piped in from a shell.
pub async fn read_file_list<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<Vec<PathBuf>> {
    let mut contents = String::new();
    reader.read_to_string(&mut contents).await?;

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(PathBuf::from)
        .collect())
}
