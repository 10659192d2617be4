use super::SecretBundle;
use crate::util::{ensure_https, write_atomic};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Keys owned by the deployment, in the order they are written.
pub const ENV_KEYS: [&str; 5] = [
    "OPENAI_API_BASE",
    "OPENAI_API_KEY",
    "OPENAI_API_VERSION",
    "OPENAI_DEPLOYMENT_NAME",
    "DATABRICKS_WORKSPACE_URL",
];

const WORKSPACE_URL_KEY: &str = "DATABRICKS_WORKSPACE_URL";

/// Parse `KEY=value` lines, skipping blanks, comments, and lines without `=`.
///
/// A missing file reads as empty.
pub fn read_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();
    if !path.exists() {
        return Ok(values);
    }
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    for line in text.lines() {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            values.insert(key.to_string(), value.to_string());
        }
    }
    Ok(values)
}

/// Render recognized keys first in canonical order, then the rest sorted.
pub fn render_env(values: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for key in ENV_KEYS {
        if let Some(value) = values.get(key) {
            out.push_str(&format!("{key}={value}\n"));
        }
    }
    for (key, value) in values {
        if !ENV_KEYS.contains(&key.as_str()) {
            out.push_str(&format!("{key}={value}\n"));
        }
    }
    out
}

/// Merge the present values of `bundle` into the env file at `path`.
///
/// Absent values leave existing entries untouched; the workspace URL gains an
/// `https://` scheme when it has none. Nothing is written when the merged
/// file would be empty.
pub fn write_env_file(path: &Path, bundle: &SecretBundle) -> Result<()> {
    let mut values = read_env_file(path)?;
    for (key, value) in bundle.entries() {
        let Some(value) = value else {
            continue;
        };
        let value = if key == WORKSPACE_URL_KEY {
            ensure_https(value)
        } else {
            value.to_string()
        };
        values.insert(key.to_string(), value);
    }
    if values.is_empty() {
        return Ok(());
    }
    write_atomic(path, render_env(&values).as_bytes())?;
    tracing::info!(path = %path.display(), keys = values.len(), "updated env file");
    Ok(())
}
