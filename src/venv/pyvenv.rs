use crate::core::error::{LauncherError, Result};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

/// Parsed `pyvenv.cfg`: flat `key = value` lines written by `venv`, `virtualenv` and `uv`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PyVenvCfg {
    entries: BTreeMap<String, String>,
}

impl PyVenvCfg {
    /// Returns `Ok(None)` when the file does not exist.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LauncherError::ActivationFailed(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Self::parse(&content).map(Some)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut entries = BTreeMap::new();

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                LauncherError::ActivationFailed(format!(
                    "malformed pyvenv.cfg line {}: {:?}",
                    index + 1,
                    raw
                ))
            })?;

            let key = key.trim().to_ascii_lowercase();
            if key.is_empty() {
                return Err(LauncherError::ActivationFailed(format!(
                    "malformed pyvenv.cfg line {}: missing key",
                    index + 1
                )));
            }

            entries.insert(key, unquote(value.trim()).to_string());
        }

        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn prompt(&self) -> Option<&str> {
        self.get("prompt")
    }

    /// Interpreter version; `venv` writes `version`, `uv` writes `version_info`.
    pub fn version(&self) -> Option<&str> {
        self.get("version").or_else(|| self.get("version_info"))
    }

    pub(crate) fn home(&self) -> Option<&str> {
        self.get("home")
    }
}

// `venv` writes the prompt with Python's repr, so it arrives single-quoted.
fn unquote(value: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
