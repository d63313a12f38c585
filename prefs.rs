/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Editor preferences: defaults, optional TOML file, environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::model::clipboard::DEFAULT_PASTE_OFFSET;
use crate::model::history::DEFAULT_HISTORY_LIMIT;

pub const API_URL_ENV: &str = "CHANNELBOARD_API_URL";
pub const LIVE_URL_ENV: &str = "CHANNELBOARD_LIVE_URL";
pub const TOKEN_ENV: &str = "CHANNELBOARD_TOKEN";

const PREFS_DIR_NAME: &str = "channelboard";
const PREFS_FILE_NAME: &str = "prefs.toml";

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid url '{value}': {source}")]
    Url {
        value: String,
        source: url::ParseError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorPreferences {
    pub api_url: String,
    pub live_url: String,
    pub token: Option<String>,
    pub history_limit: usize,
    pub paste_offset: f32,
    pub log_filter: String,
}

impl Default for EditorPreferences {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000/api/v1".to_string(),
            live_url: "ws://localhost:3000/live".to_string(),
            token: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
            paste_offset: DEFAULT_PASTE_OFFSET,
            log_filter: "info".to_string(),
        }
    }
}

impl EditorPreferences {
    /// `<config_dir>/channelboard/prefs.toml`, when the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(PREFS_DIR_NAME).join(PREFS_FILE_NAME))
    }

    /// Load from `explicit`, else the default path, else defaults, then apply
    /// environment overrides. A missing file is not an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, PrefsError> {
        let path = explicit.map(Path::to_path_buf).or_else(Self::default_path);
        let mut prefs = match path {
            Some(path) => Self::from_file(&path)?.unwrap_or_default(),
            None => Self::default(),
        };
        prefs.apply_overrides(|key| std::env::var(key).ok());
        Ok(prefs)
    }

    /// Parse a preferences file. `Ok(None)` when it does not exist.
    pub fn from_file(path: &Path) -> Result<Option<Self>, PrefsError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("prefs: {} not found, using defaults", path.display());
                return Ok(None);
            },
            Err(source) => {
                return Err(PrefsError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            },
        };
        toml::from_str(&text).map(Some).map_err(|source| PrefsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(API_URL_ENV) {
            self.api_url = value;
        }
        if let Some(value) = lookup(LIVE_URL_ENV) {
            self.live_url = value;
        }
        if let Some(value) = lookup(TOKEN_ENV).filter(|value| !value.is_empty()) {
            self.token = Some(value);
        }
    }

    pub fn api_url(&self) -> Result<Url, PrefsError> {
        parse_url(&self.api_url)
    }

    pub fn live_url(&self) -> Result<Url, PrefsError> {
        parse_url(&self.live_url)
    }
}

fn parse_url(value: &str) -> Result<Url, PrefsError> {
    Url::parse(value).map_err(|source| PrefsError::Url {
        value: value.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = EditorPreferences::from_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, None);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PREFS_FILE_NAME);
        std::fs::write(&path, "history_limit = 16\nlog_filter = \"debug\"\n").unwrap();

        let prefs = EditorPreferences::from_file(&path).unwrap().unwrap();
        assert_eq!(prefs.history_limit, 16);
        assert_eq!(prefs.log_filter, "debug");
        assert_eq!(prefs.paste_offset, 50.0);
        assert_eq!(prefs.api_url, EditorPreferences::default().api_url);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PREFS_FILE_NAME);
        std::fs::write(&path, "history_limit = \"many\"").unwrap();
        assert!(matches!(
            EditorPreferences::from_file(&path),
            Err(PrefsError::Parse { .. })
        ));
    }

    #[test]
    fn environment_overrides_win() {
        let mut prefs = EditorPreferences::default();
        prefs.apply_overrides(|key| match key {
            LIVE_URL_ENV => Some("wss://live.example.com/ws".to_string()),
            TOKEN_ENV => Some("secret".to_string()),
            _ => None,
        });
        assert_eq!(prefs.live_url().unwrap().scheme(), "wss");
        assert_eq!(prefs.token.as_deref(), Some("secret"));
        assert_eq!(prefs.api_url, EditorPreferences::default().api_url);
    }

    #[test]
    fn invalid_url_is_reported() {
        let prefs = EditorPreferences {
            api_url: "not a url".into(),
            ..EditorPreferences::default()
        };
        assert!(matches!(prefs.api_url(), Err(PrefsError::Url { .. })));
    }
}
