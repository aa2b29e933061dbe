//! Benchmark sources: JSON mapping of source id -> { displayName, endpointUrl, color, enabled }.
//! Stored under $XDG_CONFIG_HOME/benchwatch/sources.json (fallback: platform config dir).

use ratatui::style::Color;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use crate::error::SourcesError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceEntry {
    pub display_name: String,
    pub endpoint_url: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_color() -> String {
    "white".into()
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SourcesFile {
    #[serde(default)]
    pub sources: BTreeMap<String, SourceEntry>,
    #[serde(default)]
    pub version: u32,
}

impl SourcesFile {
    /// The three reference runtimes on their default ports.
    pub fn defaults() -> Self {
        let entry = |name: &str, port: u16, color: &str| SourceEntry {
            display_name: name.into(),
            endpoint_url: format!("http://localhost:{port}/benchmark"),
            color: color.into(),
            enabled: true,
        };
        let mut sources = BTreeMap::new();
        sources.insert("deno".into(), entry("Deno", 8000, "#1976d2"));
        sources.insert("node".into(), entry("Node.js", 8001, "#388e3c"));
        sources.insert("nest".into(), entry("NestJS", 8002, "#e53935"));
        Self {
            sources,
            version: 1,
        }
    }

    pub fn to_configs(&self) -> Vec<SourceConfig> {
        self.sources
            .iter()
            .map(|(id, e)| SourceConfig {
                id: id.clone(),
                display_name: e.display_name.clone(),
                endpoint_url: e.endpoint_url.clone(),
                color: e.color.clone(),
                enabled: e.enabled,
            })
            .collect()
    }
}

/// One source as the dashboard uses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub id: String,
    pub display_name: String,
    pub endpoint_url: String,
    pub color: String,
    pub enabled: bool,
}

impl SourceConfig {
    pub fn color(&self) -> Color {
        self.color.parse().unwrap_or(Color::White)
    }
}

pub fn config_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("benchwatch")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("benchwatch")
    }
}

pub fn sources_path() -> PathBuf {
    config_dir().join("sources.json")
}

/// Load `path` (or the default location). A missing file yields the built-in
/// defaults; an unreadable or malformed one is an error.
pub fn load_sources(path: Option<&Path>) -> Result<SourcesFile, SourcesError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(sources_path);
    let text = match fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no sources file, using defaults");
            return Ok(SourcesFile::defaults());
        }
        Err(source) => {
            return Err(SourcesError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };
    serde_json::from_str(&text).map_err(|source| SourcesError::Parse {
        path: path.display().to_string(),
        source,
    })
}

pub fn save_sources(path: Option<&Path>, file: &SourcesFile) -> Result<PathBuf, SourcesError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(sources_path);
    let io_err = |source| SourcesError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let data = serde_json::to_vec_pretty(file).map_err(|source| SourcesError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    fs::write(&path, data).map_err(io_err)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_three_ports() {
        let d = SourcesFile::defaults();
        let urls: Vec<&str> = d.sources.values().map(|e| e.endpoint_url.as_str()).collect();
        assert_eq!(urls.len(), 3);
        for port in ["8000", "8001", "8002"] {
            assert!(urls.iter().any(|u| u.contains(port)), "{port}");
        }
        assert!(d.sources.values().all(|e| e.enabled));
    }

    #[test]
    fn parses_camel_case_and_fills_defaults() {
        let json = r##"{"sources":{"a":{"displayName":"A","endpointUrl":"http://h:1/benchmark"}}}"##;
        let f: SourcesFile = serde_json::from_str(json).unwrap();
        let a = &f.sources["a"];
        assert_eq!(a.display_name, "A");
        assert!(a.enabled);
        assert_eq!(f.to_configs()[0].color(), Color::White);
    }

    #[test]
    fn hex_and_named_colors() {
        let mut c = SourcesFile::defaults().to_configs().remove(0);
        c.color = "#1976d2".into();
        assert_eq!(c.color(), Color::Rgb(0x19, 0x76, 0xd2));
        c.color = "red".into();
        assert_eq!(c.color(), Color::Red);
        c.color = "not-a-color".into();
        assert_eq!(c.color(), Color::White);
    }

    #[test]
    fn missing_file_gives_defaults_and_bad_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("sources.json");
        assert_eq!(load_sources(Some(&p)).unwrap(), SourcesFile::defaults());
        fs::write(&p, "{oops").unwrap();
        assert!(matches!(
            load_sources(Some(&p)),
            Err(SourcesError::Parse { .. })
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("nested").join("sources.json");
        let mut f = SourcesFile::defaults();
        if let Some(e) = f.sources.get_mut("node") {
            e.enabled = false;
        }
        save_sources(Some(&p), &f).unwrap();
        assert_eq!(load_sources(Some(&p)).unwrap(), f);
    }
}
