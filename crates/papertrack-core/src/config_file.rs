use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub server: Option<ServerConfig>,
    pub cache: Option<CacheConfig>,
    pub display: Option<DisplayConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub api_base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub page_size: Option<usize>,
    pub color: Option<bool>,
}

/// Platform config directory path: `<config_dir>/papertrack/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("papertrack").join("config.toml"))
}

/// Load config by cascading CWD `.papertrack.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(&PathBuf::from(".papertrack.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &PathBuf) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        server: Some(ServerConfig {
            api_base_url: overlay
                .server
                .as_ref()
                .and_then(|s| s.api_base_url.clone())
                .or_else(|| base.server.as_ref().and_then(|s| s.api_base_url.clone())),
            timeout_secs: overlay
                .server
                .as_ref()
                .and_then(|s| s.timeout_secs)
                .or_else(|| base.server.as_ref().and_then(|s| s.timeout_secs)),
        }),
        cache: Some(CacheConfig {
            path: overlay
                .cache
                .as_ref()
                .and_then(|c| c.path.clone())
                .or_else(|| base.cache.as_ref().and_then(|c| c.path.clone())),
        }),
        display: Some(DisplayConfig {
            page_size: overlay
                .display
                .as_ref()
                .and_then(|d| d.page_size)
                .or_else(|| base.display.as_ref().and_then(|d| d.page_size)),
            color: overlay
                .display
                .as_ref()
                .and_then(|d| d.color)
                .or_else(|| base.display.as_ref().and_then(|d| d.color)),
        }),
    }
}

/// Save the current config to the platform config directory.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf, String> {
    let path = config_path().ok_or_else(|| "Could not determine config directory".to_string())?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| format!("Failed to serialize config: {}", e))?;
    std::fs::write(&path, content).map_err(|e| format!("Failed to write config: {}", e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_section_round_trip_toml() {
        let config = ConfigFile {
            server: Some(ServerConfig {
                api_base_url: Some("http://localhost:9000/api".to_string()),
                timeout_secs: Some(3),
            }),
            ..Default::default()
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ConfigFile = toml::from_str(&toml_str).unwrap();
        let server = parsed.server.unwrap();
        assert_eq!(server.api_base_url.unwrap(), "http://localhost:9000/api");
        assert_eq!(server.timeout_secs, Some(3));
    }

    #[test]
    fn cache_path_absent_deserializes_as_none() {
        let toml_str = "[server]\napi_base_url = \"http://h/api\"\n";
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        assert!(parsed.cache.is_none());
    }

    #[test]
    fn merge_overlay_wins() {
        let base = ConfigFile {
            cache: Some(CacheConfig {
                path: Some("/base/cache.db".to_string()),
            }),
            display: Some(DisplayConfig {
                page_size: Some(20),
                color: Some(true),
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            cache: Some(CacheConfig {
                path: Some("/overlay/cache.db".to_string()),
            }),
            display: Some(DisplayConfig {
                page_size: None,
                color: Some(false),
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        assert_eq!(merged.cache.unwrap().path.unwrap(), "/overlay/cache.db");
        let display = merged.display.unwrap();
        assert_eq!(display.page_size, Some(20));
        assert_eq!(display.color, Some(false));
    }

    #[test]
    fn merge_base_preserved_when_overlay_absent() {
        let base = ConfigFile {
            server: Some(ServerConfig {
                api_base_url: Some("http://base/api".to_string()),
                timeout_secs: None,
            }),
            ..Default::default()
        };
        let merged = merge(base, ConfigFile::default());
        assert_eq!(
            merged.server.unwrap().api_base_url.unwrap(),
            "http://base/api"
        );
    }

    #[test]
    fn unparsable_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        assert!(load_from_path(&path).is_none());
    }
}
