use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    error::{Context, Error, Result},
    schema::PionConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["pion.toml", "pion.yaml", "pion.yml", "pion.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<PionConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./pion.{toml,yaml,yml,json}` (project-local)
/// 2. `<user config dir>/pion.{toml,yaml,yml,json}` (user-global)
///
/// Returns `PionConfig::default()` if no config file is found or the file
/// cannot be parsed.
pub fn discover_and_load() -> PionConfig {
    discover_in(Path::new("."))
}

fn discover_in(project_dir: &Path) -> PionConfig {
    if let Some(path) = find_config_file(project_dir) {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    PionConfig::default()
}

fn find_config_file(project_dir: &Path) -> Option<PathBuf> {
    let candidates = std::iter::once(project_dir.to_path_buf()).chain(config_dir());
    for dir in candidates {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }
    None
}

/// Returns the user-global config directory (`~/.config/pion/` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "pion").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> Result<PionConfig> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .with_context(|| format!("{} has no file extension", path.display()))?;

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::UnsupportedFormat {
            extension: ext.to_string(),
        }),
    }
}
