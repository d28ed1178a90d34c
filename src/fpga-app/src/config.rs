// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Shared `fpga-rs.toml` loading. Each binary owns one `[section]`.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "fpga-rs.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),
}

/// Default search order: current directory, then XDG config, then /etc.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("fpga-rs").join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from("/etc/fpga-rs").join(CONFIG_FILE_NAME));
    paths
}

/// `Ok(None)` when the file has no `[key]` section.
fn load_section_from_file<T: DeserializeOwned>(
    path: &Path,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
    parse_section(&content, key).map_err(|e| ConfigError::ParseError(path.to_path_buf(), e))
}

fn parse_section<T: DeserializeOwned>(content: &str, key: &str) -> Result<Option<T>, String> {
    let table: toml::Table = toml::from_str(content).map_err(|e| e.to_string())?;
    let Some(section) = table.get(key) else {
        return Ok(None);
    };
    // Round-trip through text so serde defaults apply to the section alone.
    let section_toml = toml::to_string(section).map_err(|e| e.to_string())?;
    toml::from_str::<T>(&section_toml)
        .map(Some)
        .map_err(|e| e.to_string())
}

/// A binary's configuration section in `fpga-rs.toml`.
pub trait ConfigFile: Sized + Default + DeserializeOwned {
    /// Section key, e.g. `"fpga-ctl"`.
    fn section_key() -> &'static str;

    /// Load from an explicit path; the section must be present.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        load_section_from_file::<Self>(path, Self::section_key())?.ok_or_else(|| {
            ConfigError::ParseError(
                path.to_path_buf(),
                format!("missing [{}] section", Self::section_key()),
            )
        })
    }

    /// Load the first default-path file holding the section, or defaults.
    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        Self::load_from_paths(&config_search_paths())
    }

    fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in paths {
            if path.exists() {
                if let Some(cfg) = load_section_from_file::<Self>(path, Self::section_key())? {
                    return Ok((cfg, Some(path.clone())));
                }
            }
        }
        Ok((Self::default(), None))
    }

    /// `--config` wins; otherwise search the default paths.
    fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        match explicit {
            Some(path) => Ok((Self::load_from_file(path)?, Some(path.to_path_buf()))),
            None => Self::load_from_default_paths(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        name: String,
        depth: u32,
    }

    impl ConfigFile for Sample {
        fn section_key() -> &'static str {
            "sample"
        }
    }

    fn write_file(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_section_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "[sample]\nname = \"board\"\n\n[other]\nx = 1\n");

        let cfg = Sample::load_from_file(&path).unwrap();
        assert_eq!(
            cfg,
            Sample {
                name: "board".into(),
                depth: 0
            }
        );
    }

    #[test]
    fn test_missing_section_is_error_for_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "[other]\nx = 1\n");

        let err = Sample::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("missing [sample] section"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "[sample\nname = ");

        match Sample::load_from_file(&path) {
            Err(ConfigError::ParseError(p, _)) => assert_eq!(p, path),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_search_skips_files_without_section() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let a = write_file(&first, "[other]\nx = 1\n");
        let b = write_file(&second, "[sample]\ndepth = 7\n");
        let missing = first.path().join("nope.toml");

        let (cfg, found) = Sample::load_from_paths(&[missing, a, b.clone()]).unwrap();
        assert_eq!(cfg.depth, 7);
        assert_eq!(found, Some(b));
    }

    #[test]
    fn test_defaults_when_nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, found) = Sample::load_from_paths(&[dir.path().join("absent.toml")]).unwrap();
        assert_eq!(cfg, Sample::default());
        assert!(found.is_none());
    }

    #[test]
    fn test_read_error() {
        let err = Sample::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError(_, _)));
    }

    #[test]
    fn test_every_error_names_its_file() {
        fn file_of(err: &ConfigError) -> &Path {
            match err {
                ConfigError::ReadError(path, _) | ConfigError::ParseError(path, _) => path,
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let unreadable = dir.path().join("absent.toml");
        let err = Sample::load(Some(unreadable.as_path())).unwrap_err();
        assert_eq!(file_of(&err), unreadable.as_path());

        let no_section = write_file(&dir, "[other]\nx = 1\n");
        let err = Sample::load_from_file(&no_section).unwrap_err();
        assert_eq!(file_of(&err), no_section.as_path());
    }
}
