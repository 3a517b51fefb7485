//! Reading and writing pipeline config files
//!
//! Saves never leave a half-written file behind: the new contents go to a
//! temporary file in the same directory, which then replaces the old file.
//! The replaced file is kept next to it as `<name>.toml.backup`.

use crate::{Config, ConfigError, ConfigResult, CONFIG_VERSION};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A config file on disk
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the config file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses and validates config text
    pub fn from_toml_str(text: &str) -> ConfigResult<Config> {
        checked(toml::from_str(text)?)
    }

    /// Renders a config as TOML
    pub fn to_toml_string(config: &Config) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(config)?)
    }

    /// Reads the config file
    ///
    /// A missing file yields [`Config::default()`]. A blank, malformed or
    /// invalid file is an error; it is never silently replaced by defaults.
    pub fn load(&self) -> ConfigResult<Config> {
        let Some(text) = self.read()? else {
            log::info!("No config at {}, using the default pipeline", self.path.display());
            return Ok(Config::default());
        };

        let config = toml::from_str(&text).map_err(|source| ConfigError::ParseError {
            path: self.path.clone(),
            source,
        })?;

        checked(config).inspect_err(|e| {
            log::warn!("Rejected config at {}: {}", self.path.display(), e);
        })
    }

    /// Like [`ConfigLoader::load`], but any failure falls back to the default
    pub fn load_or_default(&self) -> Config {
        self.load().unwrap_or_else(|e| {
            log::warn!("{}; falling back to the default pipeline", e);
            Config::default()
        })
    }

    /// Validates and writes the config
    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        config
            .validate()
            .map_err(|errors| ConfigError::from_validation(&errors))?;

        let text = Self::to_toml_string(config)?;
        let dir = self.directory()?;
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|source| ConfigError::DirectoryCreationError {
                path: dir.clone(),
                source,
            })?;
            log::info!("Created {}", dir.display());
        }

        self.keep_backup()?;
        self.replace_with(&dir, &text)?;
        log::info!(
            "Wrote {} policies to {}",
            config.pipeline.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Reads the config, applies `edit` and writes it back
    ///
    /// Nothing is written if the edited config fails validation.
    pub fn update<F>(&self, edit: F) -> ConfigResult<Config>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.load()?;
        edit(&mut config);
        self.save(&config)?;
        Ok(config)
    }

    fn read(&self) -> ConfigResult<Option<String>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::ReadError {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if text.trim().is_empty() {
            return Err(ConfigError::ReadError {
                path: self.path.clone(),
                source: io::Error::new(io::ErrorKind::InvalidData, "file is blank"),
            });
        }
        Ok(Some(text))
    }

    fn directory(&self) -> ConfigResult<PathBuf> {
        match self.path.parent() {
            Some(parent) if parent.as_os_str().is_empty() => Ok(PathBuf::from(".")),
            Some(parent) => Ok(parent.to_path_buf()),
            None => Err(ConfigError::PathResolutionError {
                reason: format!("{} has no parent directory", self.path.display()),
            }),
        }
    }

    fn keep_backup(&self) -> ConfigResult<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let backup = self.path.with_extension("toml.backup");
        fs::copy(&self.path, &backup).map_err(|source| ConfigError::BackupError { source })?;
        log::debug!("Previous config kept at {}", backup.display());
        Ok(())
    }

    fn replace_with(&self, dir: &Path, text: &str) -> ConfigResult<()> {
        let mut staged = NamedTempFile::new_in(dir)?;
        staged.write_all(text.as_bytes())?;
        staged.flush()?;
        staged
            .persist(&self.path)
            .map_err(|e| ConfigError::WriteError {
                path: self.path.clone(),
                source: e.error,
            })?;
        Ok(())
    }
}

/// Warns on a foreign version and validates every section
fn checked(config: Config) -> ConfigResult<Config> {
    if config.version != CONFIG_VERSION {
        log::warn!(
            "Config declares version {}, this build reads version {}",
            config.version,
            CONFIG_VERSION
        );
    }
    config
        .validate()
        .map_err(|errors| ConfigError::from_validation(&errors))?;
    Ok(config)
}
