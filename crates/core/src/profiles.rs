use std::env;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_DIR_ENV: &str = "DBADMIN_CONFIG_DIR";
pub const PASSWORD_ENV: &str = "DBADMIN_DB_PASSWORD";
pub const PROFILES_FILE_NAME: &str = "profiles.toml";

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    Disabled,
    #[default]
    Prefer,
    Require,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PasswordSource {
    #[default]
    EnvVar,
    Keyring,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    pub database: Option<String>,
    #[serde(default)]
    pub password_source: PasswordSource,
    #[serde(default)]
    pub keyring_service: Option<String>,
    #[serde(default)]
    pub keyring_account: Option<String>,
    #[serde(default)]
    pub tls_mode: TlsMode,
    #[serde(default)]
    pub tls_ca_cert_path: Option<String>,
    #[serde(default)]
    pub read_only: bool,
}

fn default_port() -> u16 {
    3306
}

impl ConnectionProfile {
    #[must_use]
    pub fn new(name: impl Into<String>, host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: default_port(),
            user: user.into(),
            database: None,
            password_source: PasswordSource::EnvVar,
            keyring_service: None,
            keyring_account: None,
            tls_mode: TlsMode::Prefer,
            tls_ca_cert_path: None,
            read_only: false,
        }
    }

    /// Used when no profiles file exists and nothing was given on the command line.
    #[must_use]
    pub fn local_default() -> Self {
        let mut profile = Self::new("local", "localhost", "root");
        profile.database = Some("movie_theatre".to_string());
        profile
    }
}

#[derive(Debug, Error)]
pub enum ProfilesError {
    #[error("config directory is unavailable for this platform")]
    ConfigDirUnavailable,
    #[error("failed to read profiles file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse profiles file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no profile named `{0}`")]
    UnknownProfile(String),
}

#[derive(Debug, Default, Deserialize)]
struct ProfilesDocument {
    #[serde(default)]
    profiles: Vec<ConnectionProfile>,
}

#[derive(Debug, Clone)]
pub struct FileProfilesStore {
    profiles: Vec<ConnectionProfile>,
}

impl FileProfilesStore {
    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, ProfilesError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                profiles: Vec::new(),
            });
        }

        let raw = fs::read_to_string(&path).map_err(|source| ProfilesError::Read {
            path: path.clone(),
            source,
        })?;

        let doc: ProfilesDocument = if raw.trim().is_empty() {
            ProfilesDocument::default()
        } else {
            toml::from_str(&raw).map_err(|source| ProfilesError::Parse {
                path: path.clone(),
                source,
            })?
        };

        Ok(Self {
            profiles: doc.profiles,
        })
    }

    #[must_use]
    pub fn profiles(&self) -> &[ConnectionProfile] {
        &self.profiles
    }

    #[must_use]
    pub fn profile(&self, name: &str) -> Option<&ConnectionProfile> {
        self.profiles.iter().find(|profile| profile.name == name)
    }

    /// Picks the named profile, or the first one in file order. Falls back to
    /// [`ConnectionProfile::local_default`] only when the file has none and no
    /// name was requested.
    pub fn select(&self, name: Option<&str>) -> Result<ConnectionProfile, ProfilesError> {
        match name {
            Some(name) => self
                .profile(name)
                .cloned()
                .ok_or_else(|| ProfilesError::UnknownProfile(name.to_string())),
            None => Ok(self
                .profiles
                .first()
                .cloned()
                .unwrap_or_else(ConnectionProfile::local_default)),
        }
    }
}

pub fn config_dir() -> Result<PathBuf, ProfilesError> {
    if let Some(custom) = env::var_os(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(custom));
    }

    let base_dir = if cfg!(target_os = "windows") {
        env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or(ProfilesError::ConfigDirUnavailable)?
    } else if let Some(xdg_config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config_home)
    } else {
        let home = env::var_os("HOME").ok_or(ProfilesError::ConfigDirUnavailable)?;
        PathBuf::from(home).join(".config")
    };

    Ok(base_dir.join("dbadmin"))
}
