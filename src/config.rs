//! Layered host configuration (§12), grounded in the teacher's
//! `cli::config::Config`/`Host` but trimmed to what this core needs: no
//! `compress`/`enc_key` fields, since compression is out of scope and
//! the encryption key is always ephemeral (§3).

use crate::error::{AttachmentError, Result};
use crate::store::s3::credentials::Credentials;
use crate::store::s3::region::Region;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub hosts: BTreeMap<String, HostConfig>,
}

#[derive(Debug, Deserialize)]
pub struct HostConfig {
    pub endpoint: Option<String>,
    pub region: Option<String>,

    #[serde(default)]
    pub access_key: String,

    #[serde(default)]
    pub secret_key: SecretString,

    pub bucket: String,

    /// Where the stash for this host's in-progress multipart uploads
    /// lives on disk, e.g. a `sled` path (§4.2).
    pub stash_path: Option<PathBuf>,
}

impl Config {
    /// Loads a config from an explicit path.
    ///
    /// # Errors
    /// Returns [`AttachmentError::ConfigNotFound`] if the file can't be
    /// opened, or [`AttachmentError::ConfigInvalid`] if it can't be
    /// parsed as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|_| AttachmentError::ConfigNotFound {
            path: path.to_path_buf(),
        })?;
        serde_yaml_ng::from_reader(file).map_err(|source| AttachmentError::ConfigInvalid {
            source: anyhow::Error::new(source),
        })
    }

    /// Loads the config from `$XDG_CONFIG_HOME/attachments/config.yml`
    /// (falling back to the platform config directory via
    /// [`dirs::config_dir`]).
    ///
    /// # Errors
    /// Returns [`AttachmentError::ConfigNotFound`] if no platform config
    /// directory can be determined or the file doesn't exist there.
    pub fn load_default() -> Result<Self> {
        let dir = dirs::config_dir().ok_or(AttachmentError::ConfigNotFound {
            path: PathBuf::from("attachments/config.yml"),
        })?;
        Self::load(dir.join("attachments").join("config.yml"))
    }

    /// Looks up a named host.
    ///
    /// # Errors
    /// Returns [`AttachmentError::HostNotFound`] if `name` isn't
    /// configured.
    pub fn host(&self, name: &str) -> Result<&HostConfig> {
        self.hosts.get(name).ok_or_else(|| AttachmentError::HostNotFound {
            name: name.to_string(),
        })
    }
}

impl HostConfig {
    /// Resolves this host's region, falling back to a [`Region::Custom`]
    /// built from `endpoint` when `region` is absent or unrecognized.
    ///
    /// # Errors
    /// Returns [`AttachmentError::ConfigInvalid`] if neither `region` nor
    /// `endpoint` is set.
    pub fn region(&self) -> Result<Region> {
        if let Some(r) = &self.region {
            return Ok(r.parse::<Region>().unwrap_or_else(|_| Region::Custom {
                name: r.clone(),
                endpoint: r.clone(),
            }));
        }
        let endpoint = self.endpoint.as_ref().ok_or_else(|| AttachmentError::ConfigInvalid {
            source: anyhow::anyhow!("host has neither `region` nor `endpoint`"),
        })?;
        Ok(Region::Custom {
            name: String::new(),
            endpoint: endpoint.clone(),
        })
    }

    /// Resolves credentials, applying the environment-variable overrides
    /// documented on [`Credentials::new`].
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.access_key, &self.secret_key)
    }
}
