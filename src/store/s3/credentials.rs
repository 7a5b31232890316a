//! Kept close to the teacher's `s3::credentials::Credentials`: environment
//! variables take priority over configured values so temporary overrides
//! work in CI without editing a config file.

use secrecy::{ExposeSecret, SecretString};
use std::env;

#[derive(Clone, Debug)]
pub struct Credentials {
    key: String,
    secret: SecretString,
}

impl Credentials {
    /// Creates credentials with the following priority:
    /// 1. `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` environment variables.
    /// 2. The passed-in `access`/`secret` values.
    #[must_use]
    pub fn new(access: &str, secret: &SecretString) -> Self {
        let access_key = env::var("AWS_ACCESS_KEY_ID").unwrap_or_else(|_| access.to_string());
        let secret_key = env::var("AWS_SECRET_ACCESS_KEY")
            .unwrap_or_else(|_| secret.expose_secret().to_string());
        Self {
            key: access_key,
            secret: SecretString::new(secret_key.into()),
        }
    }

    #[must_use]
    pub fn aws_access_key_id(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn aws_secret_access_key(&self) -> &str {
        self.secret.expose_secret()
    }
}
