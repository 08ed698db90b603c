//! Store credentials read from the AWS config file.

use crate::errors::CredentialsError;
use regex::Regex;
use std::{
    env, fmt,
    path::{Path, PathBuf},
    sync::LazyLock,
};

/// Environment variable naming the credentials file.
pub const CONFIG_FILE_ENV: &str = "AWS_CONFIG_FILE";

static ACCESS_KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"aws_access_key_id\s*=\s*(\S+)").expect("access key pattern compiles")
});
static SECRET_KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"aws_secret_access_key\s*=\s*(\S+)").expect("secret key pattern compiles")
});

/// Access key / secret key pair. The secret never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    secret_key: Vec<u8>,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<Vec<u8>>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn secret_key(&self) -> &[u8] {
        &self.secret_key
    }

    /// Load from the file named by `AWS_CONFIG_FILE`.
    pub fn from_env() -> Result<Self, CredentialsError> {
        let path = env::var_os(CONFIG_FILE_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .ok_or(CredentialsError::MissingEnv(CONFIG_FILE_ENV))?;
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self, CredentialsError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CredentialsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).ok_or_else(|| CredentialsError::Invalid(path.to_path_buf()))
    }

    /// Extract both keys from an AWS-style config file. Returns `None` unless
    /// both keys are present.
    pub fn parse(contents: &str) -> Option<Self> {
        let key = ACCESS_KEY_PATTERN.captures(contents)?.get(1)?.as_str();
        let secret = SECRET_KEY_PATTERN.captures(contents)?.get(1)?.as_str();
        Some(Self::new(key, secret.as_bytes()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}
