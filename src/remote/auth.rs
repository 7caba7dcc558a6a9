//! Authentication material for SSH sessions.
//!
//! Covers auth-method normalization, private key path resolution and the
//! ordered list of key-type loaders tried against a decoded key file.

use crate::config::expand_home;
use crate::error::{Error, Result};
use log::debug;
use russh::keys::PrivateKey;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// How the session authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Key,
    Password,
}

impl AuthMethod {
    /// Parses configuration text such as `"Key   # default"`.
    ///
    /// Anything after a `#` is dropped, whitespace is trimmed and the
    /// remainder is matched case-insensitively.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw
            .split('#')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        match normalized.as_str() {
            "key" | "publickey" => Ok(AuthMethod::Key),
            "password" => Ok(AuthMethod::Password),
            other => Err(Error::Configuration(format!(
                "Unknown auth method '{}' (expected 'key' or 'password')",
                other
            ))),
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Key => write!(f, "key"),
            AuthMethod::Password => write!(f, "password"),
        }
    }
}

/// Combines `key_dir` and `key_file` into one path.
///
/// An absolute (or home-relative) `key_file` wins over the directory.
pub fn resolve_key_path(key_dir: Option<&str>, key_file: Option<&str>) -> Option<PathBuf> {
    let file = key_file.map(str::trim).filter(|f| !f.is_empty())?;
    let file_path = expand_home(file);

    if file_path.is_absolute() {
        return Some(file_path);
    }

    match key_dir.map(str::trim).filter(|d| !d.is_empty()) {
        Some(dir) => Some(expand_home(dir).join(file_path)),
        None => Some(file_path),
    }
}

/// Algorithm family of a private key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Ed25519,
    Rsa,
    Ecdsa,
    Dsa,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyType::Ed25519 => "ed25519",
            KeyType::Rsa => "rsa",
            KeyType::Ecdsa => "ecdsa",
            KeyType::Dsa => "dsa",
        };
        f.write_str(name)
    }
}

/// A key file read from disk and decoded.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub path: PathBuf,
    pub key: PrivateKey,
}

impl KeyMaterial {
    /// SSH algorithm name, e.g. `ssh-ed25519` or `ecdsa-sha2-nistp256`.
    pub fn algorithm_name(&self) -> String {
        self.key.algorithm().as_str().to_string()
    }
}

/// A key one of the loaders accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedKey {
    pub key_type: KeyType,
    pub path: PathBuf,
}

/// One key-type loader in the trial sequence.
pub trait CredentialLoader {
    fn key_type(&self) -> KeyType;

    /// Accepts the key if it is of this loader's type.
    fn try_load(&self, material: &KeyMaterial) -> Option<LoadedKey>;
}

/// Loader matching one key type by its SSH algorithm name prefix.
struct TypedLoader {
    key_type: KeyType,
    algorithm_prefix: &'static str,
}

impl CredentialLoader for TypedLoader {
    fn key_type(&self) -> KeyType {
        self.key_type
    }

    fn try_load(&self, material: &KeyMaterial) -> Option<LoadedKey> {
        material
            .algorithm_name()
            .starts_with(self.algorithm_prefix)
            .then(|| LoadedKey {
                key_type: self.key_type,
                path: material.path.clone(),
            })
    }
}

/// The loaders in the order they are tried.
pub fn default_loaders() -> Vec<Box<dyn CredentialLoader>> {
    vec![
        Box::new(TypedLoader {
            key_type: KeyType::Ed25519,
            algorithm_prefix: "ssh-ed25519",
        }),
        Box::new(TypedLoader {
            key_type: KeyType::Rsa,
            algorithm_prefix: "ssh-rsa",
        }),
        Box::new(TypedLoader {
            key_type: KeyType::Ecdsa,
            algorithm_prefix: "ecdsa-sha2-",
        }),
        Box::new(TypedLoader {
            key_type: KeyType::Dsa,
            algorithm_prefix: "ssh-dss",
        }),
    ]
}

fn encrypted_key_error(path: &Path) -> Error {
    Error::AuthenticationFailed(format!(
        "Private key {} is encrypted; passphrase-protected keys are not supported",
        path.display()
    ))
}

fn undecodable_key_error(path: &Path, reason: impl fmt::Display) -> Error {
    Error::Configuration(format!(
        "Failed to decode private key {}: {}",
        path.display(),
        reason
    ))
}

/// Decodes key file contents without a passphrase.
///
/// Encrypted keys fail with `AuthenticationFailed`, anything that does not
/// decode fails with `Configuration`.
pub fn decode_key(text: &str, path: &Path) -> Result<KeyMaterial> {
    let key = if text.contains("BEGIN OPENSSH PRIVATE KEY") {
        let key = PrivateKey::from_openssh(text).map_err(|e| undecodable_key_error(path, e))?;
        if key.is_encrypted() {
            return Err(encrypted_key_error(path));
        }
        key
    } else {
        // Legacy PEM (`Proc-Type: 4,ENCRYPTED`) and PKCS#8 `ENCRYPTED PRIVATE KEY`
        if text.contains("ENCRYPTED") {
            return Err(encrypted_key_error(path));
        }
        russh::keys::decode_secret_key(text, None).map_err(|e| match e {
            russh::keys::Error::KeyIsEncrypted => encrypted_key_error(path),
            other => undecodable_key_error(path, other),
        })?
    };

    Ok(KeyMaterial {
        path: path.to_path_buf(),
        key,
    })
}

/// Reads and decodes `path`, then runs the loaders over it until one accepts the key.
pub fn load_private_key(path: &Path) -> Result<LoadedKey> {
    let text = fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!(
            "Failed to read private key {}: {}",
            path.display(),
            e
        ))
    })?;
    let material = decode_key(&text, path)?;

    for loader in default_loaders() {
        match loader.try_load(&material) {
            Some(key) => {
                debug!("Loaded {} key from {}", key.key_type, path.display());
                return Ok(key);
            }
            None => debug!("Key {} is not {}", path.display(), loader.key_type()),
        }
    }

    Err(Error::AuthenticationFailed(format!(
        "Unsupported private key algorithm {} in {}",
        material.algorithm_name(),
        path.display()
    )))
}
