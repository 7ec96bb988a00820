//! Encrypted-at-rest credential store
//!
//! One file per profile (`<profile>.vault`) holding a JSON [`VaultRecord`]:
//! AES-256-GCM ciphertext of the serialized [`CredentialSet`], the nonce, the
//! KDF parameters the key was derived with and a fingerprint of that key.
//!
//! The symmetric key is derived with PBKDF2-HMAC-SHA256 from a local secret,
//! either a random secret kept in `vault.key` or a passphrase supplied through
//! the environment. Records are bound to their profile name through the AEAD
//! associated data.

use super::types::CredentialSet;
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use ttk_common::auth_constants::VAULT_KDF_ITERATIONS;
use ttk_common::config::VaultSettings;
use ttk_common::ProfileName;
use zeroize::Zeroizing;

/// Current on-disk record format
pub const VAULT_RECORD_VERSION: u32 = 1;

const KEY_FILE_NAME: &str = "vault.key";
const RECORD_EXTENSION: &str = "vault";
const SECRET_LEN: usize = 32;
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const FINGERPRINT_DOMAIN: &[u8] = b"ttk-vault-key-fingerprint-v1";

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Vault errors
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("No stored credential for profile '{profile}'")]
    NotFound { profile: String },

    /// Record failed authentication or could not be parsed
    #[error("Failed to decrypt vault record: {0}")]
    DecryptFailed(String),

    #[error("Vault key mismatch: record was written with key {found}, current key is {expected}")]
    KeyMismatch { expected: String, found: String },

    #[error("Unsupported vault record version {0}")]
    UnsupportedVersion(u32),

    #[error("Vault I/O failure: {0}")]
    Io(#[from] io::Error),
}

impl VaultError {
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::NotFound { .. } => "not_found",
            VaultError::DecryptFailed(_) => "decrypt_failed",
            VaultError::KeyMismatch { .. } => "key_mismatch",
            VaultError::UnsupportedVersion(_) => "unsupported_version",
            VaultError::Io(_) => "io_failure",
        }
    }
}

/// Key derivation algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KdfAlgorithm {
    Pbkdf2HmacSha256,
}

/// Versioned key derivation parameters, recorded in every record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KdfParams {
    pub algorithm: KdfAlgorithm,
    pub iterations: u32,
}

impl KdfParams {
    pub fn pbkdf2(iterations: u32) -> Self {
        Self {
            algorithm: KdfAlgorithm::Pbkdf2HmacSha256,
            iterations,
        }
    }

    /// Whether a record's parameters are within the range this build derives keys for
    pub fn is_supported(&self) -> bool {
        VAULT_KDF_ITERATIONS.contains(&self.iterations)
    }
}

/// Persisted ciphertext container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultRecord {
    pub version: u32,
    pub kdf: KdfParams,
    pub key_fingerprint: String,
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Local secret the vault key is derived from
pub struct VaultSecret {
    secret: Zeroizing<Vec<u8>>,
    salt: [u8; SALT_LEN],
}

impl fmt::Debug for VaultSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultSecret").finish_non_exhaustive()
    }
}

impl VaultSecret {
    pub fn from_parts(secret: impl Into<Vec<u8>>, salt: [u8; SALT_LEN]) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
            salt,
        }
    }

    /// Load the key file from `dir`, creating it on first use.
    ///
    /// When `passphrase_env` names a set, non-empty variable its value replaces
    /// the random secret; the salt always comes from the key file.
    pub async fn load_or_create(dir: &Path, passphrase_env: Option<&str>) -> VaultResult<Self> {
        ensure_private_dir(dir).await?;
        let key_path = dir.join(KEY_FILE_NAME);

        let material = match fs::read(&key_path).await {
            Ok(bytes) => Zeroizing::new(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => create_key_file(&key_path).await?,
            Err(e) => return Err(e.into()),
        };

        if material.len() != SECRET_LEN + SALT_LEN {
            return Err(VaultError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("key file {} is corrupt", key_path.display()),
            )));
        }

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&material[SECRET_LEN..]);

        let passphrase = passphrase_env
            .and_then(|name| std::env::var(name).ok())
            .filter(|value| !value.is_empty());

        let secret = match passphrase {
            Some(passphrase) => {
                debug!("Using vault passphrase from environment");
                Zeroizing::new(passphrase.into_bytes())
            }
            None => Zeroizing::new(material[..SECRET_LEN].to_vec()),
        };

        Ok(Self { secret, salt })
    }
}

async fn create_key_file(path: &Path) -> VaultResult<Zeroizing<Vec<u8>>> {
    let mut material = Zeroizing::new(vec![0u8; SECRET_LEN + SALT_LEN]);
    OsRng.fill_bytes(&mut material);

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    match options.open(path).await {
        Ok(mut file) => {
            file.write_all(&material).await?;
            file.sync_all().await?;
            info!("Created vault key file {}", path.display());
            Ok(material)
        }
        // Another process won the race; use its key
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Ok(Zeroizing::new(fs::read(path).await?))
        }
        Err(e) => Err(e.into()),
    }
}

async fn ensure_private_dir(dir: &Path) -> io::Result<()> {
    if fs::try_exists(dir).await? {
        return Ok(());
    }
    fs::create_dir_all(dir).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).await?;
    }
    Ok(())
}

struct DerivedKey {
    key: Zeroizing<[u8; KEY_LEN]>,
    fingerprint: String,
}

/// Encrypted per-profile credential store
pub struct Vault {
    dir: PathBuf,
    secret: Arc<VaultSecret>,
    current: KdfParams,
    keys: DashMap<KdfParams, Arc<DerivedKey>>,
    locks: DashMap<ProfileName, Arc<Mutex<()>>>,
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("dir", &self.dir)
            .field("kdf", &self.current)
            .finish()
    }
}

impl Vault {
    pub fn new(dir: impl Into<PathBuf>, secret: VaultSecret, kdf: KdfParams) -> Self {
        Self {
            dir: dir.into(),
            secret: Arc::new(secret),
            current: kdf,
            keys: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    /// Open the vault described by configuration, creating its key file if needed
    pub async fn open(settings: &VaultSettings) -> VaultResult<Self> {
        let dir = settings
            .resolve_dir()
            .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e.to_string()))?;
        let secret = VaultSecret::load_or_create(&dir, Some(&settings.passphrase_env)).await?;
        Ok(Self::new(dir, secret, KdfParams::pbkdf2(settings.kdf_iterations)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `profile`
    pub fn record_path(&self, profile: &ProfileName) -> PathBuf {
        self.dir
            .join(format!("{}.{}", profile.as_str(), RECORD_EXTENSION))
    }

    /// Encrypt and atomically persist `credentials` under `profile`
    pub async fn put(&self, profile: &ProfileName, credentials: &CredentialSet) -> VaultResult<()> {
        let lock = self.lock_for(profile);
        let _guard = lock.lock().await;
        self.write_record(profile, credentials).await
    }

    /// Read and decrypt the credential stored under `profile`
    pub async fn get(&self, profile: &ProfileName) -> VaultResult<CredentialSet> {
        let lock = self.lock_for(profile);
        let _guard = lock.lock().await;

        let bytes = match fs::read(self.record_path(profile)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VaultError::NotFound {
                    profile: profile.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let record: VaultRecord = serde_json::from_slice(&bytes)
            .map_err(|e| VaultError::DecryptFailed(format!("unreadable record: {e}")))?;

        if record.version != VAULT_RECORD_VERSION {
            return Err(VaultError::UnsupportedVersion(record.version));
        }

        if !record.kdf.is_supported() {
            return Err(VaultError::DecryptFailed(format!(
                "unsupported key derivation iterations: {}",
                record.kdf.iterations
            )));
        }

        let key = self.derive_key(record.kdf).await?;
        if key.fingerprint != record.key_fingerprint {
            return Err(VaultError::KeyMismatch {
                expected: key.fingerprint.clone(),
                found: record.key_fingerprint,
            });
        }

        let credentials = decrypt(&key, profile, &record)?;

        if record.kdf != self.current {
            info!(
                "Upgrading vault record for profile '{}' to {} iterations",
                profile, self.current.iterations
            );
            if let Err(e) = self.write_record(profile, &credentials).await {
                warn!("Failed to upgrade vault record for '{}': {}", profile, e);
            }
        }

        Ok(credentials)
    }

    /// Remove the record for `profile`; returns whether one existed
    pub async fn delete(&self, profile: &ProfileName) -> VaultResult<bool> {
        let lock = self.lock_for(profile);
        let _guard = lock.lock().await;

        match fs::remove_file(self.record_path(profile)).await {
            Ok(()) => {
                sync_dir(&self.dir).await?;
                debug!("Deleted vault record for profile '{}'", profile);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn contains(&self, profile: &ProfileName) -> VaultResult<bool> {
        Ok(fs::try_exists(self.record_path(profile)).await?)
    }

    /// Profiles with a stored record, sorted
    pub async fn list(&self) -> VaultResult<Vec<ProfileName>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut profiles = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match ProfileName::new(stem) {
                Ok(profile) => profiles.push(profile),
                Err(e) => debug!("Skipping vault file {}: {}", path.display(), e),
            }
        }

        profiles.sort();
        Ok(profiles)
    }

    fn lock_for(&self, profile: &ProfileName) -> Arc<Mutex<()>> {
        self.locks.entry(profile.clone()).or_default().clone()
    }

    async fn write_record(
        &self,
        profile: &ProfileName,
        credentials: &CredentialSet,
    ) -> VaultResult<()> {
        let key = self.derive_key(self.current).await?;
        let plaintext = Zeroizing::new(serde_json::to_vec(credentials).map_err(io::Error::from)?);

        let cipher = Aes256Gcm::new_from_slice(&key.key[..])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext.as_slice(),
                    aad: profile.as_str().as_bytes(),
                },
            )
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "encryption failed"))?;

        let record = VaultRecord {
            version: VAULT_RECORD_VERSION,
            kdf: self.current,
            key_fingerprint: key.fingerprint.clone(),
            nonce: nonce.to_vec(),
            ciphertext,
        };
        let bytes = serde_json::to_vec_pretty(&record).map_err(io::Error::from)?;

        ensure_private_dir(&self.dir).await?;
        write_atomic(&self.dir, &self.record_path(profile), &bytes).await?;
        debug!("Stored vault record for profile '{}'", profile);
        Ok(())
    }

    async fn derive_key(&self, params: KdfParams) -> VaultResult<Arc<DerivedKey>> {
        if let Some(key) = self.keys.get(&params) {
            return Ok(key.clone());
        }

        let secret = self.secret.clone();
        let derived = tokio::task::spawn_blocking(move || derive(&secret, params))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        let derived = Arc::new(derived);
        self.keys.insert(params, derived.clone());
        Ok(derived)
    }
}

fn derive(secret: &VaultSecret, params: KdfParams) -> DerivedKey {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    match params.algorithm {
        KdfAlgorithm::Pbkdf2HmacSha256 => pbkdf2::pbkdf2_hmac::<Sha256>(
            &secret.secret,
            &secret.salt,
            params.iterations,
            &mut *key,
        ),
    }

    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_DOMAIN);
    hasher.update(&key[..]);
    let fingerprint = hex::encode(&hasher.finalize()[..16]);

    DerivedKey { key, fingerprint }
}

fn decrypt(
    key: &DerivedKey,
    profile: &ProfileName,
    record: &VaultRecord,
) -> VaultResult<CredentialSet> {
    if record.nonce.len() != NONCE_LEN {
        return Err(VaultError::DecryptFailed("invalid nonce length".into()));
    }

    let cipher = Aes256Gcm::new_from_slice(&key.key[..])
        .map_err(|e| VaultError::DecryptFailed(e.to_string()))?;
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&record.nonce),
            Payload {
                msg: &record.ciphertext,
                aad: profile.as_str().as_bytes(),
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| VaultError::DecryptFailed("authentication tag mismatch".into()))?;

    serde_json::from_slice(&plaintext)
        .map_err(|e| VaultError::DecryptFailed(format!("invalid credential payload: {e}")))
}

async fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let written = async {
        let mut file = options.open(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await
    }
    .await;

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }

    sync_dir(dir).await
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{SubsecRound, Utc};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn credentials() -> CredentialSet {
        CredentialSet {
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            expires_at: Utc::now().trunc_subsecs(0),
            scope: BTreeSet::from(["user.info.basic".to_string(), "video.list".to_string()]),
            token_type: "Bearer".into(),
        }
    }

    fn vault(dir: &Path, secret: &[u8], iterations: u32) -> Vault {
        Vault::new(
            dir,
            VaultSecret::from_parts(secret.to_vec(), [7u8; SALT_LEN]),
            KdfParams::pbkdf2(iterations),
        )
    }

    fn profile(name: &str) -> ProfileName {
        ProfileName::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let vault = vault(dir.path(), b"secret", 1_000);
        let creds = credentials();

        vault.put(&profile("default"), &creds).await.unwrap();
        assert_eq!(vault.get(&profile("default")).await.unwrap(), creds);
        assert!(vault.contains(&profile("default")).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_does_not_contain_plaintext() {
        let dir = TempDir::new().unwrap();
        let vault = vault(dir.path(), b"secret", 1_000);
        vault.put(&profile("default"), &credentials()).await.unwrap();

        let raw = std::fs::read_to_string(vault.record_path(&profile("default"))).unwrap();
        assert!(!raw.contains("access"));
        assert!(!raw.contains("refresh"));

        let record: VaultRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.version, VAULT_RECORD_VERSION);
        assert_eq!(record.nonce.len(), NONCE_LEN);
    }

    #[tokio::test]
    async fn test_missing_profile() {
        let dir = TempDir::new().unwrap();
        let vault = vault(dir.path(), b"secret", 1_000);

        assert!(matches!(
            vault.get(&profile("nobody")).await,
            Err(VaultError::NotFound { .. })
        ));
        assert!(!vault.delete(&profile("nobody")).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let dir = TempDir::new().unwrap();
        let vault = vault(dir.path(), b"secret", 1_000);
        vault.put(&profile("work"), &credentials()).await.unwrap();
        vault.put(&profile("default"), &credentials()).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(
            vault.list().await.unwrap(),
            vec![profile("default"), profile("work")]
        );

        assert!(vault.delete(&profile("work")).await.unwrap());
        assert_eq!(vault.list().await.unwrap(), vec![profile("default")]);
    }

    #[tokio::test]
    async fn test_different_secret_is_key_mismatch() {
        let dir = TempDir::new().unwrap();
        vault(dir.path(), b"secret", 1_000)
            .put(&profile("default"), &credentials())
            .await
            .unwrap();

        let other = vault(dir.path(), b"another secret", 1_000);
        assert!(matches!(
            other.get(&profile("default")).await,
            Err(VaultError::KeyMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_record_bound_to_profile() {
        let dir = TempDir::new().unwrap();
        let vault = vault(dir.path(), b"secret", 1_000);
        vault.put(&profile("alice"), &credentials()).await.unwrap();

        std::fs::copy(
            vault.record_path(&profile("alice")),
            vault.record_path(&profile("mallory")),
        )
        .unwrap();

        assert!(matches!(
            vault.get(&profile("mallory")).await,
            Err(VaultError::DecryptFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_garbage_record_fails_closed() {
        let dir = TempDir::new().unwrap();
        let vault = vault(dir.path(), b"secret", 1_000);
        std::fs::write(vault.record_path(&profile("default")), b"{not json").unwrap();

        assert!(matches!(
            vault.get(&profile("default")).await,
            Err(VaultError::DecryptFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_version() {
        let dir = TempDir::new().unwrap();
        let vault = vault(dir.path(), b"secret", 1_000);
        vault.put(&profile("default"), &credentials()).await.unwrap();

        let path = vault.record_path(&profile("default"));
        let mut record: VaultRecord =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        record.version = 99;
        std::fs::write(&path, serde_json::to_vec(&record).unwrap()).unwrap();

        assert!(matches!(
            vault.get(&profile("default")).await,
            Err(VaultError::UnsupportedVersion(99))
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_iterations_fail_closed() {
        let dir = TempDir::new().unwrap();
        let vault = vault(dir.path(), b"secret", 1_000);
        vault.put(&profile("default"), &credentials()).await.unwrap();

        let path = vault.record_path(&profile("default"));
        let mut record: VaultRecord =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        record.kdf.iterations = 4_000_000_000;
        std::fs::write(&path, serde_json::to_vec(&record).unwrap()).unwrap();

        let started = std::time::Instant::now();
        assert!(matches!(
            vault.get(&profile("default")).await,
            Err(VaultError::DecryptFailed(_))
        ));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_lazy_upgrade_of_kdf_params() {
        let dir = TempDir::new().unwrap();
        let creds = credentials();
        vault(dir.path(), b"secret", 1_000)
            .put(&profile("default"), &creds)
            .await
            .unwrap();

        let upgraded = vault(dir.path(), b"secret", 2_000);
        assert_eq!(upgraded.get(&profile("default")).await.unwrap(), creds);

        let record: VaultRecord = serde_json::from_slice(
            &std::fs::read(upgraded.record_path(&profile("default"))).unwrap(),
        )
        .unwrap();
        assert_eq!(record.kdf, KdfParams::pbkdf2(2_000));
        assert_eq!(upgraded.get(&profile("default")).await.unwrap(), creds);
    }

    #[tokio::test]
    async fn test_key_file_created_once() {
        let dir = TempDir::new().unwrap();
        let vault_dir = dir.path().join("vault");

        VaultSecret::load_or_create(&vault_dir, None).await.unwrap();
        let first = std::fs::read(vault_dir.join(KEY_FILE_NAME)).unwrap();
        VaultSecret::load_or_create(&vault_dir, None).await.unwrap();
        let second = std::fs::read(vault_dir.join(KEY_FILE_NAME)).unwrap();

        assert_eq!(first.len(), SECRET_LEN + SALT_LEN);
        assert_eq!(first, second);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(vault_dir.join(KEY_FILE_NAME))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
            let dir_mode = std::fs::metadata(&vault_dir).unwrap().permissions().mode();
            assert_eq!(dir_mode & 0o777, 0o700);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_record_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let vault = vault(dir.path(), b"secret", 1_000);
        vault.put(&profile("default"), &credentials()).await.unwrap();

        let mode = std::fs::metadata(vault.record_path(&profile("default")))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
        // No temp files left behind
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
