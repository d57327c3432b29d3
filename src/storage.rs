use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::config;
use crate::crypto::{self, KdfParams};
use crate::models::{AppData, CycleConfiguration, PeriodLog};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("data directory not found")]
    NoDataDir,
}

/// Source of a user's period logs.
pub trait PeriodStore {
    fn period_logs(&self) -> Vec<PeriodLog>;
}

/// Source of a user's cycle configuration.
pub trait SettingsStore {
    fn cycle_configuration(&self) -> CycleConfiguration;
}

impl PeriodStore for AppData {
    fn period_logs(&self) -> Vec<PeriodLog> {
        self.periods.clone()
    }
}

impl SettingsStore for AppData {
    fn cycle_configuration(&self) -> CycleConfiguration {
        self.settings.clone()
    }
}

/// Passphrase-encrypted file holding all of a user's [`AppData`].
#[derive(Debug, Clone)]
pub struct Vault {
    path: PathBuf,
    kdf: KdfParams,
}

impl Vault {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kdf: KdfParams::default(),
        }
    }

    /// Vault in the per-user data directory.
    pub fn default_location() -> Result<Self, StorageError> {
        let dir = config::data_dir().ok_or(StorageError::NoDataDir)?;
        Ok(Self::at(dir.join(config::VAULT_FILE_NAME)))
    }

    /// Key derivation costs used for subsequent saves.
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the vault exists (i.e., the app has been set up before).
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Encrypt and write the data, replacing the previous file atomically.
    pub fn save(&self, passphrase: &str, data: &AppData) -> Result<(), StorageError> {
        let json = Zeroizing::new(serde_json::to_vec(data)?);
        let sealed = crypto::seal(passphrase, &json, &self.kdf)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let staging = self.staging_path();
        fs::write(&staging, &sealed)?;
        fs::rename(&staging, &self.path)?;

        info!(periods = data.periods.len(), "vault saved");
        Ok(())
    }

    /// Load and decrypt the data with the given passphrase.
    pub fn load(&self, passphrase: &str) -> Result<AppData, StorageError> {
        let sealed = fs::read(&self.path)?;
        let plaintext = crypto::open(passphrase, &sealed)?;
        let data: AppData = serde_json::from_slice(&plaintext)?;
        debug!(periods = data.periods.len(), "vault loaded");
        Ok(data)
    }

    /// Delete all data permanently.
    pub fn wipe(&self) -> Result<(), StorageError> {
        for path in [self.staging_path(), self.path.clone()] {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        info!("vault wiped");
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReminderSettings;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn vault_in(dir: &tempfile::TempDir) -> Vault {
        Vault::at(dir.path().join("nested").join(config::VAULT_FILE_NAME)).with_kdf(KdfParams::light())
    }

    fn sample_data() -> AppData {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        AppData {
            periods: vec![PeriodLog {
                id: Uuid::new_v4(),
                start_date: start,
                end_date: start + chrono::Duration::days(4),
                flow_intensity: None,
                excluded_from_stats: false,
            }],
            settings: CycleConfiguration {
                average_cycle_length: 30,
                ..CycleConfiguration::default()
            },
            reminders: ReminderSettings {
                notify_period_end: true,
                ..ReminderSettings::default()
            },
        }
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault_in(&dir);
        assert!(!vault.exists());

        let data = sample_data();
        vault.save("passphrase", &data).unwrap();
        assert!(vault.exists());
        assert!(!vault.staging_path().exists());
        assert_eq!(vault.load("passphrase").unwrap(), data);
    }

    #[test]
    fn vault_file_is_not_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault_in(&dir);
        vault.save("passphrase", &sample_data()).unwrap();

        let raw = fs::read(vault.path()).unwrap();
        let needle = b"average_cycle_length";
        assert!(!raw.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn wrong_passphrase_is_a_crypto_error() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault_in(&dir);
        vault.save("right", &sample_data()).unwrap();

        assert!(matches!(
            vault.load("wrong"),
            Err(StorageError::Crypto(crypto::CryptoError::Decryption))
        ));
    }

    #[test]
    fn missing_vault_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(vault_in(&dir).load("any"), Err(StorageError::Io(_))));
    }

    #[test]
    fn wipe_removes_vault() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault_in(&dir);
        vault.save("passphrase", &sample_data()).unwrap();
        vault.wipe().unwrap();
        assert!(!vault.exists());
        // Wiping twice is fine
        vault.wipe().unwrap();
    }

    #[test]
    fn app_data_serves_as_store() {
        let data = sample_data();
        assert_eq!(data.period_logs(), data.periods);
        assert_eq!(data.cycle_configuration().average_cycle_length, 30);
    }
}
