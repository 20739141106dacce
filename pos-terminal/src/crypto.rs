//! Encryption at rest with AES-256-GCM
//!
//! The master key comes from `POS_MASTER_KEY` (base64) or
//! `<work_dir>/master.key`, which is created on first start.
//!
//! Format: base64(nonce_12bytes || ciphertext || tag_16bytes)

use std::path::Path;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use shared::error::{AppError, AppResult};
use zeroize::Zeroize;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

pub const MASTER_KEY_ENV: &str = "POS_MASTER_KEY";
pub const MASTER_KEY_FILE: &str = "master.key";

/// Master encryption key (32 bytes for AES-256-GCM)
#[derive(Clone)]
pub struct MasterKey {
    key: [u8; KEY_LEN],
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

impl MasterKey {
    /// Fresh random key
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut key);
        Self { key }
    }

    pub fn from_base64(encoded: &str) -> AppResult<Self> {
        let mut bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| AppError::config(format!("Master key is not valid base64: {e}")))?;
        if bytes.len() != KEY_LEN {
            let len = bytes.len();
            bytes.zeroize();
            return Err(AppError::config(format!(
                "Master key wrong length: {len} (expected {KEY_LEN})"
            )));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        Ok(Self { key })
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.key)
    }

    /// Load from env, else from `<work_dir>/master.key`, creating it if missing
    pub fn load_or_create(work_dir: &Path) -> AppResult<Self> {
        if let Ok(encoded) = std::env::var(MASTER_KEY_ENV) {
            tracing::info!("Master key loaded from {MASTER_KEY_ENV}");
            return Self::from_base64(&encoded);
        }

        let path = work_dir.join(MASTER_KEY_FILE);
        if path.exists() {
            let encoded = std::fs::read_to_string(&path)?;
            tracing::info!(path = %path.display(), "Master key loaded from file");
            return Self::from_base64(&encoded);
        }

        std::fs::create_dir_all(work_dir)?;
        let key = Self::generate();
        std::fs::write(&path, key.to_base64())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        tracing::warn!(path = %path.display(), "Master key created; back it up together with the database");
        Ok(key)
    }

    /// Encrypt plaintext → base64(nonce || ciphertext || tag)
    pub fn encrypt(&self, plaintext: &[u8]) -> AppResult<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| AppError::encryption("Invalid key"))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| AppError::encryption("Encryption failed"))?;

        let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&result))
    }

    /// Decrypt base64(nonce || ciphertext || tag) → plaintext
    pub fn decrypt(&self, encrypted_b64: &str) -> AppResult<Vec<u8>> {
        let data = BASE64
            .decode(encrypted_b64)
            .map_err(|_| AppError::encryption("Invalid base64"))?;

        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(AppError::encryption("Ciphertext too short"));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| AppError::encryption("Invalid key"))?;
        let nonce = Nonce::from_slice(&data[..NONCE_LEN]);

        cipher
            .decrypt(nonce, &data[NONCE_LEN..])
            .map_err(|_| AppError::encryption("Decryption failed (wrong key or tampered data)"))
    }

    pub fn encrypt_string(&self, plaintext: &str) -> AppResult<String> {
        self.encrypt(plaintext.as_bytes())
    }

    pub fn decrypt_string(&self, encrypted_b64: &str) -> AppResult<String> {
        let bytes = self.decrypt(encrypted_b64)?;
        String::from_utf8(bytes)
            .map_err(|_| AppError::encryption("Decrypted data is not valid UTF-8"))
    }
}
