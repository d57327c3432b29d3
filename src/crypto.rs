use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use zeroize::Zeroizing;

const MAGIC: &[u8; 4] = b"PCYC";
const VERSION: u8 = 1;
const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const COSTS_LEN: usize = 12;
const HEADER_LEN: usize = MAGIC.len() + 1 + COSTS_LEN + SALT_LEN + NONCE_LEN;
/// Upper bounds on the costs accepted from a header (1 GiB, 64 passes, 16 lanes).
const MAX_MEMORY_KIB: u32 = 1 << 20;
const MAX_ITERATIONS: u32 = 64;
const MAX_PARALLELISM: u32 = 16;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("encryption failed")]
    Encryption,
    #[error("decryption failed: wrong passphrase or corrupted data")]
    Decryption,
    #[error("invalid data format")]
    InvalidFormat,
    #[error("unsupported vault version {0}")]
    UnsupportedVersion(u8),
}

/// Argon2id cost parameters. Written into every envelope so a vault can be
/// opened regardless of the parameters the current build prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl KdfParams {
    pub const fn interactive() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 1,
        }
    }

    /// Minimal costs for fixtures and tests. Not for real data.
    pub const fn light() -> Self {
        Self {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

struct Header<'a> {
    kdf: KdfParams,
    salt: &'a [u8],
    nonce: &'a [u8],
}

fn derive_key(
    passphrase: &str,
    salt: &[u8],
    kdf: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let params = Params::new(kdf.memory_kib, kdf.iterations, kdf.parallelism, Some(KEY_LEN))
        .map_err(|_| CryptoError::KeyDerivation)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut *key)
        .map_err(|_| CryptoError::KeyDerivation)?;

    Ok(key)
}

/// Seal plaintext under a passphrase.
///
/// Layout: `PCYC` | version | m, t, p costs (u32 LE) | salt (32) | nonce (12) | ciphertext.
/// The whole header is authenticated as associated data.
pub fn seal(passphrase: &str, plaintext: &[u8], kdf: &KdfParams) -> Result<Vec<u8>, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce_bytes);

    let mut sealed = Vec::with_capacity(HEADER_LEN + plaintext.len() + 16);
    sealed.extend_from_slice(MAGIC);
    sealed.push(VERSION);
    for cost in [kdf.memory_kib, kdf.iterations, kdf.parallelism] {
        sealed.extend_from_slice(&cost.to_le_bytes());
    }
    sealed.extend_from_slice(&salt);
    sealed.extend_from_slice(&nonce_bytes);

    let key = derive_key(passphrase, &salt, kdf)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|_| CryptoError::Encryption)?;
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: &sealed,
            },
        )
        .map_err(|_| CryptoError::Encryption)?;

    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open an envelope produced by [`seal`]. The plaintext is wiped on drop.
pub fn open(passphrase: &str, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let header = parse_header(sealed)?;
    let (aad, ciphertext) = sealed.split_at(HEADER_LEN);

    let key = derive_key(passphrase, header.salt, &header.kdf)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|_| CryptoError::Decryption)?;

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(header.nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Decryption)?;

    Ok(Zeroizing::new(plaintext))
}

fn parse_header(sealed: &[u8]) -> Result<Header<'_>, CryptoError> {
    if sealed.len() < HEADER_LEN {
        return Err(CryptoError::InvalidFormat);
    }
    if &sealed[..MAGIC.len()] != MAGIC {
        return Err(CryptoError::InvalidFormat);
    }
    let version = sealed[MAGIC.len()];
    if version != VERSION {
        return Err(CryptoError::UnsupportedVersion(version));
    }

    let costs_at = MAGIC.len() + 1;
    let cost = |i: usize| -> Result<u32, CryptoError> {
        let start = costs_at + i * 4;
        sealed[start..start + 4]
            .try_into()
            .map(u32::from_le_bytes)
            .map_err(|_| CryptoError::InvalidFormat)
    };
    let kdf = KdfParams {
        memory_kib: cost(0)?,
        iterations: cost(1)?,
        parallelism: cost(2)?,
    };
    if kdf.memory_kib > MAX_MEMORY_KIB
        || kdf.iterations > MAX_ITERATIONS
        || kdf.parallelism > MAX_PARALLELISM
    {
        return Err(CryptoError::InvalidFormat);
    }

    let salt_at = costs_at + COSTS_LEN;
    let nonce_at = salt_at + SALT_LEN;
    Ok(Header {
        kdf,
        salt: &sealed[salt_at..nonce_at],
        nonce: &sealed[nonce_at..HEADER_LEN],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let sealed = seal("test-passphrase-123", b"hello pinkcycle", &KdfParams::light()).unwrap();
        let opened = open("test-passphrase-123", &sealed).unwrap();
        assert_eq!(opened.as_slice(), b"hello pinkcycle");
    }

    #[test]
    fn wrong_passphrase_fails() {
        let sealed = seal("correct", b"secret data", &KdfParams::light()).unwrap();
        assert!(matches!(open("wrong", &sealed), Err(CryptoError::Decryption)));
    }

    #[test]
    fn truncated_data_fails() {
        assert!(matches!(open("any", &[0u8; 10]), Err(CryptoError::InvalidFormat)));
    }

    #[test]
    fn tampered_header_fails() {
        let sealed = seal("pass", b"data", &KdfParams::light()).unwrap();

        let mut bad_version = sealed.clone();
        bad_version[MAGIC.len()] = 9;
        assert!(matches!(
            open("pass", &bad_version),
            Err(CryptoError::UnsupportedVersion(9))
        ));

        let mut bad_magic = sealed.clone();
        bad_magic[0] = b'X';
        assert!(matches!(open("pass", &bad_magic), Err(CryptoError::InvalidFormat)));

        // Salt is covered by the tag as well as the key
        let mut bad_salt = sealed.clone();
        bad_salt[MAGIC.len() + 1 + COSTS_LEN] ^= 0xff;
        assert!(matches!(open("pass", &bad_salt), Err(CryptoError::Decryption)));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let mut sealed = seal("pass", b"data", &KdfParams::light()).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(open("pass", &sealed), Err(CryptoError::Decryption)));
    }

    #[test]
    fn costs_travel_with_the_envelope() {
        let custom = KdfParams {
            memory_kib: 128,
            iterations: 2,
            parallelism: 1,
        };
        let sealed = seal("pass", b"data", &custom).unwrap();
        assert_eq!(parse_header(&sealed).unwrap().kdf, custom);
        assert_eq!(KdfParams::default(), KdfParams::interactive());
    }

    #[test]
    fn oversized_costs_rejected() {
        let sealed = seal("pass", b"data", &KdfParams::light()).unwrap();
        let costs_at = MAGIC.len() + 1;
        let too_high = [
            (0, MAX_MEMORY_KIB + 1),
            (1, MAX_ITERATIONS + 1),
            (2, MAX_PARALLELISM + 1),
        ];
        for (i, value) in too_high {
            let mut tampered = sealed.clone();
            let at = costs_at + i * 4;
            tampered[at..at + 4].copy_from_slice(&value.to_le_bytes());
            assert!(matches!(open("pass", &tampered), Err(CryptoError::InvalidFormat)));
        }

        let mut huge = sealed.clone();
        huge[costs_at + 4..costs_at + 8].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(open("pass", &huge), Err(CryptoError::InvalidFormat)));
    }
}
