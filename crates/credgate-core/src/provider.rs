use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

pub const PROV_GOST_2012_256: u8 = 80;
pub const PROV_GOST_2012_512: u8 = 81;

pub const CALG_GR3411_2012_256: u32 = 0x8021;
pub const CALG_GR3411_2012_512: u32 = 0x8022;

pub const AT_KEYEXCHANGE: u32 = 1;
pub const AT_SIGNATURE: u32 = 2;

/// Human-readable algorithm family, used in key display strings.
pub const KEY_TYPE: &str = "ГОСТ Р 34.10-2012";

/// Provider type selector. Each kind fixes the hash algorithm used for
/// signing and verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gost256,
    Gost512,
}

impl ProviderKind {
    pub fn provider_type(self) -> u8 {
        match self {
            ProviderKind::Gost256 => PROV_GOST_2012_256,
            ProviderKind::Gost512 => PROV_GOST_2012_512,
        }
    }

    pub fn from_provider_type(raw: u8) -> Option<Self> {
        match raw {
            PROV_GOST_2012_256 => Some(ProviderKind::Gost256),
            PROV_GOST_2012_512 => Some(ProviderKind::Gost512),
            _ => None,
        }
    }

    pub fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            ProviderKind::Gost256 => HashAlgorithm::Streebog256,
            ProviderKind::Gost512 => HashAlgorithm::Streebog512,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Gost256 => f.write_str("256"),
            ProviderKind::Gost512 => f.write_str("512"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "256" | "gost256" | "80" => Ok(ProviderKind::Gost256),
            "512" | "gost512" | "81" => Ok(ProviderKind::Gost512),
            other => Err(format!("unknown provider kind `{other}` (expected 256 or 512)")),
        }
    }
}

/// GOST R 34.11-2012 hash variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Streebog256,
    Streebog512,
}

impl HashAlgorithm {
    pub fn alg_id(self) -> u32 {
        match self {
            HashAlgorithm::Streebog256 => CALG_GR3411_2012_256,
            HashAlgorithm::Streebog512 => CALG_GR3411_2012_512,
        }
    }
}

/// Key role inside a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySpec {
    KeyExchange,
    #[default]
    Signature,
}

impl KeySpec {
    pub fn as_raw(self) -> u32 {
        match self {
            KeySpec::KeyExchange => AT_KEYEXCHANGE,
            KeySpec::Signature => AT_SIGNATURE,
        }
    }
}

impl FromStr for KeySpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "signature" | "sig" => Ok(KeySpec::Signature),
            "exchange" | "key_exchange" | "keyexchange" => Ok(KeySpec::KeyExchange),
            other => Err(format!("unknown key spec `{other}` (expected signature or exchange)")),
        }
    }
}

/// How a provider context is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    /// Open an existing named container.
    Open,
    /// Create a new named container; fails if it exists.
    CreateNew,
    /// Session without a container, for hashing, verification and imports.
    VerifyOnly,
}

/// Identifies a boundary call in errors and in fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderCall {
    AcquireContext,
    DeleteContainer,
    SetPin,
    GenerateKey,
    UserKey,
    ImportKey,
    ExportKey,
    CreateHash,
    HashData,
    HashValue,
    SignHash,
    VerifySignature,
    DestroyKey,
    DestroyHash,
    ReleaseContext,
}

impl fmt::Display for ProviderCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderCall::AcquireContext => "CryptAcquireContext",
            ProviderCall::DeleteContainer => "CryptAcquireContext(DELETEKEYSET)",
            ProviderCall::SetPin => "CryptSetProvParam",
            ProviderCall::GenerateKey => "CryptGenKey",
            ProviderCall::UserKey => "CryptGetUserKey",
            ProviderCall::ImportKey => "CryptImportKey",
            ProviderCall::ExportKey => "CryptExportKey",
            ProviderCall::CreateHash => "CryptCreateHash",
            ProviderCall::HashData => "CryptHashData",
            ProviderCall::HashValue => "CryptGetHashParam",
            ProviderCall::SignHash => "CryptSignHash",
            ProviderCall::VerifySignature => "CryptVerifySignature",
            ProviderCall::DestroyKey => "CryptDestroyKey",
            ProviderCall::DestroyHash => "CryptDestroyHash",
            ProviderCall::ReleaseContext => "CryptReleaseContext",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawProv(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawKey(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHash(pub usize);

/// One method per CSP call. Two-phase calls take `None` to query the
/// required size and `Some(buf)` to fill, returning the byte count.
pub trait CryptoProvider {
    fn acquire_context(
        &self,
        container: Option<&[u8]>,
        kind: ProviderKind,
        mode: AcquireMode,
    ) -> Result<RawProv, ProviderError>;

    /// Removes a named container and everything stored in it.
    fn delete_container(&self, container: &[u8], kind: ProviderKind) -> Result<(), ProviderError>;

    fn set_pin(&self, prov: RawProv, pin: &[u8]) -> Result<(), ProviderError>;

    fn generate_key(
        &self,
        prov: RawProv,
        spec: KeySpec,
        exportable: bool,
    ) -> Result<RawKey, ProviderError>;

    fn user_key(&self, prov: RawProv, spec: KeySpec) -> Result<RawKey, ProviderError>;

    fn import_key(&self, prov: RawProv, blob: &[u8]) -> Result<RawKey, ProviderError>;

    fn export_public_key(&self, key: RawKey, out: Option<&mut [u8]>)
        -> Result<usize, ProviderError>;

    fn create_hash(&self, prov: RawProv, alg: HashAlgorithm) -> Result<RawHash, ProviderError>;

    fn hash_data(&self, hash: RawHash, data: &[u8]) -> Result<(), ProviderError>;

    /// Final digest of everything hashed so far. Closes the hash for updates.
    fn get_hash_value(&self, hash: RawHash, out: Option<&mut [u8]>)
        -> Result<usize, ProviderError>;

    fn sign_hash(
        &self,
        hash: RawHash,
        spec: KeySpec,
        out: Option<&mut [u8]>,
    ) -> Result<usize, ProviderError>;

    /// `Ok(false)` is a well-formed negative answer; `Err` is a fault.
    fn verify_signature(
        &self,
        hash: RawHash,
        signature: &[u8],
        key: RawKey,
    ) -> Result<bool, ProviderError>;

    fn destroy_key(&self, key: RawKey) -> Result<(), ProviderError>;

    fn destroy_hash(&self, hash: RawHash) -> Result<(), ProviderError>;

    fn release_context(&self, prov: RawProv) -> Result<(), ProviderError>;
}
