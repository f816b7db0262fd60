use std::fmt;

use thiserror::Error;

use crate::provider::ProviderCall;

/// Native provider status codes used by the bundled providers.
///
/// Values follow the CryptoAPI `NTE_*` / `SCARD_*` numbering so that errors
/// from the software provider read the same as errors from a real CSP.
pub mod codes {
    pub const NTE_BAD_UID: u32 = 0x8009_0001;
    pub const NTE_BAD_KEY: u32 = 0x8009_0003;
    pub const NTE_BAD_DATA: u32 = 0x8009_0005;
    pub const NTE_BAD_SIGNATURE: u32 = 0x8009_0006;
    pub const NTE_BAD_ALGID: u32 = 0x8009_0008;
    pub const NTE_BAD_FLAGS: u32 = 0x8009_0009;
    pub const NTE_BAD_TYPE: u32 = 0x8009_000A;
    pub const NTE_BAD_HASH_STATE: u32 = 0x8009_000C;
    pub const NTE_NO_KEY: u32 = 0x8009_000D;
    pub const NTE_EXISTS: u32 = 0x8009_000F;
    pub const NTE_PERM: u32 = 0x8009_0010;
    pub const NTE_BAD_KEYSET: u32 = 0x8009_0016;
    pub const NTE_BAD_KEYSET_PARAM: u32 = 0x8009_001F;
    pub const NTE_FAIL: u32 = 0x8009_0020;
    pub const SCARD_W_WRONG_CHV: u32 = 0x8010_006B;
    pub const ERROR_MORE_DATA: u32 = 234;
}

/// A failed call across the provider boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{call} failed (code 0x{code:08x})")]
pub struct ProviderError {
    pub call: ProviderCall,
    pub code: u32,
}

impl ProviderError {
    pub fn new(call: ProviderCall, code: u32) -> Self {
        Self { call, code }
    }
}

/// Plain discriminant of [`GatewayError`] for matching in callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AcquireFailed,
    PinRejected,
    KeyGenFailed,
    KeyNotFound,
    HashInitFailed,
    HashFailed,
    SignFailed,
    ImportFailed,
    ExportFailed,
    ContainerExists,
    ForeignKey,
    InvalidCredentials,
    InvalidPublicKey,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("cannot acquire provider context")]
    AcquireFailed(#[source] ProviderError),

    #[error("password rejected by provider")]
    PinRejected(#[source] ProviderError),

    #[error("key pair generation failed")]
    KeyGenFailed(#[source] ProviderError),

    #[error("requested key not found in container")]
    KeyNotFound(#[source] ProviderError),

    #[error("hash object creation failed")]
    HashInitFailed(#[source] ProviderError),

    #[error("hashing data failed")]
    HashFailed(#[source] ProviderError),

    #[error("signing failed")]
    SignFailed(#[source] ProviderError),

    #[error("public key import failed")]
    ImportFailed(#[source] ProviderError),

    #[error("public key export failed")]
    ExportFailed(#[source] ProviderError),

    #[error("container already exists")]
    ContainerExists,

    #[error("key handle was issued by a different provider instance")]
    ForeignKey,

    #[error("invalid container credentials: {0}")]
    InvalidCredentials(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::AcquireFailed(_) => ErrorKind::AcquireFailed,
            GatewayError::PinRejected(_) => ErrorKind::PinRejected,
            GatewayError::KeyGenFailed(_) => ErrorKind::KeyGenFailed,
            GatewayError::KeyNotFound(_) => ErrorKind::KeyNotFound,
            GatewayError::HashInitFailed(_) => ErrorKind::HashInitFailed,
            GatewayError::HashFailed(_) => ErrorKind::HashFailed,
            GatewayError::SignFailed(_) => ErrorKind::SignFailed,
            GatewayError::ImportFailed(_) => ErrorKind::ImportFailed,
            GatewayError::ExportFailed(_) => ErrorKind::ExportFailed,
            GatewayError::ContainerExists => ErrorKind::ContainerExists,
            GatewayError::ForeignKey => ErrorKind::ForeignKey,
            GatewayError::InvalidCredentials(_) => ErrorKind::InvalidCredentials,
            GatewayError::InvalidPublicKey(_) => ErrorKind::InvalidPublicKey,
        }
    }

    /// The provider failure behind this error, if there was one.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            GatewayError::AcquireFailed(e)
            | GatewayError::PinRejected(e)
            | GatewayError::KeyGenFailed(e)
            | GatewayError::KeyNotFound(e)
            | GatewayError::HashInitFailed(e)
            | GatewayError::HashFailed(e)
            | GatewayError::SignFailed(e)
            | GatewayError::ImportFailed(e)
            | GatewayError::ExportFailed(e) => Some(e),
            GatewayError::ContainerExists
            | GatewayError::ForeignKey
            | GatewayError::InvalidCredentials(_)
            | GatewayError::InvalidPublicKey(_) => None,
        }
    }
}
