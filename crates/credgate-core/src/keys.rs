use std::fmt;

use zeroize::Zeroizing;

use crate::error::GatewayError;
use crate::provider::{ProviderKind, KEY_TYPE};

/// Signature produced by the provider, sized exactly to what it reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureBytes(Vec<u8>);

impl SignatureBytes {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl From<Vec<u8>> for SignatureBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for SignatureBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Public key in the provider's export format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyBlob(Vec<u8>);

impl PublicKeyBlob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for PublicKeyBlob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for PublicKeyBlob {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Everything needed to reach a private key: provider kind, container name
/// and the container password.
///
/// Wire form: `kind(1) || name_len(u16 LE) || name || password`.
#[derive(Clone, PartialEq, Eq)]
pub struct ContainerCredentials {
    kind: ProviderKind,
    container: Vec<u8>,
    password: Zeroizing<Vec<u8>>,
}

impl ContainerCredentials {
    pub fn new(
        kind: ProviderKind,
        container: impl Into<Vec<u8>>,
        password: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            kind,
            container: container.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn container(&self) -> &[u8] {
        &self.container
    }

    pub fn password(&self) -> &[u8] {
        &self.password
    }

    /// Serialized form. Contains the password, so the buffer zeroizes on drop.
    pub fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>, GatewayError> {
        let name_len = u16::try_from(self.container.len()).map_err(|_| {
            GatewayError::InvalidCredentials(format!(
                "container name too long ({} bytes)",
                self.container.len()
            ))
        })?;
        let mut out = Zeroizing::new(Vec::with_capacity(
            3 + self.container.len() + self.password.len(),
        ));
        out.push(self.kind.provider_type());
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(&self.container);
        out.extend_from_slice(&self.password);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GatewayError> {
        let (&kind_byte, rest) = bytes
            .split_first()
            .ok_or_else(|| GatewayError::InvalidCredentials("empty input".into()))?;
        let kind = ProviderKind::from_provider_type(kind_byte).ok_or_else(|| {
            GatewayError::InvalidCredentials(format!("unknown provider type {kind_byte}"))
        })?;
        if rest.len() < 2 {
            return Err(GatewayError::InvalidCredentials(
                "missing container name length".into(),
            ));
        }
        let name_len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
        let rest = &rest[2..];
        if rest.len() < name_len {
            return Err(GatewayError::InvalidCredentials(format!(
                "container name truncated: need {name_len} bytes, have {}",
                rest.len()
            )));
        }
        let (container, password) = rest.split_at(name_len);
        if container.is_empty() {
            return Err(GatewayError::InvalidCredentials(
                "container name is empty".into(),
            ));
        }
        Ok(Self::new(kind, container, password))
    }
}

impl fmt::Display for ContainerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Priv({} {}){{{}}}",
            KEY_TYPE,
            self.kind,
            String::from_utf8_lossy(&self.container)
        )
    }
}

impl fmt::Debug for ContainerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerCredentials")
            .field("kind", &self.kind)
            .field("container", &String::from_utf8_lossy(&self.container))
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A public key tagged with its provider kind: `kind(1) || blob`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    kind: ProviderKind,
    blob: PublicKeyBlob,
}

impl PublicKey {
    pub fn new(kind: ProviderKind, blob: PublicKeyBlob) -> Self {
        Self { kind, blob }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn blob(&self) -> &PublicKeyBlob {
        &self.blob
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.blob.len());
        out.push(self.kind.provider_type());
        out.extend_from_slice(self.blob.as_bytes());
        out
    }

    /// Parses the tagged form. This only checks framing; use
    /// [`crate::gateway::CredentialGateway::load_public_key`] to have the
    /// provider validate the blob as well.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GatewayError> {
        let (&kind_byte, blob) = bytes
            .split_first()
            .ok_or_else(|| GatewayError::InvalidPublicKey("empty input".into()))?;
        let kind = ProviderKind::from_provider_type(kind_byte).ok_or_else(|| {
            GatewayError::InvalidPublicKey(format!("unknown provider type {kind_byte}"))
        })?;
        if blob.is_empty() {
            return Err(GatewayError::InvalidPublicKey("key blob is empty".into()));
        }
        Ok(Self::new(kind, PublicKeyBlob::from(blob.to_vec())))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pub({} {}){{{}}}",
            KEY_TYPE,
            self.kind,
            hex::encode_upper(self.to_bytes())
        )
    }
}

/// 256-bit provider digest of a tagged public key. Two keys are the same
/// key when their addresses match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(Vec<u8>);

impl Address {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl From<Vec<u8>> for Address {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(&self.0))
    }
}
