//! RAII wrappers around raw provider handles.

use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::keys::{PublicKeyBlob, SignatureBytes};
use crate::provider::{
    AcquireMode, CryptoProvider, HashAlgorithm, KeySpec, ProviderKind, RawHash, RawKey, RawProv,
};

/// Runs a two-phase provider call (size query, then fill) and returns an
/// exactly-sized buffer.
fn read_sized<F>(mut call: F) -> Result<Vec<u8>, ProviderError>
where
    F: FnMut(Option<&mut [u8]>) -> Result<usize, ProviderError>,
{
    let required = call(None)?;
    let mut buf = vec![0u8; required];
    let written = call(Some(&mut buf))?;
    buf.truncate(written);
    Ok(buf)
}

/// An open provider session.
pub struct ProviderHandle<'p, P: CryptoProvider> {
    provider: &'p P,
    raw: RawProv,
    kind: ProviderKind,
}

impl<'p, P: CryptoProvider> ProviderHandle<'p, P> {
    pub fn acquire(
        provider: &'p P,
        container: Option<&[u8]>,
        kind: ProviderKind,
        mode: AcquireMode,
    ) -> Result<Self, ProviderError> {
        let raw = provider.acquire_context(container, kind, mode)?;
        debug!(kind = %kind, ?mode, handle = raw.0, "provider context acquired");
        Ok(Self {
            provider,
            raw,
            kind,
        })
    }

    pub fn raw(&self) -> RawProv {
        self.raw
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn set_pin(&self, pin: &[u8]) -> Result<(), ProviderError> {
        self.provider.set_pin(self.raw, pin)
    }

    pub fn create_hash(&self, alg: HashAlgorithm) -> Result<HashHandle<'_, P>, ProviderError> {
        let raw = self.provider.create_hash(self.raw, alg)?;
        Ok(HashHandle {
            provider: self.provider,
            raw,
        })
    }
}

impl<P: CryptoProvider> Drop for ProviderHandle<'_, P> {
    fn drop(&mut self) {
        if let Err(e) = self.provider.release_context(self.raw) {
            warn!(handle = self.raw.0, error = %e, "provider context release failed");
        }
    }
}

/// Borrowed reference to a key living inside a [`KeySession`]. Remembers
/// the provider instance that issued it.
pub struct KeyHandle<'s, P: CryptoProvider> {
    provider: &'s P,
    raw: RawKey,
}

impl<'s, P: CryptoProvider> KeyHandle<'s, P> {
    pub fn raw(&self) -> RawKey {
        self.raw
    }

    pub fn provider(&self) -> &'s P {
        self.provider
    }

    /// Whether this key was issued by `provider`.
    pub fn belongs_to(&self, provider: &P) -> bool {
        std::ptr::eq(self.provider, provider)
    }

    pub fn export_public_key(&self) -> Result<PublicKeyBlob, ProviderError> {
        let provider = self.provider;
        let key = self.raw;
        read_sized(|out| provider.export_public_key(key, out)).map(PublicKeyBlob::from)
    }
}

impl<P: CryptoProvider> Clone for KeyHandle<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: CryptoProvider> Copy for KeyHandle<'_, P> {}

/// A provider session together with one key object obtained from it.
///
/// The key is destroyed before the session is released.
pub struct KeySession<'p, P: CryptoProvider> {
    handle: ProviderHandle<'p, P>,
    key: RawKey,
}

impl<'p, P: CryptoProvider> KeySession<'p, P> {
    /// Fetches the stored key of the given role. On failure the session is
    /// released.
    pub fn open(handle: ProviderHandle<'p, P>, spec: KeySpec) -> Result<Self, ProviderError> {
        let key = handle.provider.user_key(handle.raw, spec)?;
        Ok(Self { handle, key })
    }

    /// Generates a new key pair of the given role in the session's container.
    pub fn generate(
        handle: ProviderHandle<'p, P>,
        spec: KeySpec,
        exportable: bool,
    ) -> Result<Self, ProviderError> {
        let key = handle.provider.generate_key(handle.raw, spec, exportable)?;
        Ok(Self { handle, key })
    }

    pub fn import(handle: ProviderHandle<'p, P>, blob: &[u8]) -> Result<Self, ProviderError> {
        let key = handle.provider.import_key(handle.raw, blob)?;
        Ok(Self { handle, key })
    }

    pub fn provider_handle(&self) -> &ProviderHandle<'p, P> {
        &self.handle
    }

    pub fn kind(&self) -> ProviderKind {
        self.handle.kind
    }

    pub fn key(&self) -> KeyHandle<'_, P> {
        KeyHandle {
            provider: self.handle.provider,
            raw: self.key,
        }
    }
}

impl<P: CryptoProvider> Drop for KeySession<'_, P> {
    fn drop(&mut self) {
        if let Err(e) = self.handle.provider.destroy_key(self.key) {
            warn!(key = self.key.0, error = %e, "key destroy failed");
        }
    }
}

/// A hash object bound to a session.
pub struct HashHandle<'s, P: CryptoProvider> {
    provider: &'s P,
    raw: RawHash,
}

impl<P: CryptoProvider> HashHandle<'_, P> {
    pub fn update(&self, data: &[u8]) -> Result<(), ProviderError> {
        self.provider.hash_data(self.raw, data)
    }

    /// Signs the hash with the session's key of the given role.
    pub fn sign(&self, spec: KeySpec) -> Result<SignatureBytes, ProviderError> {
        let provider = self.provider;
        let raw = self.raw;
        read_sized(|out| provider.sign_hash(raw, spec, out)).map(SignatureBytes::from)
    }

    pub fn verify(&self, signature: &[u8], key: KeyHandle<'_, P>) -> Result<bool, ProviderError> {
        self.provider.verify_signature(self.raw, signature, key.raw)
    }

    /// Finishes the hash and returns the digest.
    pub fn value(&self) -> Result<Vec<u8>, ProviderError> {
        let provider = self.provider;
        let raw = self.raw;
        read_sized(|out| provider.get_hash_value(raw, out))
    }
}

impl<P: CryptoProvider> Drop for HashHandle<'_, P> {
    fn drop(&mut self) {
        if let Err(e) = self.provider.destroy_hash(self.raw) {
            warn!(hash = self.raw.0, error = %e, "hash destroy failed");
        }
    }
}
