//! Each operation is one acquire, bind PIN, operate, release sequence.
//! Nothing is retried.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GatewayError, ProviderError};
use crate::handle::{KeyHandle, KeySession, ProviderHandle};
use crate::keys::{Address, ContainerCredentials, PublicKey, PublicKeyBlob, SignatureBytes};
use crate::provider::{AcquireMode, CryptoProvider, KeySpec, ProviderKind};
use crate::settings::GatewaySettings;
use crate::sink::{ErrorSink, SilentSink, TracingSink};

/// What `create_container` does when the named container already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingContainer {
    /// Delete the existing container and create a fresh one.
    #[default]
    Replace,
    /// Leave it untouched and report `ContainerExists`.
    Fail,
}

pub struct CredentialGateway<P: CryptoProvider> {
    provider: P,
    sink: Box<dyn ErrorSink>,
    existing: ExistingContainer,
}

impl<P: CryptoProvider> CredentialGateway<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            sink: Box::new(TracingSink),
            existing: ExistingContainer::default(),
        }
    }

    pub fn from_settings(provider: P, settings: &GatewaySettings) -> Self {
        let sink: Box<dyn ErrorSink> = if settings.report_provider_errors {
            Box::new(TracingSink)
        } else {
            Box::new(SilentSink)
        };
        Self {
            provider,
            sink,
            existing: settings.existing_container,
        }
    }

    pub fn with_sink(mut self, sink: impl ErrorSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn with_existing_container(mut self, policy: ExistingContainer) -> Self {
        self.existing = policy;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    fn fail(
        &self,
        operation: &'static str,
        wrap: fn(ProviderError) -> GatewayError,
        error: ProviderError,
    ) -> GatewayError {
        self.sink.provider_failure(operation, &error);
        wrap(error)
    }

    fn container_exists(&self, kind: ProviderKind, container: &[u8]) -> bool {
        ProviderHandle::acquire(&self.provider, Some(container), kind, AcquireMode::Open).is_ok()
    }

    fn own_key(&self, key: &KeyHandle<'_, P>) -> Result<(), GatewayError> {
        if key.belongs_to(&self.provider) {
            Ok(())
        } else {
            Err(GatewayError::ForeignKey)
        }
    }

    /// Creates a password-protected container holding a fresh exportable
    /// signature key pair.
    pub fn create_container(
        &self,
        kind: ProviderKind,
        container: &[u8],
        password: &[u8],
    ) -> Result<(), GatewayError> {
        const OP: &str = "create_container";
        let handle = match ProviderHandle::acquire(
            &self.provider,
            Some(container),
            kind,
            AcquireMode::CreateNew,
        ) {
            Ok(handle) => handle,
            Err(create_err) => {
                if !self.container_exists(kind, container) {
                    return Err(self.fail(OP, GatewayError::AcquireFailed, create_err));
                }
                match self.existing {
                    ExistingContainer::Fail => return Err(GatewayError::ContainerExists),
                    ExistingContainer::Replace => {
                        debug!(
                            container = %String::from_utf8_lossy(container),
                            "container exists, replacing"
                        );
                        self.provider
                            .delete_container(container, kind)
                            .map_err(|e| self.fail(OP, GatewayError::AcquireFailed, e))?;
                        ProviderHandle::acquire(
                            &self.provider,
                            Some(container),
                            kind,
                            AcquireMode::CreateNew,
                        )
                        .map_err(|e| self.fail(OP, GatewayError::AcquireFailed, e))?
                    }
                }
            }
        };
        let session = match handle.set_pin(password) {
            Ok(()) => KeySession::generate(handle, KeySpec::Signature, true)
                .map_err(|e| self.fail(OP, GatewayError::KeyGenFailed, e)),
            Err(e) => {
                drop(handle);
                Err(self.fail(OP, GatewayError::PinRejected, e))
            }
        };
        match session {
            Ok(session) => {
                drop(session);
                debug!(container = %String::from_utf8_lossy(container), kind = %kind, "container created");
                Ok(())
            }
            Err(err) => {
                // the container exists but holds no usable key
                if let Err(e) = self.provider.delete_container(container, kind) {
                    self.sink.provider_failure(OP, &e);
                }
                Err(err)
            }
        }
    }

    /// Opens a container, authenticates and fetches the key of `spec`.
    pub fn open_container(
        &self,
        kind: ProviderKind,
        container: &[u8],
        password: &[u8],
        spec: KeySpec,
    ) -> Result<KeySession<'_, P>, GatewayError> {
        const OP: &str = "open_container";
        let handle =
            ProviderHandle::acquire(&self.provider, Some(container), kind, AcquireMode::Open)
                .map_err(|e| self.fail(OP, GatewayError::AcquireFailed, e))?;
        handle
            .set_pin(password)
            .map_err(|e| self.fail(OP, GatewayError::PinRejected, e))?;
        KeySession::open(handle, spec).map_err(|e| self.fail(OP, GatewayError::KeyNotFound, e))
    }

    /// Confirms the container exists and accepts `password`.
    pub fn check_container(
        &self,
        kind: ProviderKind,
        container: &[u8],
        password: &[u8],
    ) -> Result<(), GatewayError> {
        const OP: &str = "check_container";
        let handle =
            ProviderHandle::acquire(&self.provider, Some(container), kind, AcquireMode::Open)
                .map_err(|e| self.fail(OP, GatewayError::AcquireFailed, e))?;
        handle
            .set_pin(password)
            .map_err(|e| self.fail(OP, GatewayError::PinRejected, e))
    }

    /// Hashes `data` with the kind's algorithm and signs the hash with the
    /// container key of role `spec`.
    pub fn sign_message(
        &self,
        kind: ProviderKind,
        container: &[u8],
        password: &[u8],
        data: &[u8],
        spec: KeySpec,
    ) -> Result<SignatureBytes, GatewayError> {
        const OP: &str = "sign_message";
        let handle =
            ProviderHandle::acquire(&self.provider, Some(container), kind, AcquireMode::Open)
                .map_err(|e| self.fail(OP, GatewayError::AcquireFailed, e))?;
        handle
            .set_pin(password)
            .map_err(|e| self.fail(OP, GatewayError::PinRejected, e))?;
        let hash = handle
            .create_hash(kind.hash_algorithm())
            .map_err(|e| self.fail(OP, GatewayError::HashInitFailed, e))?;
        hash.update(data)
            .map_err(|e| self.fail(OP, GatewayError::HashFailed, e))?;
        hash.sign(spec)
            .map_err(|e| self.fail(OP, GatewayError::SignFailed, e))
    }

    /// Checks `signature` over `data` with `key`. A mismatch is `Ok(false)`;
    /// errors are reserved for failures to set up the check.
    pub fn verify_sign(
        &self,
        kind: ProviderKind,
        key: KeyHandle<'_, P>,
        signature: &[u8],
        data: &[u8],
    ) -> Result<bool, GatewayError> {
        const OP: &str = "verify_sign";
        self.own_key(&key)?;
        let handle = ProviderHandle::acquire(&self.provider, None, kind, AcquireMode::VerifyOnly)
            .map_err(|e| self.fail(OP, GatewayError::AcquireFailed, e))?;
        let hash = handle
            .create_hash(kind.hash_algorithm())
            .map_err(|e| self.fail(OP, GatewayError::HashInitFailed, e))?;
        hash.update(data)
            .map_err(|e| self.fail(OP, GatewayError::HashFailed, e))?;
        match hash.verify(signature, key) {
            Ok(valid) => Ok(valid),
            Err(e) => {
                self.sink.provider_failure(OP, &e);
                Ok(false)
            }
        }
    }

    /// Imports a public key blob into a container-less session.
    pub fn import_public_key(
        &self,
        kind: ProviderKind,
        blob: &[u8],
    ) -> Result<KeySession<'_, P>, GatewayError> {
        const OP: &str = "import_public_key";
        let handle = ProviderHandle::acquire(&self.provider, None, kind, AcquireMode::VerifyOnly)
            .map_err(|e| self.fail(OP, GatewayError::AcquireFailed, e))?;
        KeySession::import(handle, blob).map_err(|e| self.fail(OP, GatewayError::ImportFailed, e))
    }

    /// Exports the public half of `key` as an exactly-sized blob.
    pub fn export_public_key_bytes(
        &self,
        key: KeyHandle<'_, P>,
    ) -> Result<PublicKeyBlob, GatewayError> {
        self.own_key(&key)?;
        key.export_public_key()
            .map_err(|e| self.fail("export_public_key_bytes", GatewayError::ExportFailed, e))
    }

    /// Hashes the tagged key bytes with the 256-bit algorithm, whatever the
    /// key's own kind.
    pub fn address(&self, key: &PublicKey) -> Result<Address, GatewayError> {
        const OP: &str = "address";
        let kind = ProviderKind::Gost256;
        let handle = ProviderHandle::acquire(&self.provider, None, kind, AcquireMode::VerifyOnly)
            .map_err(|e| self.fail(OP, GatewayError::AcquireFailed, e))?;
        let hash = handle
            .create_hash(kind.hash_algorithm())
            .map_err(|e| self.fail(OP, GatewayError::HashInitFailed, e))?;
        hash.update(&key.to_bytes())
            .map_err(|e| self.fail(OP, GatewayError::HashFailed, e))?;
        hash.value()
            .map(Address::from)
            .map_err(|e| self.fail(OP, GatewayError::HashFailed, e))
    }

    /// Compares two public keys by address.
    pub fn same_key(&self, a: &PublicKey, b: &PublicKey) -> Result<bool, GatewayError> {
        Ok(self.address(a)? == self.address(b)?)
    }

    /// Parses serialized credentials and checks them against the provider.
    pub fn load_credentials(&self, bytes: &[u8]) -> Result<ContainerCredentials, GatewayError> {
        let creds = ContainerCredentials::from_bytes(bytes)?;
        self.check_container(creds.kind(), creds.container(), creds.password())?;
        Ok(creds)
    }

    pub fn sign_with(
        &self,
        creds: &ContainerCredentials,
        data: &[u8],
        spec: KeySpec,
    ) -> Result<SignatureBytes, GatewayError> {
        self.sign_message(creds.kind(), creds.container(), creds.password(), data, spec)
    }

    /// Exports the public half of the container key of role `spec`.
    pub fn public_key(
        &self,
        creds: &ContainerCredentials,
        spec: KeySpec,
    ) -> Result<PublicKey, GatewayError> {
        let session =
            self.open_container(creds.kind(), creds.container(), creds.password(), spec)?;
        let blob = self.export_public_key_bytes(session.key())?;
        Ok(PublicKey::new(creds.kind(), blob))
    }

    /// Parses a tagged public key and has the provider validate the blob.
    pub fn load_public_key(&self, bytes: &[u8]) -> Result<PublicKey, GatewayError> {
        let key = PublicKey::from_bytes(bytes)?;
        self.import_public_key(key.kind(), key.blob().as_bytes())?;
        Ok(key)
    }

    pub fn verify_with_public_key(
        &self,
        key: &PublicKey,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool, GatewayError> {
        let session = self.import_public_key(key.kind(), key.blob().as_bytes())?;
        self.verify_sign(key.kind(), session.key(), signature, data)
    }
}
