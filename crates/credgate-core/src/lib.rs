//! Credential gateway over an external cryptographic service provider.
//! Every hash, signature and key lives behind [`provider::CryptoProvider`].

pub mod batch;
#[cfg(feature = "cryptopro")]
pub mod capi;
pub mod error;
pub mod gateway;
pub mod handle;
pub mod keys;
pub mod paths;
pub mod provider;
pub mod settings;
pub mod sink;
pub mod soft;

pub use batch::BatchVerifier;
pub use error::{ErrorKind, GatewayError, ProviderError};
pub use gateway::{CredentialGateway, ExistingContainer};
pub use handle::{HashHandle, KeyHandle, KeySession, ProviderHandle};
pub use keys::{Address, ContainerCredentials, PublicKey, PublicKeyBlob, SignatureBytes};
pub use provider::{CryptoProvider, KeySpec, ProviderKind};
pub use settings::GatewaySettings;
pub use sink::{ErrorSink, SilentSink, TracingSink};
pub use soft::SoftProvider;
