use crate::error::GatewayError;
use crate::gateway::CredentialGateway;
use crate::keys::PublicKey;
use crate::provider::CryptoProvider;

struct Entry {
    key: PublicKey,
    message: Vec<u8>,
    signature: Vec<u8>,
}

/// Collects signatures and checks them in one pass.
#[derive(Default)]
pub struct BatchVerifier {
    entries: Vec<Entry>,
}

impl BatchVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: PublicKey, message: &[u8], signature: &[u8]) {
        self.entries.push(Entry {
            key,
            message: message.to_vec(),
            signature: signature.to_vec(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Verifies every entry in insertion order. Returns whether all of them
    /// matched, along with the result for each one. An empty batch is
    /// trivially valid. Failures to set up a check end the batch.
    pub fn verify<P: CryptoProvider>(
        &self,
        gateway: &CredentialGateway<P>,
    ) -> Result<(bool, Vec<bool>), GatewayError> {
        let results = self
            .entries
            .iter()
            .map(|e| gateway.verify_with_public_key(&e.key, &e.message, &e.signature))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((results.iter().all(|ok| *ok), results))
    }
}
