//! In-memory provider for development and tests. SHA-2 and Ed25519 stand
//! in for the GOST primitives, so its signatures are not GOST signatures.

use std::collections::HashMap;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroizing;

use crate::error::{codes, ProviderError};
use crate::provider::{
    AcquireMode, CryptoProvider, HashAlgorithm, KeySpec, ProviderCall, ProviderKind, RawHash,
    RawKey, RawProv,
};

/// `PUBLICKEYBLOB` type byte and blob version used in exported keys.
const BLOB_TYPE: u8 = 0x06;
const BLOB_VERSION: u8 = 0x20;
const PUBLIC_KEY_LEN: usize = 32;
const BLOB_LEN: usize = 3 + PUBLIC_KEY_LEN;
const SIGNATURE_LEN: usize = 64;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SoftStats {
    pub contexts_acquired: u64,
    pub contexts_released: u64,
    pub keys_created: u64,
    pub keys_destroyed: u64,
    pub hashes_created: u64,
    pub hashes_destroyed: u64,
}

impl SoftStats {
    /// Every acquired handle has been given back.
    pub fn is_balanced(&self) -> bool {
        self.contexts_acquired == self.contexts_released
            && self.keys_created == self.keys_destroyed
            && self.hashes_created == self.hashes_destroyed
    }
}

type ContainerId = (ProviderKind, Vec<u8>);

#[derive(Default)]
struct Container {
    pin: Option<Zeroizing<Vec<u8>>>,
    keys: HashMap<KeySpec, SigningKey>,
}

struct Context {
    kind: ProviderKind,
    container: Option<ContainerId>,
    authenticated: bool,
}

enum KeyMaterial {
    Private(SigningKey),
    Public(VerifyingKey),
}

struct KeyObject {
    kind: ProviderKind,
    material: KeyMaterial,
}

impl KeyObject {
    fn verifying_key(&self) -> VerifyingKey {
        match &self.material {
            KeyMaterial::Private(signing) => signing.verifying_key(),
            KeyMaterial::Public(verifying) => *verifying,
        }
    }
}

#[derive(Clone)]
enum DigestState {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl DigestState {
    fn new(alg: HashAlgorithm) -> Self {
        match alg {
            HashAlgorithm::Streebog256 => DigestState::Sha256(Sha256::new()),
            HashAlgorithm::Streebog512 => DigestState::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            DigestState::Sha256(h) => h.update(data),
            DigestState::Sha512(h) => h.update(data),
        }
    }

    /// Digest of everything hashed so far, leaving the state usable.
    fn peek(&self) -> Vec<u8> {
        match self {
            DigestState::Sha256(h) => h.clone().finalize().to_vec(),
            DigestState::Sha512(h) => h.clone().finalize().to_vec(),
        }
    }
}

struct HashObject {
    prov: usize,
    state: DigestState,
    finished: bool,
}

#[derive(Default)]
struct SoftState {
    containers: HashMap<ContainerId, Container>,
    next_handle: usize,
    contexts: HashMap<usize, Context>,
    keys: HashMap<usize, KeyObject>,
    hashes: HashMap<usize, HashObject>,
    // calls left before the injected failure fires
    faults: HashMap<ProviderCall, u32>,
    stats: SoftStats,
}

impl SoftState {
    fn next_id(&mut self) -> usize {
        self.next_handle += 1;
        self.next_handle
    }

    fn trip(&mut self, call: ProviderCall) -> Result<(), ProviderError> {
        let Some(remaining) = self.faults.get_mut(&call) else {
            return Ok(());
        };
        if *remaining > 1 {
            *remaining -= 1;
            return Ok(());
        }
        self.faults.remove(&call);
        Err(ProviderError::new(call, codes::NTE_FAIL))
    }

    fn context(&self, call: ProviderCall, prov: RawProv) -> Result<&Context, ProviderError> {
        self.contexts
            .get(&prov.0)
            .ok_or_else(|| ProviderError::new(call, codes::NTE_BAD_UID))
    }

    fn insert_key(&mut self, kind: ProviderKind, material: KeyMaterial) -> RawKey {
        let id = self.next_id();
        self.keys.insert(id, KeyObject { kind, material });
        self.stats.keys_created += 1;
        RawKey(id)
    }
}

#[derive(Default)]
pub struct SoftProvider {
    state: Mutex<SoftState>,
}

impl SoftProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call of kind `call` fail with `NTE_FAIL`. Cleanup
    /// calls are never failed.
    pub fn fail_next(&self, call: ProviderCall) {
        self.fail_nth(call, 1);
    }

    /// Lets `n - 1` calls of kind `call` through and fails the one after.
    /// Reaches the fill phase of two-phase calls with `n = 2`.
    pub fn fail_nth(&self, call: ProviderCall, n: u32) {
        self.state.lock().faults.insert(call, n.max(1));
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    pub fn stats(&self) -> SoftStats {
        self.state.lock().stats
    }

    pub fn open_contexts(&self) -> usize {
        self.state.lock().contexts.len()
    }

    pub fn open_keys(&self) -> usize {
        self.state.lock().keys.len()
    }

    pub fn open_hashes(&self) -> usize {
        self.state.lock().hashes.len()
    }

    pub fn has_container(&self, kind: ProviderKind, name: &[u8]) -> bool {
        self.state
            .lock()
            .containers
            .contains_key(&(kind, name.to_vec()))
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().containers.len()
    }
}

fn encode_blob(kind: ProviderKind, key: &VerifyingKey) -> [u8; BLOB_LEN] {
    let mut blob = [0u8; BLOB_LEN];
    blob[0] = BLOB_TYPE;
    blob[1] = BLOB_VERSION;
    blob[2] = kind.provider_type();
    blob[3..].copy_from_slice(key.as_bytes());
    blob
}

fn decode_blob(blob: &[u8]) -> Result<(ProviderKind, VerifyingKey), ProviderError> {
    let err = |code| ProviderError::new(ProviderCall::ImportKey, code);
    if blob.len() != BLOB_LEN || blob[0] != BLOB_TYPE || blob[1] != BLOB_VERSION {
        return Err(err(codes::NTE_BAD_TYPE));
    }
    let kind = ProviderKind::from_provider_type(blob[2]).ok_or_else(|| err(codes::NTE_BAD_TYPE))?;
    let mut raw = [0u8; PUBLIC_KEY_LEN];
    raw.copy_from_slice(&blob[3..]);
    let key = VerifyingKey::from_bytes(&raw).map_err(|_| err(codes::NTE_BAD_DATA))?;
    Ok((kind, key))
}

/// Copies `src` into the caller's buffer following the two-phase protocol.
fn fill(call: ProviderCall, src: &[u8], out: Option<&mut [u8]>) -> Result<usize, ProviderError> {
    match out {
        None => Ok(src.len()),
        Some(buf) if buf.len() < src.len() => {
            Err(ProviderError::new(call, codes::ERROR_MORE_DATA))
        }
        Some(buf) => {
            buf[..src.len()].copy_from_slice(src);
            Ok(src.len())
        }
    }
}

impl CryptoProvider for SoftProvider {
    fn acquire_context(
        &self,
        container: Option<&[u8]>,
        kind: ProviderKind,
        mode: AcquireMode,
    ) -> Result<RawProv, ProviderError> {
        const CALL: ProviderCall = ProviderCall::AcquireContext;
        let mut st = self.state.lock();
        st.trip(CALL)?;
        let (container, authenticated) = match (mode, container) {
            (AcquireMode::VerifyOnly, None) => (None, false),
            (AcquireMode::VerifyOnly, Some(_)) => {
                return Err(ProviderError::new(CALL, codes::NTE_BAD_FLAGS))
            }
            (_, None) => return Err(ProviderError::new(CALL, codes::NTE_BAD_KEYSET_PARAM)),
            (AcquireMode::Open, Some(name)) => {
                let id = (kind, name.to_vec());
                if !st.containers.contains_key(&id) {
                    return Err(ProviderError::new(CALL, codes::NTE_BAD_KEYSET));
                }
                (Some(id), false)
            }
            (AcquireMode::CreateNew, Some(name)) => {
                let id = (kind, name.to_vec());
                if st.containers.contains_key(&id) {
                    return Err(ProviderError::new(CALL, codes::NTE_EXISTS));
                }
                st.containers.insert(id.clone(), Container::default());
                (Some(id), true)
            }
        };
        let handle = st.next_id();
        st.contexts.insert(
            handle,
            Context {
                kind,
                container,
                authenticated,
            },
        );
        st.stats.contexts_acquired += 1;
        Ok(RawProv(handle))
    }

    fn delete_container(&self, container: &[u8], kind: ProviderKind) -> Result<(), ProviderError> {
        const CALL: ProviderCall = ProviderCall::DeleteContainer;
        let mut st = self.state.lock();
        st.trip(CALL)?;
        st.containers
            .remove(&(kind, container.to_vec()))
            .map(|_| ())
            .ok_or_else(|| ProviderError::new(CALL, codes::NTE_BAD_KEYSET))
    }

    fn set_pin(&self, prov: RawProv, pin: &[u8]) -> Result<(), ProviderError> {
        const CALL: ProviderCall = ProviderCall::SetPin;
        let mut st = self.state.lock();
        st.trip(CALL)?;
        let id = st
            .context(CALL, prov)?
            .container
            .clone()
            .ok_or_else(|| ProviderError::new(CALL, codes::NTE_PERM))?;
        let container = st
            .containers
            .get_mut(&id)
            .ok_or_else(|| ProviderError::new(CALL, codes::NTE_BAD_KEYSET))?;
        match container.pin.as_ref().map(|bound| bound.as_slice() == pin) {
            None => container.pin = Some(Zeroizing::new(pin.to_vec())),
            Some(true) => {}
            Some(false) => return Err(ProviderError::new(CALL, codes::SCARD_W_WRONG_CHV)),
        }
        if let Some(ctx) = st.contexts.get_mut(&prov.0) {
            ctx.authenticated = true;
        }
        Ok(())
    }

    fn generate_key(
        &self,
        prov: RawProv,
        spec: KeySpec,
        _exportable: bool,
    ) -> Result<RawKey, ProviderError> {
        const CALL: ProviderCall = ProviderCall::GenerateKey;
        let mut st = self.state.lock();
        st.trip(CALL)?;
        let ctx = st.context(CALL, prov)?;
        let kind = ctx.kind;
        if !ctx.authenticated {
            return Err(ProviderError::new(CALL, codes::NTE_PERM));
        }
        let id = ctx
            .container
            .clone()
            .ok_or_else(|| ProviderError::new(CALL, codes::NTE_PERM))?;
        let signing = SigningKey::generate(&mut OsRng);
        st.containers
            .get_mut(&id)
            .ok_or_else(|| ProviderError::new(CALL, codes::NTE_BAD_KEYSET))?
            .keys
            .insert(spec, signing.clone());
        Ok(st.insert_key(kind, KeyMaterial::Private(signing)))
    }

    fn user_key(&self, prov: RawProv, spec: KeySpec) -> Result<RawKey, ProviderError> {
        const CALL: ProviderCall = ProviderCall::UserKey;
        let mut st = self.state.lock();
        st.trip(CALL)?;
        let ctx = st.context(CALL, prov)?;
        let kind = ctx.kind;
        let signing = ctx
            .container
            .as_ref()
            .and_then(|id| st.containers.get(id))
            .and_then(|c| c.keys.get(&spec))
            .cloned()
            .ok_or_else(|| ProviderError::new(CALL, codes::NTE_NO_KEY))?;
        Ok(st.insert_key(kind, KeyMaterial::Private(signing)))
    }

    fn import_key(&self, prov: RawProv, blob: &[u8]) -> Result<RawKey, ProviderError> {
        const CALL: ProviderCall = ProviderCall::ImportKey;
        let mut st = self.state.lock();
        st.trip(CALL)?;
        let ctx_kind = st.context(CALL, prov)?.kind;
        let (kind, key) = decode_blob(blob)?;
        if kind != ctx_kind {
            return Err(ProviderError::new(CALL, codes::NTE_BAD_ALGID));
        }
        Ok(st.insert_key(kind, KeyMaterial::Public(key)))
    }

    fn export_public_key(
        &self,
        key: RawKey,
        out: Option<&mut [u8]>,
    ) -> Result<usize, ProviderError> {
        const CALL: ProviderCall = ProviderCall::ExportKey;
        let mut st = self.state.lock();
        st.trip(CALL)?;
        let object = st
            .keys
            .get(&key.0)
            .ok_or_else(|| ProviderError::new(CALL, codes::NTE_BAD_KEY))?;
        let blob = encode_blob(object.kind, &object.verifying_key());
        fill(CALL, &blob, out)
    }

    fn create_hash(&self, prov: RawProv, alg: HashAlgorithm) -> Result<RawHash, ProviderError> {
        const CALL: ProviderCall = ProviderCall::CreateHash;
        let mut st = self.state.lock();
        st.trip(CALL)?;
        st.context(CALL, prov)?;
        let id = st.next_id();
        st.hashes.insert(
            id,
            HashObject {
                prov: prov.0,
                state: DigestState::new(alg),
                finished: false,
            },
        );
        st.stats.hashes_created += 1;
        Ok(RawHash(id))
    }

    fn hash_data(&self, hash: RawHash, data: &[u8]) -> Result<(), ProviderError> {
        const CALL: ProviderCall = ProviderCall::HashData;
        let mut st = self.state.lock();
        st.trip(CALL)?;
        let object = st
            .hashes
            .get_mut(&hash.0)
            .ok_or_else(|| ProviderError::new(CALL, codes::NTE_BAD_UID))?;
        if object.finished {
            return Err(ProviderError::new(CALL, codes::NTE_BAD_HASH_STATE));
        }
        object.state.update(data);
        Ok(())
    }

    fn get_hash_value(
        &self,
        hash: RawHash,
        out: Option<&mut [u8]>,
    ) -> Result<usize, ProviderError> {
        const CALL: ProviderCall = ProviderCall::HashValue;
        let mut st = self.state.lock();
        st.trip(CALL)?;
        let object = st
            .hashes
            .get_mut(&hash.0)
            .ok_or_else(|| ProviderError::new(CALL, codes::NTE_BAD_UID))?;
        let digest = object.state.peek();
        let filling = out.is_some();
        let written = fill(CALL, &digest, out)?;
        if filling {
            object.finished = true;
        }
        Ok(written)
    }

    fn sign_hash(
        &self,
        hash: RawHash,
        spec: KeySpec,
        out: Option<&mut [u8]>,
    ) -> Result<usize, ProviderError> {
        const CALL: ProviderCall = ProviderCall::SignHash;
        let mut st = self.state.lock();
        st.trip(CALL)?;
        let object = st
            .hashes
            .get(&hash.0)
            .ok_or_else(|| ProviderError::new(CALL, codes::NTE_BAD_UID))?;
        let ctx = st.context(CALL, RawProv(object.prov))?;
        let container = ctx
            .container
            .as_ref()
            .and_then(|id| st.containers.get(id))
            .ok_or_else(|| ProviderError::new(CALL, codes::NTE_NO_KEY))?;
        if container.pin.is_some() && !ctx.authenticated {
            return Err(ProviderError::new(CALL, codes::NTE_PERM));
        }
        let signing = container
            .keys
            .get(&spec)
            .ok_or_else(|| ProviderError::new(CALL, codes::NTE_NO_KEY))?;
        let Some(buf) = out else {
            return Ok(SIGNATURE_LEN);
        };
        let signature = signing.sign(&object.state.peek()).to_bytes();
        let written = fill(CALL, &signature, Some(buf))?;
        if let Some(object) = st.hashes.get_mut(&hash.0) {
            object.finished = true;
        }
        Ok(written)
    }

    fn verify_signature(
        &self,
        hash: RawHash,
        signature: &[u8],
        key: RawKey,
    ) -> Result<bool, ProviderError> {
        const CALL: ProviderCall = ProviderCall::VerifySignature;
        let mut st = self.state.lock();
        st.trip(CALL)?;
        let digest = st
            .hashes
            .get(&hash.0)
            .ok_or_else(|| ProviderError::new(CALL, codes::NTE_BAD_UID))?
            .state
            .peek();
        let verifying = st
            .keys
            .get(&key.0)
            .ok_or_else(|| ProviderError::new(CALL, codes::NTE_BAD_KEY))?
            .verifying_key();
        if let Some(object) = st.hashes.get_mut(&hash.0) {
            object.finished = true;
        }
        let Ok(signature) = Signature::from_slice(signature) else {
            return Ok(false);
        };
        Ok(verifying.verify_strict(&digest, &signature).is_ok())
    }

    fn destroy_key(&self, key: RawKey) -> Result<(), ProviderError> {
        let mut st = self.state.lock();
        st.keys
            .remove(&key.0)
            .ok_or_else(|| ProviderError::new(ProviderCall::DestroyKey, codes::NTE_BAD_KEY))?;
        st.stats.keys_destroyed += 1;
        Ok(())
    }

    fn destroy_hash(&self, hash: RawHash) -> Result<(), ProviderError> {
        let mut st = self.state.lock();
        st.hashes
            .remove(&hash.0)
            .ok_or_else(|| ProviderError::new(ProviderCall::DestroyHash, codes::NTE_BAD_UID))?;
        st.stats.hashes_destroyed += 1;
        Ok(())
    }

    fn release_context(&self, prov: RawProv) -> Result<(), ProviderError> {
        let mut st = self.state.lock();
        st.contexts
            .remove(&prov.0)
            .ok_or_else(|| ProviderError::new(ProviderCall::ReleaseContext, codes::NTE_BAD_UID))?;
        st.stats.contexts_released += 1;
        Ok(())
    }
}
