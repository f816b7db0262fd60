//! [`CryptoProvider`] over CryptoAPI, as exported by CryptoPro CSP.

mod ffi;

use std::ffi::CString;
use std::ptr;

use crate::error::{codes, ProviderError};
use crate::provider::{
    AcquireMode, CryptoProvider, HashAlgorithm, KeySpec, ProviderCall, ProviderKind, RawHash,
    RawKey, RawProv,
};

fn last_error(call: ProviderCall) -> ProviderError {
    // SAFETY: GetLastError only reads thread-local state.
    let code = unsafe { ffi::GetLastError() };
    ProviderError::new(call, code)
}

fn check(call: ProviderCall, ok: ffi::BOOL) -> Result<(), ProviderError> {
    if ok == 0 {
        return Err(last_error(call));
    }
    Ok(())
}

fn c_string(call: ProviderCall, bytes: &[u8]) -> Result<CString, ProviderError> {
    CString::new(bytes).map_err(|_| ProviderError::new(call, codes::NTE_BAD_KEYSET_PARAM))
}

fn dword_len(call: ProviderCall, len: usize) -> Result<ffi::DWORD, ProviderError> {
    ffi::DWORD::try_from(len).map_err(|_| ProviderError::new(call, codes::NTE_BAD_DATA))
}

/// Stateless: all state lives in the CSP behind the handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct CapiProvider;

impl CapiProvider {
    pub fn new() -> Self {
        Self
    }
}

impl CryptoProvider for CapiProvider {
    fn acquire_context(
        &self,
        container: Option<&[u8]>,
        kind: ProviderKind,
        mode: AcquireMode,
    ) -> Result<RawProv, ProviderError> {
        const CALL: ProviderCall = ProviderCall::AcquireContext;
        let name = container.map(|c| c_string(CALL, c)).transpose()?;
        let flags = match mode {
            AcquireMode::Open => 0,
            AcquireMode::CreateNew => ffi::CRYPT_NEWKEYSET | ffi::CRYPT_SILENT,
            AcquireMode::VerifyOnly => ffi::CRYPT_VERIFYCONTEXT,
        };
        let mut prov: ffi::HCRYPTPROV = 0;
        // SAFETY: `name` outlives the call; `prov` is a valid out pointer.
        let ok = unsafe {
            ffi::CryptAcquireContextA(
                &mut prov,
                name.as_ref().map_or(ptr::null(), |n| n.as_ptr()),
                ptr::null(),
                ffi::DWORD::from(kind.provider_type()),
                flags,
            )
        };
        check(CALL, ok)?;
        Ok(RawProv(prov))
    }

    fn delete_container(&self, container: &[u8], kind: ProviderKind) -> Result<(), ProviderError> {
        const CALL: ProviderCall = ProviderCall::DeleteContainer;
        let name = c_string(CALL, container)?;
        let mut prov: ffi::HCRYPTPROV = 0;
        // SAFETY: DELETEKEYSET does not return a usable handle, so nothing is released.
        let ok = unsafe {
            ffi::CryptAcquireContextA(
                &mut prov,
                name.as_ptr(),
                ptr::null(),
                ffi::DWORD::from(kind.provider_type()),
                ffi::CRYPT_DELETEKEYSET,
            )
        };
        check(CALL, ok)
    }

    fn set_pin(&self, prov: RawProv, pin: &[u8]) -> Result<(), ProviderError> {
        const CALL: ProviderCall = ProviderCall::SetPin;
        let pin = c_string(CALL, pin)?;
        // SAFETY: PP_SIGNATURE_PIN takes a NUL-terminated string.
        let ok = unsafe {
            ffi::CryptSetProvParam(prov.0, ffi::PP_SIGNATURE_PIN, pin.as_ptr().cast(), 0)
        };
        check(CALL, ok)
    }

    fn generate_key(
        &self,
        prov: RawProv,
        spec: KeySpec,
        exportable: bool,
    ) -> Result<RawKey, ProviderError> {
        let flags = if exportable { ffi::CRYPT_EXPORTABLE } else { 0 };
        let mut key: ffi::HCRYPTKEY = 0;
        // SAFETY: `key` is a valid out pointer.
        let ok = unsafe { ffi::CryptGenKey(prov.0, spec.as_raw(), flags, &mut key) };
        check(ProviderCall::GenerateKey, ok)?;
        Ok(RawKey(key))
    }

    fn user_key(&self, prov: RawProv, spec: KeySpec) -> Result<RawKey, ProviderError> {
        let mut key: ffi::HCRYPTKEY = 0;
        // SAFETY: `key` is a valid out pointer.
        let ok = unsafe { ffi::CryptGetUserKey(prov.0, spec.as_raw(), &mut key) };
        check(ProviderCall::UserKey, ok)?;
        Ok(RawKey(key))
    }

    fn import_key(&self, prov: RawProv, blob: &[u8]) -> Result<RawKey, ProviderError> {
        const CALL: ProviderCall = ProviderCall::ImportKey;
        let len = dword_len(CALL, blob.len())?;
        let mut key: ffi::HCRYPTKEY = 0;
        // SAFETY: `blob` is valid for `len` bytes; `key` is a valid out pointer.
        let ok = unsafe { ffi::CryptImportKey(prov.0, blob.as_ptr(), len, 0, 0, &mut key) };
        check(CALL, ok)?;
        Ok(RawKey(key))
    }

    fn export_public_key(
        &self,
        key: RawKey,
        out: Option<&mut [u8]>,
    ) -> Result<usize, ProviderError> {
        const CALL: ProviderCall = ProviderCall::ExportKey;
        let (ptr, mut len) = match out {
            Some(buf) => (buf.as_mut_ptr(), dword_len(CALL, buf.len())?),
            None => (ptr::null_mut(), 0),
        };
        // SAFETY: `ptr` is null (size query) or valid for `len` bytes.
        let ok = unsafe { ffi::CryptExportKey(key.0, 0, ffi::PUBLICKEYBLOB, 0, ptr, &mut len) };
        check(CALL, ok)?;
        Ok(len as usize)
    }

    fn create_hash(&self, prov: RawProv, alg: HashAlgorithm) -> Result<RawHash, ProviderError> {
        let mut hash: ffi::HCRYPTHASH = 0;
        // SAFETY: `hash` is a valid out pointer.
        let ok = unsafe { ffi::CryptCreateHash(prov.0, alg.alg_id(), 0, 0, &mut hash) };
        check(ProviderCall::CreateHash, ok)?;
        Ok(RawHash(hash))
    }

    fn hash_data(&self, hash: RawHash, data: &[u8]) -> Result<(), ProviderError> {
        const CALL: ProviderCall = ProviderCall::HashData;
        let len = dword_len(CALL, data.len())?;
        // SAFETY: `data` is valid for `len` bytes.
        let ok = unsafe { ffi::CryptHashData(hash.0, data.as_ptr(), len, 0) };
        check(CALL, ok)
    }

    fn get_hash_value(
        &self,
        hash: RawHash,
        out: Option<&mut [u8]>,
    ) -> Result<usize, ProviderError> {
        const CALL: ProviderCall = ProviderCall::HashValue;
        let (ptr, mut len) = match out {
            Some(buf) => (buf.as_mut_ptr(), dword_len(CALL, buf.len())?),
            None => (ptr::null_mut(), 0),
        };
        // SAFETY: `ptr` is null (size query) or valid for `len` bytes.
        let ok = unsafe { ffi::CryptGetHashParam(hash.0, ffi::HP_HASHVAL, ptr, &mut len, 0) };
        check(CALL, ok)?;
        Ok(len as usize)
    }

    fn sign_hash(
        &self,
        hash: RawHash,
        spec: KeySpec,
        out: Option<&mut [u8]>,
    ) -> Result<usize, ProviderError> {
        const CALL: ProviderCall = ProviderCall::SignHash;
        let (ptr, mut len) = match out {
            Some(buf) => (buf.as_mut_ptr(), dword_len(CALL, buf.len())?),
            None => (ptr::null_mut(), 0),
        };
        // SAFETY: `ptr` is null (size query) or valid for `len` bytes.
        let ok = unsafe {
            ffi::CryptSignHashA(hash.0, spec.as_raw(), ptr::null(), 0, ptr, &mut len)
        };
        check(CALL, ok)?;
        Ok(len as usize)
    }

    fn verify_signature(
        &self,
        hash: RawHash,
        signature: &[u8],
        key: RawKey,
    ) -> Result<bool, ProviderError> {
        const CALL: ProviderCall = ProviderCall::VerifySignature;
        let len = dword_len(CALL, signature.len())?;
        // SAFETY: `signature` is valid for `len` bytes.
        let ok = unsafe {
            ffi::CryptVerifySignatureA(hash.0, signature.as_ptr(), len, key.0, ptr::null(), 0)
        };
        if ok != 0 {
            return Ok(true);
        }
        let err = last_error(CALL);
        if err.code == codes::NTE_BAD_SIGNATURE {
            return Ok(false);
        }
        Err(err)
    }

    fn destroy_key(&self, key: RawKey) -> Result<(), ProviderError> {
        // SAFETY: the handle came from this provider and is destroyed once.
        let ok = unsafe { ffi::CryptDestroyKey(key.0) };
        check(ProviderCall::DestroyKey, ok)
    }

    fn destroy_hash(&self, hash: RawHash) -> Result<(), ProviderError> {
        // SAFETY: the handle came from this provider and is destroyed once.
        let ok = unsafe { ffi::CryptDestroyHash(hash.0) };
        check(ProviderCall::DestroyHash, ok)
    }

    fn release_context(&self, prov: RawProv) -> Result<(), ProviderError> {
        // SAFETY: the handle came from this provider and is released once.
        let ok = unsafe { ffi::CryptReleaseContext(prov.0, 0) };
        check(ProviderCall::ReleaseContext, ok)
    }
}
