#![allow(non_camel_case_types, non_snake_case)]

use std::os::raw::c_char;

pub type BOOL = i32;
pub type BYTE = u8;
pub type DWORD = u32;
pub type ALG_ID = u32;
pub type HCRYPTPROV = usize;
pub type HCRYPTKEY = usize;
pub type HCRYPTHASH = usize;

pub const CRYPT_VERIFYCONTEXT: DWORD = 0xF000_0000;
pub const CRYPT_NEWKEYSET: DWORD = 0x0000_0008;
pub const CRYPT_DELETEKEYSET: DWORD = 0x0000_0010;
pub const CRYPT_SILENT: DWORD = 0x0000_0040;
pub const CRYPT_EXPORTABLE: DWORD = 0x0000_0001;
pub const PUBLICKEYBLOB: DWORD = 0x6;
pub const PP_SIGNATURE_PIN: DWORD = 33;
pub const HP_HASHVAL: DWORD = 0x0002;

// On Unix the CryptoPro libraries are linked by build.rs.
#[cfg_attr(windows, link(name = "advapi32"))]
extern "system" {
    pub fn CryptAcquireContextA(
        phProv: *mut HCRYPTPROV,
        szContainer: *const c_char,
        szProvider: *const c_char,
        dwProvType: DWORD,
        dwFlags: DWORD,
    ) -> BOOL;

    pub fn CryptReleaseContext(hProv: HCRYPTPROV, dwFlags: DWORD) -> BOOL;

    pub fn CryptSetProvParam(
        hProv: HCRYPTPROV,
        dwParam: DWORD,
        pbData: *const BYTE,
        dwFlags: DWORD,
    ) -> BOOL;

    pub fn CryptGenKey(
        hProv: HCRYPTPROV,
        Algid: ALG_ID,
        dwFlags: DWORD,
        phKey: *mut HCRYPTKEY,
    ) -> BOOL;

    pub fn CryptGetUserKey(hProv: HCRYPTPROV, dwKeySpec: DWORD, phUserKey: *mut HCRYPTKEY)
        -> BOOL;

    pub fn CryptImportKey(
        hProv: HCRYPTPROV,
        pbData: *const BYTE,
        dwDataLen: DWORD,
        hPubKey: HCRYPTKEY,
        dwFlags: DWORD,
        phKey: *mut HCRYPTKEY,
    ) -> BOOL;

    pub fn CryptExportKey(
        hKey: HCRYPTKEY,
        hExpKey: HCRYPTKEY,
        dwBlobType: DWORD,
        dwFlags: DWORD,
        pbData: *mut BYTE,
        pdwDataLen: *mut DWORD,
    ) -> BOOL;

    pub fn CryptCreateHash(
        hProv: HCRYPTPROV,
        Algid: ALG_ID,
        hKey: HCRYPTKEY,
        dwFlags: DWORD,
        phHash: *mut HCRYPTHASH,
    ) -> BOOL;

    pub fn CryptHashData(
        hHash: HCRYPTHASH,
        pbData: *const BYTE,
        dwDataLen: DWORD,
        dwFlags: DWORD,
    ) -> BOOL;

    pub fn CryptGetHashParam(
        hHash: HCRYPTHASH,
        dwParam: DWORD,
        pbData: *mut BYTE,
        pdwDataLen: *mut DWORD,
        dwFlags: DWORD,
    ) -> BOOL;

    pub fn CryptSignHashA(
        hHash: HCRYPTHASH,
        dwKeySpec: DWORD,
        szDescription: *const c_char,
        dwFlags: DWORD,
        pbSignature: *mut BYTE,
        pdwSigLen: *mut DWORD,
    ) -> BOOL;

    pub fn CryptVerifySignatureA(
        hHash: HCRYPTHASH,
        pbSignature: *const BYTE,
        dwSigLen: DWORD,
        hPubKey: HCRYPTKEY,
        szDescription: *const c_char,
        dwFlags: DWORD,
    ) -> BOOL;

    pub fn CryptDestroyKey(hKey: HCRYPTKEY) -> BOOL;

    pub fn CryptDestroyHash(hHash: HCRYPTHASH) -> BOOL;
}

#[cfg_attr(windows, link(name = "kernel32"))]
extern "system" {
    pub fn GetLastError() -> DWORD;
}
