use std::env;

const DEFAULT_CPROCSP_LIB_DIR: &str = "/opt/cprocsp/lib/amd64";

fn main() {
    println!("cargo:rerun-if-env-changed=CPROCSP_LIB_DIR");
    if env::var_os("CARGO_FEATURE_CRYPTOPRO").is_none() {
        return;
    }
    if env::var_os("CARGO_CFG_UNIX").is_none() {
        // Windows links advapi32/kernel32 through #[link] attributes.
        return;
    }
    let lib_dir =
        env::var("CPROCSP_LIB_DIR").unwrap_or_else(|_| DEFAULT_CPROCSP_LIB_DIR.to_string());
    println!("cargo:rustc-link-search=native={lib_dir}");
    for lib in ["capi10", "capi20", "rdrsup", "ssp"] {
        println!("cargo:rustc-link-lib=dylib={lib}");
    }
}
