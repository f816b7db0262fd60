use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use base64::Engine as _;
use clap::{Parser, Subcommand, ValueEnum};
use credgate_core::paths::settings_path;
use credgate_core::settings::load_settings;
use credgate_core::{
    ContainerCredentials, CredentialGateway, CryptoProvider, GatewaySettings, KeySpec,
    ProviderKind, PublicKey, SoftProvider,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// In-memory provider; containers last for one invocation
    Soft,
    /// CryptoPro CSP through CryptoAPI
    Cryptopro,
}

#[derive(Parser)]
#[command(name = "credgate")]
#[command(about = "Key containers, signing and verification through a cryptographic service provider", long_about = None)]
struct Cli {
    /// Provider backend
    #[arg(long, value_enum, default_value_t = Backend::Soft, global = true)]
    provider: Backend,

    /// Provider kind: 256 or 512 (defaults to the settings file)
    #[arg(long, global = true)]
    kind: Option<ProviderKind>,

    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a password-protected container with a new signature key
    Create {
        container: String,
        /// Container password (prompted for when absent)
        #[arg(long)]
        password: Option<String>,
    },

    /// Check that a container exists and accepts the password
    Check {
        container: String,
        #[arg(long)]
        password: Option<String>,
    },

    /// Sign a message with a container key
    Sign {
        container: String,
        #[arg(long)]
        password: Option<String>,
        #[command(flatten)]
        input: MessageInput,
        /// Key role: signature or exchange
        #[arg(long)]
        key_spec: Option<KeySpec>,
        /// Print the signature as base64 instead of hex
        #[arg(long)]
        base64: bool,
    },

    /// Print the tagged public key of a container
    PublicKey {
        container: String,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        key_spec: Option<KeySpec>,
    },

    /// Verify a signature against a hex-encoded tagged public key
    Verify {
        /// Public key as printed by `public-key`
        public_key: String,
        /// Signature (hex, or base64 with --base64)
        signature: String,
        #[command(flatten)]
        input: MessageInput,
        #[arg(long)]
        base64: bool,
    },

    /// Create, sign, export and verify in one run
    Demo {
        #[arg(default_value = "testbox")]
        container: String,
        #[arg(long, default_value = "1234")]
        password: String,
        #[arg(long, default_value = "hello")]
        message: String,
    },
}

#[derive(clap::Args)]
#[group(required = true, multiple = false)]
struct MessageInput {
    /// Message given inline
    #[arg(long)]
    message: Option<String>,
    /// Read the message from a file
    #[arg(long)]
    file: Option<PathBuf>,
}

impl MessageInput {
    fn read(&self) -> Result<Vec<u8>> {
        match (&self.message, &self.file) {
            (Some(message), _) => Ok(message.as_bytes().to_vec()),
            (None, Some(path)) => {
                fs::read(path).with_context(|| format!("read message {}", path.display()))
            }
            (None, None) => bail!("either --message or --file is required"),
        }
    }
}

fn password(given: &Option<String>) -> Result<Zeroizing<String>> {
    if let Some(pw) = given {
        return Ok(Zeroizing::new(pw.clone()));
    }
    if let Ok(pw) = std::env::var("CREDGATE_PASSWORD") {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }
    let pw = rpassword::prompt_password("Container password: ")
        .map_err(|e| anyhow!("password prompt: {e}"))?;
    Ok(Zeroizing::new(pw))
}

fn decode_signature(text: &str, base64: bool) -> Result<Vec<u8>> {
    if base64 {
        return base64::engine::general_purpose::STANDARD
            .decode(text.trim())
            .context("signature is not valid base64");
    }
    hex::decode(text.trim()).context("signature is not valid hex")
}

fn encode_signature(bytes: &[u8], base64: bool) -> String {
    if base64 {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    } else {
        hex::encode(bytes)
    }
}

fn print_json(value: serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn run<P: CryptoProvider>(provider: P, settings: &GatewaySettings, cli: Cli) -> Result<ExitCode> {
    let gateway = CredentialGateway::from_settings(provider, settings);
    let kind = cli.kind.unwrap_or(settings.provider_kind);

    match cli.command {
        Commands::Create {
            container,
            password: pw,
        } => {
            let pw = password(&pw)?;
            gateway.create_container(kind, container.as_bytes(), pw.as_bytes())?;
            print_json(serde_json::json!({ "created": container, "kind": kind.to_string() }))?;
        }

        Commands::Check {
            container,
            password: pw,
        } => {
            let pw = password(&pw)?;
            gateway.check_container(kind, container.as_bytes(), pw.as_bytes())?;
            print_json(serde_json::json!({ "container": container, "ok": true }))?;
        }

        Commands::Sign {
            container,
            password: pw,
            input,
            key_spec,
            base64,
        } => {
            let pw = password(&pw)?;
            let data = input.read()?;
            let signature = gateway.sign_message(
                kind,
                container.as_bytes(),
                pw.as_bytes(),
                &data,
                key_spec.unwrap_or(settings.key_spec),
            )?;
            println!("{}", encode_signature(signature.as_bytes(), base64));
        }

        Commands::PublicKey {
            container,
            password: pw,
            key_spec,
        } => {
            let pw = password(&pw)?;
            let creds = ContainerCredentials::new(kind, container, pw.as_bytes());
            let public = gateway.public_key(&creds, key_spec.unwrap_or(settings.key_spec))?;
            let address = gateway.address(&public)?;
            print_json(serde_json::json!({
                "key": hex::encode(public.to_bytes()),
                "display": public.to_string(),
                "address": address.to_hex(),
            }))?;
        }

        Commands::Verify {
            public_key,
            signature,
            input,
            base64,
        } => {
            let key_bytes = hex::decode(public_key.trim()).context("public key is not valid hex")?;
            let public = PublicKey::from_bytes(&key_bytes)?;
            let signature = decode_signature(&signature, base64)?;
            let data = input.read()?;
            let valid = gateway.verify_with_public_key(&public, &data, &signature)?;
            print_json(serde_json::json!({ "valid": valid }))?;
            if !valid {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Demo {
            container,
            password,
            message,
        } => {
            let password = Zeroizing::new(password);
            gateway.create_container(kind, container.as_bytes(), password.as_bytes())?;
            info!(container = %container, kind = %kind, "container created");
            gateway.check_container(kind, container.as_bytes(), password.as_bytes())?;

            let creds = ContainerCredentials::new(kind, container, password.as_bytes());
            let signature = gateway.sign_with(&creds, message.as_bytes(), KeySpec::Signature)?;
            let public = gateway.public_key(&creds, KeySpec::Signature)?;
            let loaded = gateway.load_public_key(&public.to_bytes())?;
            let address = gateway.address(&loaded)?;
            let valid =
                gateway.verify_with_public_key(&loaded, message.as_bytes(), signature.as_bytes())?;
            print_json(serde_json::json!({
                "credentials": creds.to_string(),
                "public_key": public.to_string(),
                "address": address.to_hex(),
                "signature": signature.to_hex(),
                "valid": valid,
            }))?;
            if !valid {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let path = match &cli.settings {
        Some(path) => path.clone(),
        None => settings_path()?,
    };
    let settings = load_settings(&path)?;

    match cli.provider {
        Backend::Soft => run(SoftProvider::new(), &settings, cli),
        #[cfg(feature = "cryptopro")]
        Backend::Cryptopro => run(credgate_core::capi::CapiProvider::new(), &settings, cli),
        #[cfg(not(feature = "cryptopro"))]
        Backend::Cryptopro => bail!("credgate was built without the `cryptopro` feature"),
    }
}
