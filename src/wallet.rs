//! Keystore password resolution, wallet loading and keystore tooling

use crate::chain::WalletSigner;
use crate::config::WalletConfig;
use crate::error::{RunError, RunResult};

use ethers::core::rand::thread_rng;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use ethers::utils::to_checksum;
use serde::Serialize;
use serde_json::Value;
use std::env;
use std::path::Path;
use tracing::{debug, info};

const UTF8_BOM: char = '\u{feff}';

/// Read a secret file, dropping a leading BOM and a single trailing newline
pub fn read_secret_file(path: &Path) -> std::io::Result<String> {
    let text = std::fs::read_to_string(path)?;
    Ok(clean_secret(&text).to_string())
}

fn clean_secret(text: &str) -> &str {
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

/// Password from the configured env var if set and non-empty, else the secret file
pub fn resolve_password(config: &WalletConfig) -> RunResult<String> {
    if let Some(name) = &config.password_env {
        match env::var(name) {
            Ok(value) if !value.is_empty() => {
                debug!("Keystore password taken from ${}", name);
                return Ok(value);
            }
            _ => debug!("${} is unset or empty", name),
        }
    }

    if let Some(path) = &config.password_file {
        let password = read_secret_file(path).map_err(|e| {
            RunError::Wallet(format!(
                "Failed to read password file {}: {}",
                path.display(),
                e
            ))
        })?;
        if password.is_empty() {
            return Err(RunError::Wallet(format!(
                "Password file {} is empty",
                path.display()
            )));
        }
        debug!("Keystore password taken from {}", path.display());
        return Ok(password);
    }

    Err(RunError::Wallet(
        "No keystore password configured. Set wallet.password_env or wallet.password_file"
            .to_string(),
    ))
}

/// Decrypt the configured keystore
pub fn load_wallet(config: &WalletConfig) -> RunResult<LocalWallet> {
    if !config.keystore_path.exists() {
        return Err(RunError::Wallet(format!(
            "Encrypted keystore file does not exist: {}",
            config.keystore_path.display()
        )));
    }
    let password = resolve_password(config)?;
    WalletSigner::decrypt_keystore(&config.keystore_path, &password)
        .map_err(|e| RunError::Wallet(e.to_string()))
}

/// Encrypt `private_key` with `password` into a keystore file at `out`
pub fn encrypt_private_key(private_key: &str, password: &str, out: &Path) -> RunResult<Address> {
    if password.is_empty() {
        return Err(RunError::Wallet("Keystore password is empty".to_string()));
    }
    let wallet: LocalWallet = private_key
        .trim()
        .parse()
        .map_err(|e| RunError::Wallet(format!("Invalid private key: {}", e)))?;

    let file_name = out
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            RunError::Wallet(format!("Invalid keystore path: {}", out.display()))
        })?;
    let dir = match out.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| {
        RunError::Wallet(format!("Failed to create {}: {}", dir.display(), e))
    })?;

    LocalWallet::encrypt_keystore(
        dir,
        &mut thread_rng(),
        wallet.signer().to_bytes(),
        password,
        Some(file_name),
    )
    .map_err(|e| RunError::Wallet(format!("Failed to encrypt keystore: {}", e)))?;

    info!("Encrypted keystore written to {}", out.display());
    Ok(wallet.address())
}

/// One address found in a keystore file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressEntry {
    pub index: usize,
    pub address: String,
}

/// Addresses of a keystore file holding one entry or an array, without decrypting
pub fn list_addresses(path: &Path) -> RunResult<Vec<AddressEntry>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        RunError::Wallet(format!("Failed to read keystore {}: {}", path.display(), e))
    })?;
    let parsed: Value = serde_json::from_str(&text).map_err(|e| {
        RunError::Wallet(format!("Keystore {} is not JSON: {}", path.display(), e))
    })?;

    let values = match parsed {
        Value::Array(values) => values,
        single => vec![single],
    };

    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let raw = match value {
                Value::String(address) => Some(address.as_str()),
                Value::Object(fields) => fields
                    .get("address")
                    .and_then(Value::as_str)
                    .filter(|address| !address.is_empty()),
                _ => None,
            }
            .ok_or_else(|| {
                RunError::Wallet(format!("wallet entry at index {} has no usable address", index))
            })?;

            Ok(AddressEntry {
                index,
                address: checksum_address(raw, index)?,
            })
        })
        .collect()
}

fn checksum_address(raw: &str, index: usize) -> RunResult<String> {
    let hex = raw.strip_prefix("0x").unwrap_or(raw);
    let address: Address = format!("0x{}", hex).parse().map_err(|e| {
        RunError::Wallet(format!(
            "wallet entry at index {} has an invalid address {}: {}",
            index, raw, e
        ))
    })?;
    Ok(to_checksum(&address, None))
}
