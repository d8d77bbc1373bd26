//! Broker key loading.
//!
//! Keys come from an environment variable or a plain hex file. Raw bytes
//! only ever live in `Zeroizing` buffers before being handed to the signer.

use std::path::PathBuf;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::error::KeyError;

/// Source of the broker private key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum KeySource {
    /// Hex key in an environment variable.
    EnvVar { var_name: String },
    /// Hex key in a file (recommend 0600 permissions).
    File { path: PathBuf },
}

fn parse_hex_key(hex_str: &str) -> Result<Zeroizing<Vec<u8>>, KeyError> {
    let trimmed = hex_str.trim().trim_start_matches("0x");
    Ok(Zeroizing::new(hex::decode(trimmed)?))
}

/// Load a signer from `source`, optionally pinning the expected address.
pub fn load_signer(
    source: &KeySource,
    expected_address: Option<Address>,
) -> Result<PrivateKeySigner, KeyError> {
    let secret_bytes = match source {
        KeySource::EnvVar { var_name } => {
            let hex = Zeroizing::new(
                std::env::var(var_name).map_err(|_| KeyError::EnvVarNotFound(var_name.clone()))?,
            );
            parse_hex_key(&hex)?
        }
        KeySource::File { path } => {
            let content = Zeroizing::new(std::fs::read_to_string(path)?);
            parse_hex_key(&content)?
        }
    };
    signer_from_bytes(&secret_bytes, expected_address)
}

/// Build a signer from raw key bytes.
pub fn signer_from_bytes(
    secret_bytes: &[u8],
    expected_address: Option<Address>,
) -> Result<PrivateKeySigner, KeyError> {
    let signer = PrivateKeySigner::from_slice(secret_bytes)
        .map_err(|e| KeyError::InvalidKey(e.to_string()))?;

    if let Some(expected) = expected_address {
        if signer.address() != expected {
            return Err(KeyError::AddressMismatch {
                expected,
                actual: signer.address(),
            });
        }
    }
    Ok(signer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use std::io::Write;

    const TEST_PRIVATE_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

    #[test]
    fn test_load_from_env() {
        let var_name = "BROKER_SIGNER_TEST_KEY_ENV";
        std::env::set_var(var_name, format!("  {TEST_PRIVATE_KEY}\n"));
        let signer = load_signer(
            &KeySource::EnvVar {
                var_name: var_name.to_string(),
            },
            Some(TEST_ADDRESS),
        )
        .unwrap();
        assert_eq!(signer.address(), TEST_ADDRESS);
    }

    #[test]
    fn test_missing_env_var() {
        let result = load_signer(
            &KeySource::EnvVar {
                var_name: "BROKER_SIGNER_TEST_DOES_NOT_EXIST".to_string(),
            },
            None,
        );
        assert!(matches!(result, Err(KeyError::EnvVarNotFound(_))));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("broker-key-{}.hex", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", TEST_PRIVATE_KEY.trim_start_matches("0x")).unwrap();
        let signer = load_signer(&KeySource::File { path: path.clone() }, None).unwrap();
        assert_eq!(signer.address(), TEST_ADDRESS);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_address_mismatch() {
        let bytes = hex::decode(TEST_PRIVATE_KEY.trim_start_matches("0x")).unwrap();
        let result = signer_from_bytes(&bytes, Some(Address::ZERO));
        assert!(matches!(result, Err(KeyError::AddressMismatch { .. })));
    }

    #[test]
    fn test_bad_hex() {
        assert!(matches!(parse_hex_key("0xzz"), Err(KeyError::HexDecode(_))));
    }

    #[test]
    fn test_key_source_tagged_shape() {
        let source: KeySource =
            serde_json::from_str(r#"{"source": "env_var", "var_name": "BROKER_KEY"}"#).unwrap();
        assert_eq!(
            source,
            KeySource::EnvVar {
                var_name: "BROKER_KEY".to_string()
            }
        );
        let source: KeySource =
            serde_json::from_str(r#"{"source": "file", "path": "/run/secrets/broker"}"#).unwrap();
        assert!(matches!(source, KeySource::File { .. }));
    }
}
