//! Transaction signer actor.
//!
//! The gateway builds transactions and asks us to sign them over the
//! `/transactions` socket. The signer owns the secp256k1 key; it only ever
//! sees raw request frames and produces raw response frames, so bounty
//! processing never waits on it and the key never leaves this task.

use std::path::Path;

use alloy_primitives::{keccak256, Address, Bytes, U256};
use alloy_rlp::{Encodable, Header};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, SignOnly};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Frames buffered in each direction between the socket and the signer.
pub const SIGNER_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("failed to read key file {path}: {source}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid private key: {message}")]
    InvalidKey { message: String },

    #[error("failed to decrypt keystore {path}: {message}")]
    Keystore { path: String, message: String },

    #[error("malformed signing request: {message}")]
    MalformedRequest { message: String },

    #[error("signing failed: {message}")]
    Signing { message: String },
}

/// Unsigned legacy transaction as sent by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxData {
    #[serde(deserialize_with = "deserialize_quantity")]
    pub value: U256,
    pub to: Address,
    pub gas: u64,
    #[serde(deserialize_with = "deserialize_quantity")]
    pub gas_price: U256,
    pub chain_id: u64,
    pub nonce: u64,
    #[serde(default)]
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignTxRequest {
    pub id: u64,
    pub data: TxData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignTxResponse {
    pub id: u64,
    pub chain_id: u64,
    /// RLP of the signed transaction, lowercase hex without `0x`.
    pub data: String,
}

/// Big integers arrive as JSON numbers or as decimal / `0x` strings.
fn deserialize_quantity<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| D::Error::custom(format!("quantity out of range: {}", n))),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<U256>()
            .map_err(|e| D::Error::custom(format!("invalid quantity {:?}: {}", s, e))),
        other => Err(D::Error::custom(format!("expected quantity, got {}", other))),
    }
}

/// Password for an encrypted keyfile. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPassword(String);

impl KeyPassword {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Default for KeyPassword {
    fn default() -> Self {
        Self::new("password")
    }
}

impl std::fmt::Debug for KeyPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyPassword(..)")
    }
}

/// Load the signing key.
///
/// A file holding a JSON object is treated as an encrypted V3 keystore and
/// decrypted with `password`. Anything else must be a hex-encoded
/// secp256k1 private key, optionally `0x`-prefixed.
pub async fn load_key(
    path: impl AsRef<Path>,
    password: &KeyPassword,
) -> Result<SecretKey, SignerError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SignerError::KeyFile {
            path: path.display().to_string(),
            source,
        })?;

    if raw.trim_start().starts_with('{') {
        return decrypt_keystore(path, password).await;
    }
    parse_key(&raw)
}

async fn decrypt_keystore(path: &Path, password: &KeyPassword) -> Result<SecretKey, SignerError> {
    let display_path = path.display().to_string();
    let keystore_error = |message: String| SignerError::Keystore {
        path: display_path.clone(),
        message,
    };

    // Key derivation is CPU-bound.
    let owned_path = path.to_path_buf();
    let password = password.clone();
    let secret = tokio::task::spawn_blocking(move || {
        eth_keystore::decrypt_key(owned_path, password.as_bytes())
    })
    .await
    .map_err(|e| keystore_error(e.to_string()))?
    .map_err(|e| keystore_error(e.to_string()))?;

    let key = SecretKey::from_slice(&secret).map_err(|e| SignerError::InvalidKey {
        message: e.to_string(),
    })?;
    debug!(path = %display_path, "decrypted keystore");
    Ok(key)
}

fn parse_key(raw: &str) -> Result<SecretKey, SignerError> {
    let raw = raw.trim();
    let raw = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(raw).map_err(|e| SignerError::InvalidKey {
        message: format!("not hex: {}", e),
    })?;
    SecretKey::from_slice(&bytes).map_err(|e| SignerError::InvalidKey {
        message: e.to_string(),
    })
}

/// Signs EIP-155 legacy transactions with a single key.
pub struct TransactionSigner {
    secp: Secp256k1<SignOnly>,
    key: SecretKey,
    address: Address,
}

impl std::fmt::Debug for TransactionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl TransactionSigner {
    pub fn new(key: SecretKey) -> Self {
        let secp = Secp256k1::signing_only();
        let public = PublicKey::from_secret_key(&secp, &key).serialize_uncompressed();
        let address = Address::from_slice(&keccak256(&public[1..])[12..]);
        Self { secp, key, address }
    }

    /// Account address derived from the key.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn sign(&self, request: &SignTxRequest) -> Result<SignTxResponse, SignerError> {
        let tx = &request.data;

        let mut unsigned = Vec::new();
        encode_legacy(
            tx,
            &U256::from(tx.chain_id),
            &U256::ZERO,
            &U256::ZERO,
            &mut unsigned,
        );
        let digest = keccak256(&unsigned);

        let signature = self
            .secp
            .sign_ecdsa_recoverable(&Message::from_digest(digest.0), &self.key);
        let (recovery_id, compact) = signature.serialize_compact();

        let recovery = u64::try_from(recovery_id.to_i32()).map_err(|e| SignerError::Signing {
            message: format!("bad recovery id: {}", e),
        })?;
        let v = tx
            .chain_id
            .checked_mul(2)
            .and_then(|c| c.checked_add(35 + recovery))
            .ok_or_else(|| SignerError::Signing {
                message: format!("chain id {} too large for EIP-155", tx.chain_id),
            })?;
        let r = U256::from_be_slice(&compact[..32]);
        let s = U256::from_be_slice(&compact[32..]);

        let mut signed = Vec::new();
        encode_legacy(tx, &U256::from(v), &r, &s, &mut signed);

        Ok(SignTxResponse {
            id: request.id,
            chain_id: tx.chain_id,
            data: hex::encode(signed),
        })
    }

    /// Sign one raw frame. `None` when the frame is malformed or signing fails.
    pub fn handle_frame(&self, frame: &str) -> Option<String> {
        let request: SignTxRequest = match serde_json::from_str(frame) {
            Ok(request) => request,
            Err(e) => {
                let e = SignerError::MalformedRequest {
                    message: e.to_string(),
                };
                warn!(error = %e, "ignoring signing request");
                return None;
            }
        };

        let response = match self.sign(&request) {
            Ok(response) => response,
            Err(e) => {
                warn!(id = request.id, error = %e, "failed to sign transaction");
                return None;
            }
        };

        match serde_json::to_string(&response) {
            Ok(frame) => {
                debug!(id = request.id, chain_id = response.chain_id, "signed transaction");
                Some(frame)
            }
            Err(e) => {
                warn!(id = request.id, error = %e, "failed to encode signed transaction");
                None
            }
        }
    }

    /// Serve requests until either channel closes.
    pub async fn run(self, mut requests: mpsc::Receiver<String>, responses: mpsc::Sender<String>) {
        info!(address = %self.address, "transaction signer started");
        while let Some(frame) = requests.recv().await {
            if let Some(reply) = self.handle_frame(&frame) {
                if responses.send(reply).await.is_err() {
                    break;
                }
            }
        }
        debug!("transaction signer stopped");
    }

    /// Move the signer onto its own task and hand back its channels.
    pub fn spawn(self) -> SignerHandle {
        let (request_tx, request_rx) = mpsc::channel(SIGNER_CHANNEL_CAPACITY);
        let (response_tx, response_rx) = mpsc::channel(SIGNER_CHANNEL_CAPACITY);
        let address = self.address;
        let task = tokio::spawn(self.run(request_rx, response_tx));

        SignerHandle {
            address,
            requests: request_tx,
            responses: response_rx,
            task,
        }
    }
}

/// Channels to a running signer task.
#[derive(Debug)]
pub struct SignerHandle {
    pub address: Address,
    pub requests: mpsc::Sender<String>,
    pub responses: mpsc::Receiver<String>,
    pub task: JoinHandle<()>,
}

/// RLP list `[nonce, gasPrice, gas, to, value, data, v, r, s]`.
fn encode_legacy(tx: &TxData, v: &U256, r: &U256, s: &U256, out: &mut Vec<u8>) {
    let payload_length = tx.nonce.length()
        + tx.gas_price.length()
        + tx.gas.length()
        + tx.to.length()
        + tx.value.length()
        + tx.data.length()
        + v.length()
        + r.length()
        + s.length();

    Header {
        list: true,
        payload_length,
    }
    .encode(out);
    tx.nonce.encode(out);
    tx.gas_price.encode(out);
    tx.gas.encode(out);
    tx.to.encode(out);
    tx.value.encode(out);
    tx.data.encode(out);
    v.encode(out);
    r.encode(out);
    s.encode(out);
}
