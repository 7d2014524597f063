use drip_common::types::decode_prefixed;
use drip_common::{Address, Hash};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rand_core::OsRng;
use std::fmt;
use thiserror::Error;

/// `r ‖ s ‖ v`
pub const SIGNATURE_LENGTH: usize = 65;

const ETH_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcdsaError {
    #[error("Invalid Hex String: {0}")]
    HexError(String),
    #[error("Invalid Key")]
    KeyError,
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),
    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

pub type CryptoError = EcdsaError;

/// Ethereum-style recoverable signature (`v` is 27 or 28 when produced here)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature(pub [u8; SIGNATURE_LENGTH]);

impl RecoverableSignature {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EcdsaError> {
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(EcdsaError::MalformedSignature(format!(
                "expected {} bytes, got {}",
                SIGNATURE_LENGTH,
                bytes.len()
            )));
        }
        let mut arr = [0u8; SIGNATURE_LENGTH];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    pub fn r(&self) -> &[u8] {
        &self.0[..32]
    }

    pub fn s(&self) -> &[u8] {
        &self.0[32..64]
    }

    pub fn v(&self) -> u8 {
        self.0[64]
    }

    /// Parity bit (0 or 1) regardless of whether `v` uses the 27/28 offset
    pub fn recovery_id(&self) -> Result<RecoveryId, EcdsaError> {
        let parity = match self.v() {
            0 | 27 => 0,
            1 | 28 => 1,
            v => {
                return Err(EcdsaError::MalformedSignature(format!(
                    "invalid recovery byte {}",
                    v
                )))
            }
        };
        RecoveryId::from_byte(parity)
            .ok_or_else(|| EcdsaError::MalformedSignature("invalid recovery id".to_string()))
    }

    fn signature(&self) -> Result<Signature, EcdsaError> {
        Signature::from_slice(&self.0[..64])
            .map_err(|e| EcdsaError::MalformedSignature(format!("invalid r/s: {}", e)))
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoverableSignature(0x{})", hex::encode(self.0))
    }
}

impl fmt::Display for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// secp256k1 key pair. The relayer identity is one of these.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    address: Address,
}

impl KeyPair {
    pub fn random() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Accepts the key with or without a `0x` prefix
    pub fn from_private_key_hex(hex_str: &str) -> Result<Self, EcdsaError> {
        let bytes = decode_prefixed(hex_str).map_err(|e| EcdsaError::HexError(e.to_string()))?;
        let signing_key = SigningKey::from_slice(&bytes).map_err(|_| EcdsaError::KeyError)?;
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = public_key_to_address(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn public_key(&self) -> VerifyingKey {
        *self.signing_key.verifying_key()
    }

    /// Sign a 32-byte hash directly, without any message prefix
    pub fn sign_prehash(&self, hash: &Hash) -> Result<RecoverableSignature, EcdsaError> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(hash.as_bytes())
            .map_err(|e| EcdsaError::SigningFailed(e.to_string()))?;

        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = 27 + recovery_id.to_byte();
        Ok(RecoverableSignature(out))
    }

    /// EIP-191 `personal_sign` over arbitrary bytes
    pub fn sign_message(&self, message: &[u8]) -> Result<RecoverableSignature, EcdsaError> {
        self.sign_prehash(&eth_message_hash(message))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Last 20 bytes of keccak256 over the uncompressed public key (sans 0x04 tag)
pub fn public_key_to_address(public_key: &VerifyingKey) -> Address {
    let encoded = public_key.to_encoded_point(false);
    let hash = Hash::keccak(&encoded.as_bytes()[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash.0[12..]);
    Address(addr)
}

/// `keccak256("\x19Ethereum Signed Message:\n" ‖ len(message) ‖ message)`
pub fn eth_message_hash(message: &[u8]) -> Hash {
    let mut buf = Vec::with_capacity(ETH_MESSAGE_PREFIX.len() + 4 + message.len());
    buf.extend_from_slice(ETH_MESSAGE_PREFIX.as_bytes());
    buf.extend_from_slice(message.len().to_string().as_bytes());
    buf.extend_from_slice(message);
    Hash::keccak(buf)
}

/// Recover the signer address of a prehashed message
pub fn recover_prehash(hash: &Hash, signature: &RecoverableSignature) -> Result<Address, EcdsaError> {
    let recovery_id = signature.recovery_id()?;
    let sig = signature.signature()?;
    let key = VerifyingKey::recover_from_prehash(hash.as_bytes(), &sig, recovery_id)
        .map_err(|e| EcdsaError::MalformedSignature(format!("recovery failed: {}", e)))?;
    Ok(public_key_to_address(&key))
}
