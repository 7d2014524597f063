//! Cryptography for the drip faucet: claim digests, EIP-191 message
//! hashing and secp256k1 signing/recovery.

pub mod claim;
pub mod ecdsa;

pub use claim::{claim_digest, recover, verify, ClaimRequest, U256};
pub use ecdsa::{
    eth_message_hash, public_key_to_address, recover_prehash, CryptoError, KeyPair,
    RecoverableSignature, SIGNATURE_LENGTH,
};
