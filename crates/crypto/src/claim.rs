//! Claim signature scheme.
//!
//! A claim is authorized by the user signing, with `personal_sign`, the raw
//! 32 bytes of
//!
//! ```text
//! keccak256(abi.encodePacked(address user, uint256 nonce, uint256 deadline,
//!                            uint256 chainId, address faucet))
//! ```
//!
//! The faucet contract re-derives the same digest on chain, so the layout here
//! must not change.

use drip_common::{Address, ChainId, Hash};

use crate::ecdsa::{eth_message_hash, recover_prehash, EcdsaError, KeyPair, RecoverableSignature};

pub use ethabi::ethereum_types::U256;

const PACKED_LEN: usize = 20 + 32 * 3 + 20;

/// One signed claim as received from a wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    pub user: Address,
    pub nonce: U256,
    /// Unix seconds
    pub deadline: u64,
    pub signature: Vec<u8>,
    pub network_id: ChainId,
}

impl ClaimRequest {
    pub fn digest(&self, faucet: &Address) -> Hash {
        claim_digest(
            &self.user,
            self.nonce,
            U256::from(self.deadline),
            self.network_id,
            faucet,
        )
    }
}

fn be_word(value: U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

/// Tightly packed claim digest
pub fn claim_digest(
    user: &Address,
    nonce: U256,
    deadline: U256,
    network_id: ChainId,
    faucet: &Address,
) -> Hash {
    let mut packed = Vec::with_capacity(PACKED_LEN);
    packed.extend_from_slice(user.as_bytes());
    packed.extend_from_slice(&be_word(nonce));
    packed.extend_from_slice(&be_word(deadline));
    packed.extend_from_slice(&be_word(U256::from(network_id)));
    packed.extend_from_slice(faucet.as_bytes());
    Hash::keccak(packed)
}

/// Recover the address that `personal_sign`ed the raw digest bytes
pub fn recover(digest: &Hash, signature: &[u8]) -> Result<Address, EcdsaError> {
    let signature = RecoverableSignature::from_slice(signature)?;
    recover_prehash(&eth_message_hash(digest.as_bytes()), &signature)
}

/// `Ok(false)` for a well-formed signature by someone else,
/// `Err(MalformedSignature)` when nothing can be recovered at all.
pub fn verify(request: &ClaimRequest, faucet: &Address) -> Result<bool, EcdsaError> {
    let signer = recover(&request.digest(faucet), &request.signature)?;
    Ok(signer == request.user)
}

impl KeyPair {
    /// Produce the signature a wallet would send for this claim
    pub fn sign_claim(
        &self,
        nonce: U256,
        deadline: u64,
        network_id: ChainId,
        faucet: &Address,
    ) -> Result<RecoverableSignature, EcdsaError> {
        let digest = claim_digest(
            &self.address(),
            nonce,
            U256::from(deadline),
            network_id,
            faucet,
        );
        self.sign_message(digest.as_bytes())
    }
}
