use drip_common::{Address, ChainId, Hash};
use drip_crypto::{KeyPair, U256};
use rlp::RlpStream;

use super::{ChainError, ChainResult};

/// Pre-London transaction, signed with EIP-155 replay protection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
    pub chain_id: ChainId,
}

/// Minimal big-endian bytes, as RLP expects integers
fn trimmed(value: U256) -> Vec<u8> {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    let first = word.iter().position(|b| *b != 0).unwrap_or(word.len());
    word[first..].to_vec()
}

impl LegacyTransaction {
    fn append_body(&self, stream: &mut RlpStream) {
        stream.append(&trimmed(self.nonce));
        stream.append(&trimmed(self.gas_price));
        stream.append(&self.gas_limit);
        stream.append(&self.to.as_bytes().to_vec());
        stream.append(&trimmed(self.value));
        stream.append(&self.data);
    }

    /// Hash the relayer signs: the body followed by `chain_id, 0, 0`
    pub fn signing_hash(&self) -> Hash {
        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        stream.append(&self.chain_id);
        stream.append_empty_data();
        stream.append_empty_data();
        Hash::keccak(stream.out())
    }

    /// Raw bytes for `eth_sendRawTransaction`
    pub fn sign(&self, key: &KeyPair) -> ChainResult<Vec<u8>> {
        let signature = key
            .sign_prehash(&self.signing_hash())
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        let recovery_id = signature
            .recovery_id()
            .map_err(|e| ChainError::Signing(e.to_string()))?;

        let v = self.chain_id * 2 + 35 + u64::from(recovery_id.to_byte());

        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        stream.append(&v);
        stream.append(&trimmed(U256::from_big_endian(signature.r())));
        stream.append(&trimmed(U256::from_big_endian(signature.s())));
        Ok(stream.out().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drip_crypto::{recover_prehash, RecoverableSignature};
    use rlp::Rlp;

    /// The worked example from EIP-155
    fn eip155_example() -> LegacyTransaction {
        LegacyTransaction {
            nonce: U256::from(9),
            gas_price: U256::from(20_000_000_000u64),
            gas_limit: 21000,
            to: Address([0x35; 20]),
            value: U256::from(1_000_000_000_000_000_000u64),
            data: Vec::new(),
            chain_id: 1,
        }
    }

    #[test]
    fn test_signing_hash_matches_eip155() {
        assert_eq!(
            eip155_example().signing_hash().to_string(),
            "0xdaf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn test_signed_transaction_recovers_sender() {
        let key = KeyPair::random();
        let tx = LegacyTransaction {
            chain_id: 11155111,
            data: vec![1, 2, 3],
            ..eip155_example()
        };
        let raw = tx.sign(&key).unwrap();

        let rlp = Rlp::new(&raw);
        assert_eq!(rlp.item_count().unwrap(), 9);
        assert_eq!(rlp.at(5).unwrap().data().unwrap(), &[1, 2, 3]);

        let v: u64 = rlp.val_at(6).unwrap();
        let recovery_id = v - 35 - 2 * tx.chain_id;
        assert!(recovery_id <= 1);

        let mut sig = [0u8; 65];
        let r = rlp.at(7).unwrap().data().unwrap();
        let s = rlp.at(8).unwrap().data().unwrap();
        sig[32 - r.len()..32].copy_from_slice(r);
        sig[64 - s.len()..64].copy_from_slice(s);
        sig[64] = recovery_id as u8;

        let signer = recover_prehash(&tx.signing_hash(), &RecoverableSignature(sig)).unwrap();
        assert_eq!(signer, key.address());
    }

    #[test]
    fn test_zero_encodes_as_empty_string() {
        assert!(trimmed(U256::zero()).is_empty());
        assert_eq!(trimmed(U256::from(0x0100)), vec![1, 0]);
    }
}
