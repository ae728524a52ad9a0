//! Coinbase KYC attestation circuit.
//!
//! Public inputs are `[signal_hash, signer_root]`:
//! - `signal_hash = keccak256(utf8(origin || nonce))` binds the proof to one
//!   requesting application and one session;
//! - `signer_root` is the Merkle root over the Coinbase attestation signers the
//!   circuit accepts.

use ethers::types::{Address, H160};
use hex_literal::hex;
use zkpp_common::{keccak256, keccak_word, ProofRequest, Word32, CIRCUIT_ID_COINBASE_KYC};

use super::CircuitSpec;

pub const COINBASE_KYC_CIRCUIT_URL: &str =
    "https://raw.githubusercontent.com/zkproofport/circuits/main/coinbase-kyc/target/zk_coinbase_attestor.json";

/// Deployed verifier contract for the circuit.
pub const COINBASE_KYC_VERIFIER: Address = H160(hex!("4C163fa6756244e7f29Cb5BEA0458eA993Eb0F6d"));

/// Signers whose attestations the circuit accepts, in tree order.
pub const COINBASE_AUTHORIZED_SIGNERS: [Address; 4] = [
    H160(hex!("952f32128AF084422539C4Ff96df5C525322E564")),
    H160(hex!("8844591D47F17bcA6F5dF8f6B64F4a739F1C0080")),
    H160(hex!("88fe64ea2e121f49bb77abea6c0a45e93638c3c5")),
    H160(hex!("44ace9abb148e8412ac4492e9a1ae6bd88226803")),
];

#[derive(Clone, Debug)]
pub struct CoinbaseKyc {
    circuit_url: String,
    verifier_address: Option<Address>,
    signers: Vec<Address>,
    signer_root: Word32,
}

impl Default for CoinbaseKyc {
    fn default() -> Self {
        let signers = COINBASE_AUTHORIZED_SIGNERS.to_vec();
        Self {
            circuit_url: COINBASE_KYC_CIRCUIT_URL.to_string(),
            verifier_address: Some(COINBASE_KYC_VERIFIER),
            signer_root: merkle_root(&signers),
            signers,
        }
    }
}

impl CoinbaseKyc {
    pub fn with_circuit_url(mut self, url: impl Into<String>) -> Self {
        self.circuit_url = url.into();
        self
    }

    pub fn with_verifier_address(mut self, address: Option<Address>) -> Self {
        self.verifier_address = address;
        self
    }

    /// Replace the trusted signer set; the root is recomputed once here.
    pub fn with_signers(mut self, signers: Vec<Address>) -> Self {
        self.signer_root = merkle_root(&signers);
        self.signers = signers;
        self
    }

    pub fn signers(&self) -> &[Address] {
        &self.signers
    }

    pub fn signer_root(&self) -> Word32 {
        self.signer_root
    }
}

impl CircuitSpec for CoinbaseKyc {
    fn id(&self) -> &str {
        CIRCUIT_ID_COINBASE_KYC
    }

    fn title(&self) -> &str {
        "Coinbase KYC"
    }

    fn circuit_url(&self) -> &str {
        &self.circuit_url
    }

    fn verifier_address(&self) -> Option<Address> {
        self.verifier_address
    }

    fn derive_expected_inputs(&self, meta: &ProofRequest) -> Vec<Word32> {
        vec![signal_hash(&meta.origin, &meta.nonce), self.signer_root]
    }
}

/// `keccak256(utf8(origin || nonce))`.
pub fn signal_hash(origin: &str, nonce: &str) -> Word32 {
    let mut signal = String::with_capacity(origin.len() + nonce.len());
    signal.push_str(origin);
    signal.push_str(nonce);
    keccak_word(signal.as_bytes())
}

/// Merkle root over `keccak256(address)` leaves.
///
/// Pairs are hashed in order without sorting; an unpaired node moves up a
/// level unchanged. An empty set has the zero root.
pub fn merkle_root(signers: &[Address]) -> Word32 {
    let mut level: Vec<[u8; 32]> = signers
        .iter()
        .map(|signer| keccak256(signer.as_bytes()))
        .collect();
    if level.is_empty() {
        return Word32::ZERO;
    }

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => {
                    let mut joined = [0u8; 64];
                    joined[..32].copy_from_slice(left);
                    joined[32..].copy_from_slice(right);
                    keccak256(&joined)
                }
                _ => pair[0],
            })
            .collect();
    }
    Word32::from_bytes(level[0])
}
