//! zkpp-common
//!
//! Data model shared by the zkproofport portal handshake and the proof
//! verifier: request metadata, proof envelopes, canonical 32-byte words and
//! the error taxonomy every verification outcome is expressed in.

pub mod error;
pub mod types;
pub mod word;

use serde::Serialize;

pub use error::{HandshakeError, VerificationError};
pub use types::{ProofBytes, ProofEnvelope, ProofRequest, RawPublicInputs};
pub use word::{
    decode_hex_bytes, keccak256, keccak_word, strip_0x, HexWordError, Word32, WORD_HEX_LEN,
};

/// Circuit identifier of the Coinbase KYC attestation circuit.
pub const CIRCUIT_ID_COINBASE_KYC: &str = "coinbase_kyc";

/// Outcome of one verification call. Verification never panics or returns an
/// error to the caller; every rejection is a `Failure`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationResult {
    Success {
        proof: Vec<u8>,
        normalized_inputs: Vec<Word32>,
    },
    Failure(VerificationError),
}

impl VerificationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn error(&self) -> Option<&VerificationError> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(err) => Some(err),
        }
    }

    pub fn normalized_inputs(&self) -> Option<&[Word32]> {
        match self {
            Self::Success {
                normalized_inputs, ..
            } => Some(normalized_inputs),
            Self::Failure(_) => None,
        }
    }

    /// JSON-friendly summary: `success`, and either the canonical inputs or
    /// the failure code and message.
    pub fn report(&self) -> VerificationReport {
        match self {
            Self::Success {
                proof,
                normalized_inputs,
            } => VerificationReport {
                success: true,
                proof_len: Some(proof.len()),
                normalized_inputs: normalized_inputs.clone(),
                code: None,
                error: None,
            },
            Self::Failure(err) => VerificationReport {
                success: false,
                proof_len: None,
                normalized_inputs: Vec::new(),
                code: Some(err.kind()),
                error: Some(err.to_string()),
            },
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct VerificationReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_len: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub normalized_inputs: Vec<Word32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
