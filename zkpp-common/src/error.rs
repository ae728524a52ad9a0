//! Error taxonomy for proof exchange and verification.

use std::time::Duration;

use thiserror::Error;

use crate::word::Word32;

/// Why a proof was rejected. Every gate of the verification pipeline maps to
/// exactly one variant; none of them is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("origin mismatch: expected {expected}, got {actual}")]
    OriginMismatch { expected: String, actual: String },

    #[error("timestamp out of range: proof is {age_secs}s old, accepted window is [-{max_future_secs}s, {max_age_secs}s]")]
    TimestampOutOfRange {
        age_secs: i64,
        max_age_secs: u64,
        max_future_secs: u64,
    },

    #[error("replay detected: nonce {nonce} already used")]
    ReplayDetected { nonce: String },

    #[error("replay ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("unknown circuit '{0}'")]
    UnknownCircuit(String),

    #[error("unexpected public inputs format: {0}")]
    PublicInputShape(String),

    #[error("contract address mismatch in public inputs: expected {expected}, got {actual}")]
    ContractAddressMismatch { expected: String, actual: String },

    #[error("public input length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("public input mismatch at index {index}: expected {expected}, got {actual}")]
    PublicInputMismatchAt {
        index: usize,
        expected: Word32,
        actual: Word32,
    },

    #[error("onchain mode requires a chain provider")]
    ProviderMissing,

    #[error("no verifier contract address configured for circuit '{0}'")]
    VerifierAddressMissing(String),

    #[error("verification backend failed: {0}")]
    BackendVerificationFailure(String),

    #[error("verifier contract reverted: {}", .reason.as_deref().unwrap_or("no reason given"))]
    ContractRevert { reason: Option<String> },

    #[error("invalid proof")]
    InvalidProof,
}

impl VerificationError {
    /// Stable machine-readable code for the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OriginMismatch { .. } => "ORIGIN_MISMATCH",
            Self::TimestampOutOfRange { .. } => "TIMESTAMP_OUT_OF_RANGE",
            Self::ReplayDetected { .. } => "REPLAY_DETECTED",
            Self::LedgerUnavailable(_) => "LEDGER_UNAVAILABLE",
            Self::UnknownCircuit(_) => "UNKNOWN_CIRCUIT",
            Self::PublicInputShape(_) => "PUBLIC_INPUT_SHAPE",
            Self::ContractAddressMismatch { .. } => "CONTRACT_ADDRESS_MISMATCH",
            Self::LengthMismatch { .. } => "LENGTH_MISMATCH",
            Self::PublicInputMismatchAt { .. } => "PUBLIC_INPUT_MISMATCH",
            Self::ProviderMissing => "PROVIDER_MISSING",
            Self::VerifierAddressMissing(_) => "VERIFIER_ADDRESS_MISSING",
            Self::BackendVerificationFailure(_) => "BACKEND_VERIFICATION_FAILURE",
            Self::ContractRevert { .. } => "CONTRACT_REVERT",
            Self::InvalidProof => "INVALID_PROOF",
        }
    }
}

/// Why no proof was obtained from the portal. Kept apart from
/// [`VerificationError`]: a handshake failure means nothing was received.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("popup blocked")]
    PopupOrChannelBlocked,

    #[error("timed out waiting for proof after {0:?}")]
    TimedOut(Duration),

    #[error("proof request cancelled: {0}")]
    Cancelled(String),

    #[error("malformed proof message: {0}")]
    MalformedMessage(String),
}

impl HandshakeError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PopupOrChannelBlocked => "POPUP_BLOCKED",
            Self::TimedOut(_) => "HANDSHAKE_TIMED_OUT",
            Self::Cancelled(_) => "HANDSHAKE_CANCELLED",
            Self::MalformedMessage(_) => "HANDSHAKE_MALFORMED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revert_message_mentions_reason_when_present() {
        let with_reason = VerificationError::ContractRevert {
            reason: Some("SumcheckFailed()".into()),
        };
        assert_eq!(
            with_reason.to_string(),
            "verifier contract reverted: SumcheckFailed()"
        );
        let without = VerificationError::ContractRevert { reason: None };
        assert!(without.to_string().ends_with("no reason given"));
    }

    #[test]
    fn mismatch_message_carries_index_and_words() {
        let err = VerificationError::PublicInputMismatchAt {
            index: 1,
            expected: Word32::from_u64(1),
            actual: Word32::from_u64(2),
        };
        let message = err.to_string();
        assert!(message.contains("index 1"));
        assert!(message.contains(&Word32::from_u64(2).to_hex()));
        assert_eq!(err.kind(), "PUBLIC_INPUT_MISMATCH");
    }
}
