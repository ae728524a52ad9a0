//! zkpp-verifier
//!
//! Verification side of the zkproofport proof exchange: metadata validation
//! with replay protection, public-input normalization, the circuit registry,
//! and offchain (artifact oracle) or onchain (verifier contract) dispatch.

pub mod circuits;
pub mod config;
pub mod metadata;
pub mod normalize;
pub mod onchain;
pub mod oracle;
pub mod verify;

pub use circuits::{
    BindingPolicy, BoundCircuit, CircuitRegistry, CircuitSpec, CoinbaseKyc,
    ContractAddressBinding,
};
pub use config::{ConfigError, VerifierConfig};
pub use metadata::{Clock, FreshnessWindow, LedgerError, MetadataValidator, ReplayLedger};
pub use normalize::{describe_public_inputs, last_byte_of_32, normalize_pair, InputShape};
pub use onchain::{decode_revert_reason, ChainCallError, ChainProvider, VerifierContract};
pub use oracle::{ArtifactOracle, CircuitArtifact, EngineFactory, ProofOracle, VerificationEngine};
pub use verify::{reconcile, VerificationMode, Verifier, VerifyRequest};

pub use zkpp_common::{VerificationError, VerificationResult};
