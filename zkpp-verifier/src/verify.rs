//! Verification orchestrator.
//!
//! Gates run in a fixed order and the first failure wins: circuit lookup,
//! metadata, normalization, circuit-specific checks, reconciliation against
//! the expected inputs, and only then the cryptographic check.

use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zkpp_common::{
    ProofEnvelope, ProofRequest, RawPublicInputs, VerificationError, VerificationResult, Word32,
};

use crate::{
    circuits::{CircuitRegistry, CircuitSpec},
    metadata::MetadataValidator,
    onchain::{ChainProvider, VerifierContract},
    oracle::ProofOracle,
};

pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CONTRACT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMode {
    #[default]
    Offchain,
    Onchain,
}

impl fmt::Display for VerificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationMode::Offchain => f.write_str("offchain"),
            VerificationMode::Onchain => f.write_str("onchain"),
        }
    }
}

impl FromStr for VerificationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "offchain" => Ok(Self::Offchain),
            "onchain" => Ok(Self::Onchain),
            other => Err(format!("unknown verification mode '{other}'")),
        }
    }
}

/// One verification call. Everything is borrowed for the duration of the call.
#[derive(Clone, Copy)]
pub struct VerifyRequest<'a> {
    pub circuit_id: &'a str,
    pub proof: &'a [u8],
    pub public_inputs: &'a RawPublicInputs,
    pub meta: &'a ProofRequest,
    pub mode: VerificationMode,
    pub provider: Option<&'a dyn ChainProvider>,
    /// Verifier contract to call instead of the circuit's default.
    pub verifier_override: Option<Address>,
}

impl<'a> VerifyRequest<'a> {
    pub fn new(
        circuit_id: &'a str,
        proof: &'a [u8],
        public_inputs: &'a RawPublicInputs,
        meta: &'a ProofRequest,
    ) -> Self {
        Self {
            circuit_id,
            proof,
            public_inputs,
            meta,
            mode: VerificationMode::Offchain,
            provider: None,
            verifier_override: None,
        }
    }

    pub fn from_envelope(envelope: &'a ProofEnvelope) -> Self {
        Self::new(
            envelope.circuit_id(),
            envelope.proof.as_slice(),
            &envelope.public_inputs,
            &envelope.meta,
        )
    }

    pub fn with_mode(mut self, mode: VerificationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_provider(mut self, provider: &'a dyn ChainProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_verifier(mut self, address: Address) -> Self {
        self.verifier_override = Some(address);
        self
    }
}

/// Ties the registry, metadata validator and verification backends together.
#[derive(Clone)]
pub struct Verifier {
    registry: CircuitRegistry,
    metadata: MetadataValidator,
    oracle: Arc<dyn ProofOracle>,
    oracle_timeout: Duration,
    contract_timeout: Duration,
}

impl Verifier {
    pub fn new(
        registry: CircuitRegistry,
        metadata: MetadataValidator,
        oracle: Arc<dyn ProofOracle>,
    ) -> Self {
        Self {
            registry,
            metadata,
            oracle,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
            contract_timeout: DEFAULT_CONTRACT_TIMEOUT,
        }
    }

    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    pub fn with_contract_timeout(mut self, timeout: Duration) -> Self {
        self.contract_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &CircuitRegistry {
        &self.registry
    }

    pub fn metadata(&self) -> &MetadataValidator {
        &self.metadata
    }

    /// Verify one proof. Never fails: every rejection is a
    /// [`VerificationResult::Failure`].
    pub async fn verify(&self, req: VerifyRequest<'_>) -> VerificationResult {
        match self.run(&req).await {
            Ok(normalized_inputs) => {
                info!(
                    circuit_id = req.circuit_id,
                    mode = %req.mode,
                    proof_len = req.proof.len(),
                    "proof verified"
                );
                VerificationResult::Success {
                    proof: req.proof.to_vec(),
                    normalized_inputs,
                }
            }
            Err(err) => {
                warn!(
                    circuit_id = req.circuit_id,
                    mode = %req.mode,
                    code = err.kind(),
                    error = %err,
                    "proof rejected"
                );
                VerificationResult::Failure(err)
            }
        }
    }

    /// Convenience for envelopes received from the portal.
    pub async fn verify_envelope(
        &self,
        envelope: &ProofEnvelope,
        mode: VerificationMode,
        provider: Option<&dyn ChainProvider>,
    ) -> VerificationResult {
        let mut req = VerifyRequest::from_envelope(envelope).with_mode(mode);
        req.provider = provider;
        self.verify(req).await
    }

    async fn run(&self, req: &VerifyRequest<'_>) -> Result<Vec<Word32>, VerificationError> {
        let spec = self.registry.resolve(req.circuit_id)?;
        self.metadata.validate(req.meta)?;

        let normalized = spec.normalize(req.public_inputs)?;
        spec.extra_validation(req.public_inputs)?;
        let expected = spec.derive_expected_inputs(req.meta);
        reconcile(&normalized, &expected)?;
        debug!(
            circuit_id = spec.id(),
            inputs = normalized.len(),
            "public inputs reconciled"
        );

        let valid = match req.mode {
            VerificationMode::Offchain => self.verify_offchain(spec.as_ref(), req).await?,
            VerificationMode::Onchain => {
                self.verify_onchain(spec.as_ref(), req, &normalized).await?
            }
        };
        if !valid {
            return Err(VerificationError::InvalidProof);
        }
        Ok(normalized)
    }

    async fn verify_offchain(
        &self,
        spec: &dyn CircuitSpec,
        req: &VerifyRequest<'_>,
    ) -> Result<bool, VerificationError> {
        let call = self
            .oracle
            .verify(req.proof, req.public_inputs, spec.circuit_url());
        match tokio::time::timeout(self.oracle_timeout, call).await {
            Ok(Ok(valid)) => Ok(valid),
            Ok(Err(err)) => Err(VerificationError::BackendVerificationFailure(format!(
                "{err:#}"
            ))),
            Err(_) => Err(VerificationError::BackendVerificationFailure(format!(
                "verification oracle timed out after {:?}",
                self.oracle_timeout
            ))),
        }
    }

    async fn verify_onchain(
        &self,
        spec: &dyn CircuitSpec,
        req: &VerifyRequest<'_>,
        normalized: &[Word32],
    ) -> Result<bool, VerificationError> {
        let provider = req.provider.ok_or(VerificationError::ProviderMissing)?;
        let address = req
            .verifier_override
            .or_else(|| spec.verifier_address())
            .ok_or_else(|| VerificationError::VerifierAddressMissing(spec.id().to_string()))?;

        let contract = VerifierContract::new(provider, address);
        match tokio::time::timeout(self.contract_timeout, contract.verify(req.proof, normalized))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(VerificationError::BackendVerificationFailure(format!(
                "verifier contract call timed out after {:?}",
                self.contract_timeout
            ))),
        }
    }
}

/// Exact match of received against expected inputs: lengths first, then the
/// first differing index from the left.
pub fn reconcile(received: &[Word32], expected: &[Word32]) -> Result<(), VerificationError> {
    if received.len() != expected.len() {
        return Err(VerificationError::LengthMismatch {
            expected: expected.len(),
            actual: received.len(),
        });
    }
    match received.iter().zip(expected).position(|(r, e)| r != e) {
        Some(index) => Err(VerificationError::PublicInputMismatchAt {
            index,
            expected: expected[index],
            actual: received[index],
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Clock, ReplayLedger};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NOW: i64 = 1_700_000_000;
    const ORIGIN: &str = "https://app.example";

    struct PairCircuit {
        address: Option<Address>,
    }

    impl CircuitSpec for PairCircuit {
        fn id(&self) -> &str {
            "pair"
        }

        fn title(&self) -> &str {
            "Pair"
        }

        fn circuit_url(&self) -> &str {
            "https://artifacts.example/pair.json"
        }

        fn verifier_address(&self) -> Option<Address> {
            self.address
        }

        fn derive_expected_inputs(&self, _meta: &ProofRequest) -> Vec<Word32> {
            vec![Word32::from_u64(1), Word32::from_u64(2)]
        }
    }

    enum Behaviour {
        Answer(bool),
        Fail,
        Hang,
    }

    struct LocalOracle {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProofOracle for LocalOracle {
        async fn verify(
            &self,
            _proof: &[u8],
            _public_inputs: &RawPublicInputs,
            _circuit_url: &str,
        ) -> anyhow::Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Answer(valid) => Ok(valid),
                Behaviour::Fail => Err(anyhow::anyhow!("artifact fetch failed")),
                Behaviour::Hang => std::future::pending().await,
            }
        }
    }

    fn verifier(behaviour: Behaviour) -> (Verifier, Arc<LocalOracle>) {
        let oracle = Arc::new(LocalOracle {
            behaviour,
            calls: AtomicUsize::new(0),
        });
        let mut registry = CircuitRegistry::new();
        registry.register(PairCircuit { address: None });
        let metadata = MetadataValidator::new(ORIGIN, ReplayLedger::in_memory())
            .with_clock(Clock::Fixed(NOW));
        (Verifier::new(registry, metadata, oracle.clone()), oracle)
    }

    fn meta(nonce: &str) -> ProofRequest {
        ProofRequest::new(nonce, ORIGIN, NOW, "pair")
    }

    fn inputs(a: u64, b: u64) -> RawPublicInputs {
        RawPublicInputs::from_words(&[Word32::from_u64(a), Word32::from_u64(b)])
    }

    #[test]
    fn reconcile_reports_length_before_content() {
        let a = Word32::from_u64(1);
        let b = Word32::from_u64(2);
        assert_eq!(
            reconcile(&[a], &[a, b]),
            Err(VerificationError::LengthMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            reconcile(&[b, a], &[a, b]),
            Err(VerificationError::PublicInputMismatchAt {
                index: 0,
                expected: a,
                actual: b
            })
        );
        assert!(reconcile(&[a, b], &[a, b]).is_ok());
    }

    #[test]
    fn mode_parses_and_displays() {
        assert_eq!(
            "ONCHAIN".parse::<VerificationMode>(),
            Ok(VerificationMode::Onchain)
        );
        assert_eq!(VerificationMode::default().to_string(), "offchain");
        assert!("both".parse::<VerificationMode>().is_err());
    }

    #[tokio::test]
    async fn unknown_circuit_does_not_consume_nonce() {
        let (verifier, oracle) = verifier(Behaviour::Answer(true));
        let meta = meta("n-1");
        let raw = inputs(1, 2);

        let result = verifier
            .verify(VerifyRequest::new("missing", b"proof", &raw, &meta))
            .await;
        assert_eq!(
            result.error(),
            Some(&VerificationError::UnknownCircuit("missing".into()))
        );
        assert!(!verifier.metadata().ledger().contains("n-1").unwrap());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn oracle_errors_become_backend_failures() {
        let (verifier, _) = verifier(Behaviour::Fail);
        let meta = meta("n-2");
        let raw = inputs(1, 2);

        let result = verifier
            .verify(VerifyRequest::new("pair", b"proof", &raw, &meta))
            .await;
        match result.error() {
            Some(VerificationError::BackendVerificationFailure(detail)) => {
                assert!(detail.contains("artifact fetch failed"))
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_oracle_times_out() {
        let (verifier, oracle) = verifier(Behaviour::Hang);
        let verifier = verifier.with_oracle_timeout(Duration::from_secs(5));
        let meta = meta("n-3");
        let raw = inputs(1, 2);

        let result = verifier
            .verify(VerifyRequest::new("pair", b"proof", &raw, &meta))
            .await;
        assert!(matches!(
            result.error(),
            Some(VerificationError::BackendVerificationFailure(_))
        ));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn onchain_without_address_fails_closed() {
        struct NeverCalled;

        #[async_trait]
        impl ChainProvider for NeverCalled {
            async fn call(
                &self,
                _to: Address,
                _calldata: ethers::types::Bytes,
            ) -> Result<ethers::types::Bytes, crate::onchain::ChainCallError> {
                panic!("no call expected");
            }
        }

        let (verifier, _) = verifier(Behaviour::Answer(true));
        let meta = meta("n-4");
        let raw = inputs(1, 2);
        let provider = NeverCalled;

        let result = verifier
            .verify(
                VerifyRequest::new("pair", b"proof", &raw, &meta)
                    .with_mode(VerificationMode::Onchain)
                    .with_provider(&provider),
            )
            .await;
        assert_eq!(
            result.error(),
            Some(&VerificationError::VerifierAddressMissing("pair".into()))
        );
    }
}
