//! Circuit registry: per-circuit expected-input derivation and normalization.

mod binding;
mod coinbase_kyc;

use std::{collections::HashMap, ops::Range, sync::Arc};

use ethers::types::Address;
use tracing::debug;
use zkpp_common::{ProofRequest, RawPublicInputs, VerificationError, Word32};

use crate::normalize::normalize_pair;

pub use binding::{BindingPolicy, BoundCircuit, ContractAddressBinding, ADDRESS_SLOTS};
pub use coinbase_kyc::{
    merkle_root, signal_hash, CoinbaseKyc,
    COINBASE_AUTHORIZED_SIGNERS, COINBASE_KYC_CIRCUIT_URL, COINBASE_KYC_VERIFIER,
};

/// Verification configuration of one circuit.
///
/// All circuit-specific trust assumptions (which signer set, which contract)
/// live behind this trait; the orchestrator only ever looks a circuit up by id.
pub trait CircuitSpec: Send + Sync {
    fn id(&self) -> &str;

    fn title(&self) -> &str;

    /// Location of the JSON verification artifact used by offchain verification.
    fn circuit_url(&self) -> &str;

    /// Default verifier contract for onchain verification.
    fn verifier_address(&self) -> Option<Address>;

    /// Raw public-input slots that carry a contract address, one byte per
    /// slot tail. Only such circuits can take a [`ContractAddressBinding`].
    fn contract_address_slots(&self) -> Option<Range<usize>> {
        None
    }

    /// Public inputs a proof for `meta` must carry, in circuit order.
    fn derive_expected_inputs(&self, meta: &ProofRequest) -> Vec<Word32>;

    /// Canonical form of the received public inputs. Its length and encoding
    /// line up with [`CircuitSpec::derive_expected_inputs`].
    fn normalize(&self, raw: &RawPublicInputs) -> Result<Vec<Word32>, VerificationError> {
        normalize_pair(raw)
    }

    /// Additional checks on the raw inputs, run before reconciliation.
    fn extra_validation(&self, _raw: &RawPublicInputs) -> Result<(), VerificationError> {
        Ok(())
    }
}

/// Static table of supported circuits, filled at startup.
#[derive(Clone, Default)]
pub struct CircuitRegistry {
    circuits: HashMap<String, Arc<dyn CircuitSpec>>,
}

impl CircuitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every circuit this crate ships.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(CoinbaseKyc::default());
        registry
    }

    /// Add `spec`; a spec registered earlier under the same id is replaced.
    pub fn register(&mut self, spec: impl CircuitSpec + 'static) {
        self.register_arc(Arc::new(spec));
    }

    pub fn register_arc(&mut self, spec: Arc<dyn CircuitSpec>) {
        let id = spec.id().to_string();
        if self.circuits.insert(id.clone(), spec).is_some() {
            debug!(circuit_id = %id, "replaced registered circuit");
        }
    }

    /// Attach `binding` to every circuit that exposes address slots and
    /// return how many were bound.
    pub fn bind_contract(&mut self, binding: &ContractAddressBinding) -> usize {
        let mut bound = 0;
        for spec in self.circuits.values_mut() {
            if let Some(circuit) = BoundCircuit::new(Arc::clone(spec), binding.clone()) {
                debug!(circuit_id = spec.id(), address = ?binding.address(), "bound contract address");
                *spec = Arc::new(circuit);
                bound += 1;
            }
        }
        bound
    }

    pub fn resolve(&self, circuit_id: &str) -> Result<Arc<dyn CircuitSpec>, VerificationError> {
        self.circuits
            .get(circuit_id)
            .cloned()
            .ok_or_else(|| VerificationError::UnknownCircuit(circuit_id.to_string()))
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.circuits.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.circuits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.circuits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkpp_common::CIRCUIT_ID_COINBASE_KYC;

    struct FixedCircuit {
        id: &'static str,
        title: &'static str,
    }

    impl CircuitSpec for FixedCircuit {
        fn id(&self) -> &str {
            self.id
        }

        fn title(&self) -> &str {
            self.title
        }

        fn circuit_url(&self) -> &str {
            "https://artifacts.example/fixed.json"
        }

        fn verifier_address(&self) -> Option<Address> {
            None
        }

        fn derive_expected_inputs(&self, _meta: &ProofRequest) -> Vec<Word32> {
            vec![Word32::from_u64(1), Word32::from_u64(2)]
        }
    }

    #[test]
    fn defaults_include_coinbase_kyc() {
        let registry = CircuitRegistry::with_defaults();
        let spec = registry.resolve(CIRCUIT_ID_COINBASE_KYC).unwrap();
        assert_eq!(spec.title(), "Coinbase KYC");
        assert_eq!(registry.ids(), vec![CIRCUIT_ID_COINBASE_KYC]);
    }

    #[test]
    fn unknown_circuit_fails_closed() {
        let registry = CircuitRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(
            registry.resolve("email_auth").err(),
            Some(VerificationError::UnknownCircuit("email_auth".into()))
        );
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = CircuitRegistry::new();
        registry.register(FixedCircuit {
            id: "fixed",
            title: "first",
        });
        registry.register(FixedCircuit {
            id: "fixed",
            title: "second",
        });
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("fixed").unwrap().title(), "second");
    }

    #[test]
    fn binding_skips_circuits_without_address_slots() {
        let mut registry = CircuitRegistry::with_defaults();
        let binding = ContractAddressBinding::new(Address::repeat_byte(1), BindingPolicy::Enforce);
        assert_eq!(registry.bind_contract(&binding), 0);
        assert!(registry
            .resolve(CIRCUIT_ID_COINBASE_KYC)
            .unwrap()
            .contract_address_slots()
            .is_none());
    }

    #[test]
    fn default_normalize_uses_pair_normalizer() {
        let spec = FixedCircuit {
            id: "fixed",
            title: "fixed",
        };
        let raw = RawPublicInputs::new(serde_json::json!([1, 2]));
        let meta = ProofRequest::new("n", "o", 0, "fixed");
        assert_eq!(spec.normalize(&raw).unwrap(), spec.derive_expected_inputs(&meta));
        assert!(spec.extra_validation(&raw).is_ok());
    }
}
