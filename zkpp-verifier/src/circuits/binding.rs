use std::{ops::Range, str::FromStr, sync::Arc};

use ethers::types::Address;
use tracing::warn;
use zkpp_common::{ProofRequest, RawPublicInputs, VerificationError, Word32};

use super::CircuitSpec;
use crate::normalize::last_byte_of_32;

/// Number of public-input slots that spell out one address.
pub const ADDRESS_SLOTS: usize = 20;

/// What to do when a circuit's contract-address binding does not hold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BindingPolicy {
    /// Reject the proof.
    #[default]
    Enforce,
    /// Log and continue.
    Warn,
    /// Skip the check.
    Off,
}

impl FromStr for BindingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enforce" | "hard" => Ok(Self::Enforce),
            "warn" | "soft" => Ok(Self::Warn),
            "off" | "none" => Ok(Self::Off),
            other => Err(format!("unknown address binding policy '{other}'")),
        }
    }
}

/// Checks that a run of raw public inputs spells out a contract address, one
/// address byte in the last byte of each 32-byte slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractAddressBinding {
    address: Address,
    policy: BindingPolicy,
}

impl ContractAddressBinding {
    pub fn new(address: Address, policy: BindingPolicy) -> Self {
        Self { address, policy }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn policy(&self) -> BindingPolicy {
        self.policy
    }

    /// Compare the slot tails of `raw[slots]` with the bound address.
    pub fn check(
        &self,
        circuit_id: &str,
        raw: &RawPublicInputs,
        slots: Range<usize>,
    ) -> Result<(), VerificationError> {
        if self.policy == BindingPolicy::Off {
            return Ok(());
        }

        let recovered = match raw.as_strings() {
            Some(words) => match words.get(slots.clone()) {
                Some(window) => last_byte_of_32(window)
                    .map(|bytes| format!("0x{}", hex::encode(bytes)))
                    .unwrap_or_else(|err| format!("<{err}>")),
                None => format!("<no address in slots {slots:?} of {} inputs>", words.len()),
            },
            None => "<public inputs are not hex words>".to_string(),
        };

        let expected = format!("{:#x}", self.address);
        if recovered.eq_ignore_ascii_case(&expected) {
            return Ok(());
        }

        match self.policy {
            BindingPolicy::Enforce => Err(VerificationError::ContractAddressMismatch {
                expected,
                actual: recovered,
            }),
            BindingPolicy::Warn => {
                warn!(
                    circuit_id,
                    expected = %expected,
                    actual = %recovered,
                    "public inputs contract address mismatch (soft check)"
                );
                Ok(())
            }
            BindingPolicy::Off => Ok(()),
        }
    }
}

/// A circuit whose [`CircuitSpec::extra_validation`] also enforces a
/// contract-address binding over the circuit's address slots.
pub struct BoundCircuit {
    inner: Arc<dyn CircuitSpec>,
    binding: ContractAddressBinding,
    slots: Range<usize>,
}

impl BoundCircuit {
    /// `None` if `inner` exposes no address slots.
    pub fn new(inner: Arc<dyn CircuitSpec>, binding: ContractAddressBinding) -> Option<Self> {
        let slots = inner.contract_address_slots()?;
        Some(Self {
            inner,
            binding,
            slots,
        })
    }

    pub fn binding(&self) -> &ContractAddressBinding {
        &self.binding
    }
}

impl CircuitSpec for BoundCircuit {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn title(&self) -> &str {
        self.inner.title()
    }

    fn circuit_url(&self) -> &str {
        self.inner.circuit_url()
    }

    fn verifier_address(&self) -> Option<Address> {
        self.inner.verifier_address()
    }

    fn contract_address_slots(&self) -> Option<Range<usize>> {
        Some(self.slots.clone())
    }

    fn derive_expected_inputs(&self, meta: &ProofRequest) -> Vec<Word32> {
        self.inner.derive_expected_inputs(meta)
    }

    fn normalize(&self, raw: &RawPublicInputs) -> Result<Vec<Word32>, VerificationError> {
        self.inner.normalize(raw)
    }

    fn extra_validation(&self, raw: &RawPublicInputs) -> Result<(), VerificationError> {
        self.inner.extra_validation(raw)?;
        self.binding.check(self.id(), raw, self.slots.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Address {
        Address::from([0x35; 20])
    }

    fn slot_inputs(bytes: &[u8]) -> RawPublicInputs {
        let words: Vec<Word32> = bytes.iter().map(|b| Word32::from_u64(*b as u64)).collect();
        RawPublicInputs::from_words(&words)
    }

    #[test]
    fn matching_slot_tails_pass() {
        let binding = ContractAddressBinding::new(address(), BindingPolicy::Enforce);
        assert!(binding.check("c", &slot_inputs(&[0x35; 20]), 0..ADDRESS_SLOTS).is_ok());
    }

    #[test]
    fn mismatch_is_fatal_when_enforced() {
        let binding = ContractAddressBinding::new(address(), BindingPolicy::Enforce);
        let mut bytes = [0x35; 20];
        bytes[19] = 0x00;
        let err = binding.check("c", &slot_inputs(&bytes), 0..ADDRESS_SLOTS).unwrap_err();
        assert!(matches!(err, VerificationError::ContractAddressMismatch { .. }));

        // Too few slots is a mismatch too.
        assert!(binding.check("c", &slot_inputs(&[0x35; 2]), 0..ADDRESS_SLOTS).is_err());
        assert!(binding
            .check(
                "c",
                &RawPublicInputs::new(serde_json::json!([1, 2])),
                0..ADDRESS_SLOTS
            )
            .is_err());
    }

    #[test]
    fn soft_and_disabled_policies_continue() {
        let wrong = slot_inputs(&[0x00; 20]);
        for policy in [BindingPolicy::Warn, BindingPolicy::Off] {
            let binding = ContractAddressBinding::new(address(), policy);
            assert!(binding.check("c", &wrong, 0..ADDRESS_SLOTS).is_ok());
        }
    }

    #[test]
    fn only_the_declared_slots_are_read() {
        let binding = ContractAddressBinding::new(address(), BindingPolicy::Enforce);
        let mut bytes = vec![0x01, 0x02];
        bytes.extend([0x35; 20]);
        let raw = slot_inputs(&bytes);
        assert!(binding.check("c", &raw, 2..22).is_ok());
        assert!(binding.check("c", &raw, 0..ADDRESS_SLOTS).is_err());
    }

    #[test]
    fn policy_parses_from_config_strings() {
        assert_eq!("enforce".parse::<BindingPolicy>(), Ok(BindingPolicy::Enforce));
        assert_eq!(" WARN ".parse::<BindingPolicy>(), Ok(BindingPolicy::Warn));
        assert_eq!("off".parse::<BindingPolicy>(), Ok(BindingPolicy::Off));
        assert!("maybe".parse::<BindingPolicy>().is_err());
    }
}
