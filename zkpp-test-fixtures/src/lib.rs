use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::{
    abi::{self, Token},
    types::{Address, Bytes},
};
use once_cell::sync::OnceCell;
use serde_json::Value as JsonValue;
use url::Url;
use zkpp_common::{
    ProofBytes, ProofEnvelope, ProofRequest, RawPublicInputs, Word32, CIRCUIT_ID_COINBASE_KYC,
};
use zkpp_portal::{ContextId, MessageHub, PortalEvent, PortalLauncher};
use zkpp_verifier::{
    onchain::ChainCallError, ChainProvider, CircuitRegistry, CircuitSpec, Clock, CoinbaseKyc,
    MetadataValidator, ProofOracle, ReplayLedger, Verifier,
};

pub const SAMPLE_ORIGIN: &str = "https://app.example";
pub const SAMPLE_NONCE: &str = "abc123";
/// Fixed "now" every fixture verifier runs at.
pub const SAMPLE_NOW: i64 = 1_700_000_000;
pub const PORTAL_ORIGIN: &str = "https://zkproofport.com";
pub const SAMPLE_PROOF: [u8; 8] = [0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f, 0x60, 0x71];

static FIXTURES: OnceCell<TestFixtures> = OnceCell::new();

/// Canonical coinbase_kyc exchange reused across tests.
pub struct TestFixtures {
    meta: ProofRequest,
    expected_inputs: Vec<Word32>,
    envelope: ProofEnvelope,
}

impl TestFixtures {
    pub fn meta(&self) -> &ProofRequest {
        &self.meta
    }

    /// `[signal_hash, signer_root]` for the sample origin and nonce.
    pub fn expected_inputs(&self) -> &[Word32] {
        &self.expected_inputs
    }

    pub fn envelope(&self) -> &ProofEnvelope {
        &self.envelope
    }
}

pub fn fixtures() -> &'static TestFixtures {
    FIXTURES.get_or_init(|| {
        let envelope = coinbase_envelope(SAMPLE_NONCE, SAMPLE_NOW);
        TestFixtures {
            meta: envelope.meta.clone(),
            expected_inputs: coinbase_expected_inputs(SAMPLE_ORIGIN, SAMPLE_NONCE),
            envelope,
        }
    })
}

pub fn coinbase_meta(nonce: &str, timestamp: i64) -> ProofRequest {
    ProofRequest::new(nonce, SAMPLE_ORIGIN, timestamp, CIRCUIT_ID_COINBASE_KYC)
}

pub fn coinbase_expected_inputs(origin: &str, nonce: &str) -> Vec<Word32> {
    let meta = ProofRequest::new(nonce, origin, SAMPLE_NOW, CIRCUIT_ID_COINBASE_KYC);
    CoinbaseKyc::default().derive_expected_inputs(&meta)
}

/// Envelope whose public inputs are exactly the expected coinbase_kyc words.
pub fn coinbase_envelope(nonce: &str, timestamp: i64) -> ProofEnvelope {
    ProofEnvelope {
        proof: ProofBytes(SAMPLE_PROOF.to_vec()),
        public_inputs: RawPublicInputs::from_words(&coinbase_expected_inputs(SAMPLE_ORIGIN, nonce)),
        meta: coinbase_meta(nonce, timestamp),
        circuit_id: CIRCUIT_ID_COINBASE_KYC.to_string(),
    }
}

/// Verifier over the shipped circuits, an in-memory ledger and a clock fixed
/// at [`SAMPLE_NOW`].
pub fn fixed_verifier(oracle: Arc<dyn ProofOracle>) -> Verifier {
    verifier_with_registry(CircuitRegistry::with_defaults(), oracle)
}

pub fn verifier_with_registry(registry: CircuitRegistry, oracle: Arc<dyn ProofOracle>) -> Verifier {
    let metadata = MetadataValidator::new(SAMPLE_ORIGIN, ReplayLedger::in_memory())
        .with_clock(Clock::Fixed(SAMPLE_NOW));
    Verifier::new(registry, metadata, oracle)
}

/// Oracle mock that records every invocation.
pub struct CountingOracle {
    answer: Option<bool>,
    calls: AtomicUsize,
    last_url: Mutex<Option<String>>,
}

impl CountingOracle {
    pub fn accepting() -> Arc<Self> {
        Self::with_answer(Some(true))
    }

    pub fn rejecting() -> Arc<Self> {
        Self::with_answer(Some(false))
    }

    /// Fails every call, like an unreachable artifact URL.
    pub fn failing() -> Arc<Self> {
        Self::with_answer(None)
    }

    fn with_answer(answer: Option<bool>) -> Arc<Self> {
        Arc::new(Self {
            answer,
            calls: AtomicUsize::new(0),
            last_url: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_url(&self) -> Option<String> {
        self.last_url.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProofOracle for CountingOracle {
    async fn verify(
        &self,
        _proof: &[u8],
        _public_inputs: &RawPublicInputs,
        circuit_url: &str,
    ) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_url.lock().unwrap() = Some(circuit_url.to_string());
        self.answer
            .ok_or_else(|| anyhow!("failed to fetch circuit artifact from {circuit_url}"))
    }
}

/// Chain provider mock answering every call the same way.
pub struct MockChainProvider {
    response: std::result::Result<Bytes, ChainCallError>,
    calls: Mutex<Vec<(Address, Bytes)>>,
}

impl MockChainProvider {
    pub fn returning(valid: bool) -> Self {
        Self::new(Ok(abi::encode(&[Token::Bool(valid)]).into()))
    }

    pub fn reverting(data: Option<Bytes>) -> Self {
        Self::new(Err(ChainCallError::Reverted { data }))
    }

    pub fn unreachable() -> Self {
        Self::new(Err(ChainCallError::Transport("connection refused".into())))
    }

    fn new(response: std::result::Result<Bytes, ChainCallError>) -> Self {
        Self {
            response,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Address, Bytes)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainProvider for MockChainProvider {
    async fn call(
        &self,
        to: Address,
        calldata: Bytes,
    ) -> std::result::Result<Bytes, ChainCallError> {
        self.calls.lock().unwrap().push((to, calldata));
        self.response.clone()
    }
}

/// Revert payload for a custom error without arguments, e.g. `SumcheckFailed()`.
pub fn custom_error(signature: &str) -> Bytes {
    Bytes::from(ethers::utils::id(signature).to_vec())
}

type Replies = Box<dyn Fn(&Url, ContextId) -> Vec<PortalEvent> + Send + Sync>;

/// Portal launcher that records opened URLs and posts scripted replies to
/// the hub as soon as the portal is "opened".
pub struct ScriptedLauncher {
    hub: MessageHub,
    context: Option<ContextId>,
    replies: Replies,
    opened: Mutex<Vec<(Url, String, String)>>,
}

impl ScriptedLauncher {
    /// The popup never opens.
    pub fn blocked(hub: MessageHub) -> Self {
        Self::replying(hub, None, |_, _| Vec::new())
    }

    /// The popup opens and stays silent.
    pub fn silent(hub: MessageHub, context: ContextId) -> Self {
        Self::replying(hub, Some(context), |_, _| Vec::new())
    }

    pub fn replying<F>(hub: MessageHub, context: Option<ContextId>, replies: F) -> Self
    where
        F: Fn(&Url, ContextId) -> Vec<PortalEvent> + Send + Sync + 'static,
    {
        Self {
            hub,
            context,
            replies: Box::new(replies),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// `(url, target, features)` of every open attempt.
    pub fn opened(&self) -> Vec<(Url, String, String)> {
        self.opened.lock().unwrap().clone()
    }
}

impl PortalLauncher for ScriptedLauncher {
    fn open(&self, url: &Url, target: &str, features: &str) -> Option<ContextId> {
        self.opened
            .lock()
            .unwrap()
            .push((url.clone(), target.to_string(), features.to_string()));
        let context = self.context?;
        for event in (self.replies)(url, context) {
            self.hub.post(event);
        }
        Some(context)
    }
}

pub fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// A portal proof message carrying `envelope`.
pub fn proof_message(source: ContextId, origin: &str, envelope: &ProofEnvelope) -> PortalEvent {
    let mut data = serde_json::to_value(envelope).unwrap();
    if let JsonValue::Object(map) = &mut data {
        map.insert("type".into(), JsonValue::String("zkproofport-proof".into()));
    }
    PortalEvent::Message {
        source,
        origin: origin.to_string(),
        data,
    }
}

/// Reply script of an honest portal: a coinbase_kyc proof for the nonce and
/// origin found in the session URL.
pub fn honest_portal(url: &Url, context: ContextId) -> Vec<PortalEvent> {
    let nonce = query_param(url, "nonce").unwrap_or_default();
    let origin = query_param(url, "origin").unwrap_or_default();
    let mut envelope = coinbase_envelope(&nonce, SAMPLE_NOW);
    envelope.meta.origin = origin.clone();
    envelope.public_inputs = RawPublicInputs::from_words(&coinbase_expected_inputs(&origin, &nonce));
    vec![proof_message(context, PORTAL_ORIGIN, &envelope)]
}
