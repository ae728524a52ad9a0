use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;
use zkpp_common::{HandshakeError, ProofEnvelope};

use crate::{
    config::{PortalConfig, POPUP_TARGET},
    hub::{ContextId, MessageHub},
    session::Session,
};

/// Opens the browsing context that hosts the portal.
pub trait PortalLauncher: Send + Sync {
    /// Open `url` under the named `target`. `None` means the context could
    /// not be opened (popup blocked, channel unavailable).
    fn open(&self, url: &Url, target: &str, features: &str) -> Option<ContextId>;
}

/// Requests proofs from the portal, one session per call.
pub struct PortalClient<L> {
    config: PortalConfig,
    hub: MessageHub,
    launcher: L,
}

impl<L: PortalLauncher> PortalClient<L> {
    pub fn new(config: PortalConfig, hub: MessageHub, launcher: L) -> Self {
        Self {
            config,
            hub,
            launcher,
        }
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn hub(&self) -> &MessageHub {
        &self.hub
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Open a portal session for `circuit_id` under a fresh nonce and wait
    /// for the proof.
    pub async fn request_proof(&self, circuit_id: &str) -> Result<ProofEnvelope, HandshakeError> {
        let nonce = Uuid::new_v4().to_string();
        self.request_proof_with_nonce(circuit_id, &nonce).await
    }

    pub async fn request_proof_with_nonce(
        &self,
        circuit_id: &str,
        nonce: &str,
    ) -> Result<ProofEnvelope, HandshakeError> {
        let url = self.config.session_url(circuit_id, nonce);

        // Listen before opening so an immediate reply is not lost.
        let mut subscription = self.hub.subscribe();
        let context = self
            .launcher
            .open(&url, POPUP_TARGET, &self.config.window_features())
            .ok_or(HandshakeError::PopupOrChannelBlocked)?;

        let mut session = Session::new(&self.config);
        session.start(circuit_id, nonce, context);
        info!(circuit_id, portal = %self.config.portal_url, "waiting for portal proof");

        let timeout = self.config.timeout;
        let settled = tokio::time::timeout(timeout, async {
            while let Some(event) = subscription.recv().await {
                if let Some(outcome) = session.handle(&event) {
                    return outcome;
                }
            }
            Err(HandshakeError::PopupOrChannelBlocked)
        })
        .await;
        drop(subscription);

        match settled {
            Ok(Ok(envelope)) => {
                debug!(circuit_id, proof_len = envelope.proof.len(), "portal proof received");
                Ok(envelope)
            }
            Ok(Err(err)) => {
                warn!(circuit_id, code = err.kind(), error = %err, "portal handshake rejected");
                Err(err)
            }
            Err(_) => {
                let err = session.time_out(timeout);
                warn!(circuit_id, ?timeout, "portal handshake timed out");
                Err(err)
            }
        }
    }
}
