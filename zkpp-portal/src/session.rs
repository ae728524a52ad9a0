//! Single-shot proof session.
//!
//! `Idle -> Pending -> {Fulfilled | Rejected | TimedOut}`. Only `Pending`
//! reacts to events; once terminal, a session ignores everything.

use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::debug;
use zkpp_common::{HandshakeError, ProofEnvelope};

use crate::{
    config::PortalConfig,
    hub::{ContextId, PortalEvent},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Pending {
        circuit_id: String,
        nonce: String,
        context: ContextId,
    },
    Fulfilled,
    Rejected(HandshakeError),
    TimedOut,
}

pub type SessionOutcome = Result<ProofEnvelope, HandshakeError>;

#[derive(Debug)]
pub struct Session {
    portal_origin: String,
    message_type: String,
    cancel_type: String,
    state: SessionState,
}

impl Session {
    pub fn new(config: &PortalConfig) -> Self {
        Self {
            portal_origin: config.portal_origin(),
            message_type: config.message_type.clone(),
            cancel_type: config.cancel_type.clone(),
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            SessionState::Fulfilled | SessionState::Rejected(_) | SessionState::TimedOut
        )
    }

    /// Bind the session to the nonce it was opened with and the context the
    /// portal was opened in. Has no effect unless the session is idle.
    pub fn start(&mut self, circuit_id: &str, nonce: &str, context: ContextId) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Pending {
                circuit_id: circuit_id.to_string(),
                nonce: nonce.to_string(),
                context,
            };
            debug!(circuit_id, ?context, "proof session pending");
        }
    }

    /// Feed one event to the session. Returns the outcome on the terminal
    /// transition and `None` for events that do not concern this session.
    pub fn handle(&mut self, event: &PortalEvent) -> Option<SessionOutcome> {
        let SessionState::Pending {
            circuit_id,
            nonce,
            context,
        } = &self.state
        else {
            return None;
        };

        let outcome = match event {
            PortalEvent::Closed { source } if source == context => Err(HandshakeError::Cancelled(
                "portal closed before a proof was sent".to_string(),
            )),
            PortalEvent::Closed { .. } => return None,
            PortalEvent::Message {
                source,
                origin,
                data,
            } => {
                if source != context {
                    debug!(?source, "ignoring message from foreign context");
                    return None;
                }
                if *origin != self.portal_origin {
                    debug!(%origin, "ignoring message from unexpected origin");
                    return None;
                }
                self.interpret(data, circuit_id, nonce)?
            }
        };

        self.state = match &outcome {
            Ok(_) => SessionState::Fulfilled,
            Err(err) => SessionState::Rejected(err.clone()),
        };
        debug!(state = ?self.state, "proof session settled");
        Some(outcome)
    }

    /// Settle a still-pending session as timed out.
    pub fn time_out(&mut self, after: Duration) -> HandshakeError {
        if matches!(self.state, SessionState::Pending { .. }) {
            self.state = SessionState::TimedOut;
            debug!(?after, "proof session timed out");
        }
        HandshakeError::TimedOut(after)
    }

    fn interpret(&self, data: &JsonValue, circuit_id: &str, nonce: &str) -> Option<SessionOutcome> {
        let message_type = data.get("type").and_then(JsonValue::as_str)?;

        if message_type == self.cancel_type {
            let reason = data
                .get("reason")
                .and_then(JsonValue::as_str)
                .unwrap_or("cancelled in portal");
            return Some(Err(HandshakeError::Cancelled(reason.to_string())));
        }
        if message_type != self.message_type {
            debug!(message_type, "ignoring message of unrecognized type");
            return None;
        }

        let mut envelope: ProofEnvelope = match serde_json::from_value(data.clone()) {
            Ok(envelope) => envelope,
            Err(err) => return Some(Err(HandshakeError::MalformedMessage(err.to_string()))),
        };
        if envelope.meta.nonce != nonce {
            debug!(
                received = %envelope.meta.nonce,
                "ignoring proof bound to another session"
            );
            return None;
        }
        if envelope.circuit_id().is_empty() {
            envelope.circuit_id = circuit_id.to_string();
        }
        Some(Ok(envelope))
    }
}
