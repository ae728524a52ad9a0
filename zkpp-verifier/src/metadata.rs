//! Freshness, origin and replay checks on proof request metadata.

use std::{
    collections::HashSet,
    fs,
    path::Path,
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};

use sled::Db;
use thiserror::Error;
use tracing::debug;
use zkpp_common::{ProofRequest, VerificationError};

pub const DEFAULT_MAX_AGE_SECS: u64 = 300;
pub const DEFAULT_MAX_FUTURE_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("failed to create directory for replay ledger at {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("replay ledger db error: {0}")]
    Db(#[from] sled::Error),
}

/// Source of "now" for freshness checks.
#[derive(Clone, Debug, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(i64),
}

impl Clock {
    pub fn now_secs(&self) -> i64 {
        match self {
            Clock::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or_default(),
            Clock::Fixed(now) => *now,
        }
    }
}

/// Accepted age window for a proof request timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreshnessWindow {
    pub max_age_secs: u64,
    /// Forward clock skew tolerated for timestamps from the future.
    pub max_future_secs: u64,
}

impl Default for FreshnessWindow {
    fn default() -> Self {
        Self {
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            max_future_secs: DEFAULT_MAX_FUTURE_SECS,
        }
    }
}

impl FreshnessWindow {
    pub fn with_max_age(max_age_secs: u64) -> Self {
        Self {
            max_age_secs,
            ..Self::default()
        }
    }

    /// `true` if a proof `age_secs` old is inside the window. Both bounds are inclusive.
    pub fn contains(&self, age_secs: i64) -> bool {
        age_secs <= self.max_age_secs as i64 && age_secs >= -(self.max_future_secs as i64)
    }
}

/// Append-only set of consumed nonces.
///
/// Cloning shares the underlying set. Consumption is atomic within one
/// process; independent processes need external coordination even with the
/// persistent backend.
#[derive(Clone)]
pub struct ReplayLedger {
    backend: Arc<LedgerBackend>,
}

enum LedgerBackend {
    InMemory(Mutex<HashSet<String>>),
    Persistent(Db),
}

impl ReplayLedger {
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(LedgerBackend::InMemory(Mutex::new(HashSet::new()))),
        }
    }

    pub fn persistent(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| LedgerError::CreateDir {
                    path: path_ref.display().to_string(),
                    source,
                })?;
            }
        }
        let db = sled::open(path_ref)?;
        Ok(Self {
            backend: Arc::new(LedgerBackend::Persistent(db)),
        })
    }

    /// Record `nonce` as consumed. Returns `false` if it had already been
    /// consumed; check and insert happen as one step.
    pub fn consume(&self, nonce: &str) -> Result<bool, LedgerError> {
        match &*self.backend {
            LedgerBackend::InMemory(set) => {
                let mut guard = set.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                Ok(guard.insert(nonce.to_string()))
            }
            LedgerBackend::Persistent(db) => {
                let previous = db.insert(nonce.as_bytes(), &b""[..])?;
                Ok(previous.is_none())
            }
        }
    }

    pub fn contains(&self, nonce: &str) -> Result<bool, LedgerError> {
        match &*self.backend {
            LedgerBackend::InMemory(set) => Ok(set
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .contains(nonce)),
            LedgerBackend::Persistent(db) => Ok(db.contains_key(nonce.as_bytes())?),
        }
    }

    pub fn len(&self) -> usize {
        match &*self.backend {
            LedgerBackend::InMemory(set) => set
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .len(),
            LedgerBackend::Persistent(db) => db.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flush(&self) -> Result<(), LedgerError> {
        if let LedgerBackend::Persistent(db) = &*self.backend {
            db.flush()?;
        }
        Ok(())
    }
}

/// Validates origin binding, timestamp freshness and nonce uniqueness of a
/// [`ProofRequest`]. Deliberately not idempotent: a nonce passes at most once.
#[derive(Clone)]
pub struct MetadataValidator {
    origin: String,
    window: FreshnessWindow,
    clock: Clock,
    ledger: ReplayLedger,
}

impl MetadataValidator {
    pub fn new(origin: impl Into<String>, ledger: ReplayLedger) -> Self {
        Self {
            origin: origin.into(),
            window: FreshnessWindow::default(),
            clock: Clock::System,
            ledger,
        }
    }

    pub fn with_window(mut self, window: FreshnessWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn ledger(&self) -> &ReplayLedger {
        &self.ledger
    }

    pub fn validate(&self, meta: &ProofRequest) -> Result<(), VerificationError> {
        if meta.origin != self.origin {
            return Err(VerificationError::OriginMismatch {
                expected: self.origin.clone(),
                actual: meta.origin.clone(),
            });
        }

        let age_secs = self.clock.now_secs().saturating_sub(meta.timestamp);
        if !self.window.contains(age_secs) {
            return Err(VerificationError::TimestampOutOfRange {
                age_secs,
                max_age_secs: self.window.max_age_secs,
                max_future_secs: self.window.max_future_secs,
            });
        }

        let fresh = self
            .ledger
            .consume(&meta.nonce)
            .map_err(|err| VerificationError::LedgerUnavailable(err.to_string()))?;
        if !fresh {
            return Err(VerificationError::ReplayDetected {
                nonce: meta.nonce.clone(),
            });
        }

        debug!(nonce = %meta.nonce, age_secs, "proof metadata accepted");
        Ok(())
    }
}
