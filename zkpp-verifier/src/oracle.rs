//! Offchain verification oracle.
//!
//! The cryptographic engine itself is opaque: it is built from the circuit's
//! published artifact and answers `verify(proof, inputs) -> bool`.

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use zkpp_common::RawPublicInputs;

/// `(proof, public inputs, artifact url) -> bool`.
#[async_trait]
pub trait ProofOracle: Send + Sync {
    async fn verify(
        &self,
        proof: &[u8],
        public_inputs: &RawPublicInputs,
        circuit_url: &str,
    ) -> Result<bool>;
}

/// Compiled circuit artifact as published next to the circuit sources.
#[derive(Clone, Debug, Deserialize)]
pub struct CircuitArtifact {
    pub bytecode: String,
    #[serde(default)]
    pub noir_version: Option<String>,
}

/// A verification engine instantiated from one circuit's bytecode.
pub trait VerificationEngine: Send {
    fn verify(&self, proof: &[u8], public_inputs: &RawPublicInputs) -> Result<bool>;
}

pub trait EngineFactory: Send + Sync {
    fn load(&self, artifact: &CircuitArtifact) -> Result<Box<dyn VerificationEngine>>;
}

/// Oracle that resolves the artifact URL, builds an engine from its bytecode
/// and runs the engine off the async scheduler.
pub struct ArtifactOracle<F> {
    client: reqwest::Client,
    factory: Arc<F>,
}

impl<F: EngineFactory + 'static> ArtifactOracle<F> {
    pub fn new(factory: F) -> Self {
        Self::with_client(reqwest::Client::new(), factory)
    }

    pub fn with_client(client: reqwest::Client, factory: F) -> Self {
        Self {
            client,
            factory: Arc::new(factory),
        }
    }

    /// Load the artifact from `http(s)://` or `file://` locations.
    pub async fn fetch_artifact(&self, url: &str) -> Result<CircuitArtifact> {
        if let Some(path) = url.strip_prefix("file://") {
            return read_local_artifact(Path::new(path)).await;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to fetch circuit artifact from {url}"))?
            .error_for_status()
            .with_context(|| format!("circuit artifact request to {url} failed"))?;
        response
            .json::<CircuitArtifact>()
            .await
            .with_context(|| format!("circuit artifact at {url} is not valid artifact json"))
    }
}

#[async_trait]
impl<F: EngineFactory + 'static> ProofOracle for ArtifactOracle<F> {
    async fn verify(
        &self,
        proof: &[u8],
        public_inputs: &RawPublicInputs,
        circuit_url: &str,
    ) -> Result<bool> {
        let artifact = self.fetch_artifact(circuit_url).await?;
        debug!(
            circuit_url,
            bytecode_len = artifact.bytecode.len(),
            noir_version = artifact.noir_version.as_deref().unwrap_or("unknown"),
            "loaded circuit artifact"
        );

        let engine = self
            .factory
            .load(&artifact)
            .context("failed to construct verification engine")?;
        let proof = proof.to_vec();
        let public_inputs = public_inputs.clone();
        tokio::task::spawn_blocking(move || engine.verify(&proof, &public_inputs))
            .await
            .context("verification engine task failed")?
    }
}

async fn read_local_artifact(path: &Path) -> Result<CircuitArtifact> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read circuit artifact at {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to parse circuit artifact at {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts a proof iff it equals the artifact bytecode's bytes.
    struct EchoFactory {
        loads: AtomicUsize,
    }

    struct EchoEngine {
        expected: Vec<u8>,
    }

    impl VerificationEngine for EchoEngine {
        fn verify(&self, proof: &[u8], _public_inputs: &RawPublicInputs) -> Result<bool> {
            Ok(proof == self.expected.as_slice())
        }
    }

    impl EngineFactory for EchoFactory {
        fn load(&self, artifact: &CircuitArtifact) -> Result<Box<dyn VerificationEngine>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(EchoEngine {
                expected: artifact.bytecode.as_bytes().to_vec(),
            }))
        }
    }

    fn oracle() -> ArtifactOracle<EchoFactory> {
        ArtifactOracle::new(EchoFactory {
            loads: AtomicUsize::new(0),
        })
    }

    fn write_artifact(dir: &tempfile::TempDir, body: &str) -> String {
        let path = dir.path().join("circuit.json");
        std::fs::write(&path, body).unwrap();
        format!("file://{}", path.display())
    }

    #[tokio::test]
    async fn verifies_with_engine_built_from_local_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let url = write_artifact(&dir, r#"{"noir_version":"1.0.0","bytecode":"H4sI"}"#);
        let oracle = oracle();
        let inputs = RawPublicInputs::new(serde_json::json!([]));

        assert!(oracle.verify(b"H4sI", &inputs, &url).await.unwrap());
        assert!(!oracle.verify(b"other", &inputs, &url).await.unwrap());
        assert_eq!(oracle.factory.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn artifact_problems_surface_as_errors() {
        let dir = tempfile::tempdir().unwrap();
        let oracle = oracle();
        let inputs = RawPublicInputs::new(serde_json::json!([]));

        let missing = format!("file://{}", dir.path().join("missing.json").display());
        assert!(oracle.verify(b"x", &inputs, &missing).await.is_err());

        let no_bytecode = write_artifact(&dir, r#"{"abi":{}}"#);
        assert!(oracle.verify(b"x", &inputs, &no_bytecode).await.is_err());
        assert_eq!(oracle.factory.loads.load(Ordering::SeqCst), 0);
    }
}
