//! Verification engine backed by an external command.
//!
//! The command receives `{"bytecode", "proof", "publicInputs"}` as JSON on
//! stdin and answers with its exit status: 0 accepts, 1 rejects, anything
//! else is an engine failure.

use std::{
    io::Write,
    path::PathBuf,
    process::{Command, Stdio},
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use zkpp_common::RawPublicInputs;
use zkpp_verifier::{CircuitArtifact, EngineFactory, ProofOracle, VerificationEngine};

/// Oracle used when no engine command is configured.
pub struct DisabledOracle;

#[async_trait]
impl ProofOracle for DisabledOracle {
    async fn verify(
        &self,
        _proof: &[u8],
        _public_inputs: &RawPublicInputs,
        _circuit_url: &str,
    ) -> Result<bool> {
        bail!("no verification engine configured; pass --engine or use --mode onchain")
    }
}

#[derive(Clone, Debug)]
pub struct CommandEngineFactory {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandEngineFactory {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl EngineFactory for CommandEngineFactory {
    fn load(&self, artifact: &CircuitArtifact) -> Result<Box<dyn VerificationEngine>> {
        if artifact.bytecode.is_empty() {
            bail!("circuit artifact has an empty bytecode field");
        }
        Ok(Box::new(CommandEngine {
            program: self.program.clone(),
            args: self.args.clone(),
            bytecode: artifact.bytecode.clone(),
        }))
    }
}

struct CommandEngine {
    program: PathBuf,
    args: Vec<String>,
    bytecode: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EngineRequest<'a> {
    bytecode: &'a str,
    proof: String,
    public_inputs: &'a RawPublicInputs,
}

impl VerificationEngine for CommandEngine {
    fn verify(&self, proof: &[u8], public_inputs: &RawPublicInputs) -> Result<bool> {
        let request = serde_json::to_vec(&EngineRequest {
            bytecode: &self.bytecode,
            proof: format!("0x{}", hex::encode(proof)),
            public_inputs,
        })?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to start engine {}", self.program.display()))?;

        child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("engine stdin unavailable"))?
            .write_all(&request)
            .context("failed to send request to engine")?;

        let status = child.wait().context("failed to wait for engine")?;
        match status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            Some(code) => bail!("engine exited with status {code}"),
            None => bail!("engine terminated by signal"),
        }
    }
}
