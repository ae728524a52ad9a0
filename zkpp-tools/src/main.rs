mod engine;

use std::{
    fmt, fs,
    io::{self, Read},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ethers::{
    providers::{Http, Provider},
    types::Address,
};
use serde::Serialize;
use tracing::info;
use zkpp_common::{ProofEnvelope, ProofRequest, RawPublicInputs, Word32, CIRCUIT_ID_COINBASE_KYC};
use zkpp_verifier::{
    describe_public_inputs, normalize::classify, ArtifactOracle, ChainProvider, ProofOracle,
    VerificationMode, VerifierConfig, VerifyRequest,
};

use crate::engine::{CommandEngineFactory, DisabledOracle};

#[derive(Parser)]
#[command(
    name = "zkpp-verify",
    about = "Verify zkproofport proof envelopes and inspect public inputs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a proof envelope (JSON) using the environment configuration.
    Verify(VerifyArgs),
    /// Print the public inputs a circuit expects for an origin and nonce.
    ExpectedInputs(ExpectedArgs),
    /// Canonicalize a public-input payload (JSON) into 32-byte words.
    Normalize(NormalizeArgs),
    /// List the registered circuits.
    Circuits(OutputArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Run the circuit's verification engine locally.
    Offchain,
    /// Call the circuit's verifier contract through ZKPP_RPC_URL.
    Onchain,
}

impl From<Mode> for VerificationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Offchain => VerificationMode::Offchain,
            Mode::Onchain => VerificationMode::Onchain,
        }
    }
}

#[derive(Args)]
struct VerifyArgs {
    /// Envelope file; `-` reads stdin.
    #[arg(long, default_value = "-")]
    envelope: String,
    #[arg(long, value_enum, default_value_t = Mode::Offchain)]
    mode: Mode,
    /// Verifier contract to call instead of the circuit default.
    #[arg(long)]
    verifier: Option<String>,
    /// Engine command for offchain verification, followed by its arguments.
    #[arg(long, num_args = 1.., value_delimiter = ' ')]
    engine: Vec<String>,
}

#[derive(Args)]
struct ExpectedArgs {
    #[arg(long, default_value = CIRCUIT_ID_COINBASE_KYC)]
    circuit: String,
    #[arg(long)]
    origin: String,
    #[arg(long)]
    nonce: String,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct NormalizeArgs {
    /// Public inputs file; `-` reads stdin.
    #[arg(long, default_value = "-")]
    input: String,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct OutputArgs {
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zkpp_verifier=info,zkpp_verify=info".into()),
        )
        .with_writer(io::stderr)
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match cli.command {
        Commands::Verify(args) => verify(args).await,
        Commands::ExpectedInputs(args) => expected_inputs(args),
        Commands::Normalize(args) => normalize(args),
        Commands::Circuits(args) => circuits(args),
    }
}

async fn verify(args: VerifyArgs) -> Result<()> {
    let config = VerifierConfig::from_env().context("failed to load verifier configuration")?;
    let envelope: ProofEnvelope = serde_json::from_slice(&read_input(&args.envelope)?)
        .context("envelope is not a valid proof envelope")?;

    let oracle: Arc<dyn ProofOracle> = match args.engine.split_first() {
        Some((program, rest)) => Arc::new(ArtifactOracle::new(CommandEngineFactory::new(
            program,
            rest.to_vec(),
        ))),
        None => Arc::new(DisabledOracle),
    };
    let verifier = config.build_verifier(oracle)?;

    let provider = match (args.mode, &config.rpc_url) {
        (Mode::Onchain, Some(url)) => Some(
            Provider::<Http>::try_from(url.as_str())
                .with_context(|| format!("invalid rpc url {url}"))?,
        ),
        _ => None,
    };

    info!(
        circuit_id = envelope.circuit_id(),
        mode = ?args.mode,
        "verifying proof envelope"
    );
    let mut request = VerifyRequest::from_envelope(&envelope).with_mode(args.mode.into());
    if let Some(provider) = &provider {
        request = request.with_provider(provider as &dyn ChainProvider);
    }
    if let Some(raw) = &args.verifier {
        let address: Address = raw
            .parse()
            .map_err(|err| anyhow!("invalid verifier address {raw}: {err}"))?;
        request = request.with_verifier(address);
    }
    let result = verifier.verify(request).await;

    println!("{}", serde_json::to_string_pretty(&result.report())?);
    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn expected_inputs(args: ExpectedArgs) -> Result<()> {
    let registry = VerifierConfig::new(args.origin.clone()).registry()?;
    let spec = registry.resolve(&args.circuit)?;
    let meta = ProofRequest::new(&args.nonce, &args.origin, 0, &args.circuit);
    let summary = WordsSummary {
        label: spec.title().to_string(),
        words: spec.derive_expected_inputs(&meta),
    };
    output_summary(&summary, args.output.json)
}

fn normalize(args: NormalizeArgs) -> Result<()> {
    let value: serde_json::Value = serde_json::from_slice(&read_input(&args.input)?)
        .context("public inputs are not valid JSON")?;
    let shape = classify(&value)
        .map(|shape| shape.label())
        .ok_or_else(|| anyhow!("no supported encoding matches {}", describe_public_inputs(&value)))?;
    let words = zkpp_verifier::normalize_pair(&RawPublicInputs::new(value))?;
    output_summary(
        &WordsSummary {
            label: shape.to_string(),
            words,
        },
        args.output.json,
    )
}

fn circuits(args: OutputArgs) -> Result<()> {
    let registry = VerifierConfig::new("").registry()?;
    let circuits: Vec<CircuitSummary> = registry
        .ids()
        .into_iter()
        .map(|id| -> Result<CircuitSummary> {
            let spec = registry.resolve(id)?;
            Ok(CircuitSummary {
                id: id.to_string(),
                title: spec.title().to_string(),
                circuit_url: spec.circuit_url().to_string(),
                verifier_address: spec.verifier_address().map(|a| format!("{a:#x}")),
            })
        })
        .collect::<Result<_>>()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&circuits)?);
    } else {
        for circuit in &circuits {
            print!("{circuit}");
        }
    }
    Ok(())
}

fn read_input(path: &str) -> Result<Vec<u8>> {
    if path == "-" {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    let path = PathBuf::from(path);
    fs::read(&path).with_context(|| format!("failed to read {}", path.display()))
}

fn output_summary<T>(summary: &T, json: bool) -> Result<()>
where
    T: Serialize + fmt::Display,
{
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        print!("{}", summary);
    }
    Ok(())
}

#[derive(Serialize)]
struct WordsSummary {
    label: String,
    words: Vec<Word32>,
}

impl fmt::Display for WordsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.label)?;
        for (index, word) in self.words.iter().enumerate() {
            writeln!(f, "  [{index}] {word}")?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct CircuitSummary {
    id: String,
    title: String,
    circuit_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    verifier_address: Option<String>,
}

impl fmt::Display for CircuitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.id, self.title)?;
        writeln!(f, "  artifact: {}", self.circuit_url)?;
        match &self.verifier_address {
            Some(address) => writeln!(f, "  verifier: {address}"),
            None => writeln!(f, "  verifier: <none>"),
        }
    }
}
