//! Read-only calls into deployed verifier contracts.

use async_trait::async_trait;
use ethers::{
    abi::{self, ParamType, Token},
    providers::{JsonRpcClient, Middleware, Provider, ProviderError, RpcError},
    types::{transaction::eip2718::TypedTransaction, Address, Bytes, TransactionRequest},
};
use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::debug;
use zkpp_common::{VerificationError, Word32};

/// Solidity signature of the verifier entry point.
pub const VERIFY_SIGNATURE: &str = "verify(bytes,bytes32[])";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainCallError {
    #[error("call reverted")]
    Reverted { data: Option<Bytes> },
    #[error("rpc transport error: {0}")]
    Transport(String),
}

/// Minimal chain access needed for verification: a static call that never
/// submits a transaction.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, ChainCallError>;
}

#[async_trait]
impl<P: JsonRpcClient + 'static> ChainProvider for Provider<P> {
    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, ChainCallError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(calldata).into();
        Middleware::call(self, &tx, None)
            .await
            .map_err(classify_provider_error)
    }
}

fn classify_provider_error(err: ProviderError) -> ChainCallError {
    if let Some(response) = err.as_error_response() {
        if let Some(data) = response.as_revert_data() {
            return ChainCallError::Reverted { data: Some(data) };
        }
        if response.message.to_ascii_lowercase().contains("revert") {
            return ChainCallError::Reverted { data: None };
        }
    }
    ChainCallError::Transport(err.to_string())
}

/// A verifier contract exposing `verify(bytes proof, bytes32[] publicInputs) returns (bool)`.
pub struct VerifierContract<'a> {
    provider: &'a dyn ChainProvider,
    address: Address,
}

impl<'a> VerifierContract<'a> {
    pub fn new(provider: &'a dyn ChainProvider, address: Address) -> Self {
        Self { provider, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Selector followed by the ABI-encoded `(proof, publicInputs)` tuple.
    pub fn calldata(proof: &[u8], public_inputs: &[Word32]) -> Bytes {
        let inputs = public_inputs
            .iter()
            .map(|word| Token::FixedBytes(word.as_bytes().to_vec()))
            .collect();
        let args = abi::encode(&[Token::Bytes(proof.to_vec()), Token::Array(inputs)]);

        let mut calldata = selector(VERIFY_SIGNATURE).to_vec();
        calldata.extend_from_slice(&args);
        Bytes::from(calldata)
    }

    /// Run the verifier as a static call. `Ok(false)` means the contract
    /// returned `false`; reverts and transport failures are errors.
    pub async fn verify(
        &self,
        proof: &[u8],
        public_inputs: &[Word32],
    ) -> Result<bool, VerificationError> {
        let calldata = Self::calldata(proof, public_inputs);
        debug!(
            verifier = ?self.address,
            calldata_len = calldata.len(),
            "calling verifier contract"
        );

        match self.provider.call(self.address, calldata).await {
            Ok(output) => decode_bool(&output),
            Err(ChainCallError::Reverted { data }) => Err(VerificationError::ContractRevert {
                reason: data.as_deref().and_then(decode_revert_reason),
            }),
            Err(ChainCallError::Transport(err)) => {
                Err(VerificationError::BackendVerificationFailure(err))
            }
        }
    }
}

fn decode_bool(output: &[u8]) -> Result<bool, VerificationError> {
    match abi::decode(&[ParamType::Bool], output).as_deref() {
        Ok([Token::Bool(valid)]) => Ok(*valid),
        _ => Err(VerificationError::BackendVerificationFailure(format!(
            "verifier returned {} bytes that do not decode as bool",
            output.len()
        ))),
    }
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = ethers::utils::keccak256(signature);
    [hash[0], hash[1], hash[2], hash[3]]
}

struct KnownRevert {
    name: &'static str,
    selector: [u8; 4],
    params: Vec<ParamType>,
}

impl KnownRevert {
    fn new(name: &'static str, params: Vec<ParamType>) -> Self {
        let types: Vec<String> = params.iter().map(ToString::to_string).collect();
        let signature = format!("{name}({})", types.join(","));
        Self {
            name,
            selector: selector(&signature),
            params,
        }
    }
}

/// Revert payloads the verifier contracts (and Solidity itself) produce.
static KNOWN_REVERTS: Lazy<Vec<KnownRevert>> = Lazy::new(|| {
    vec![
        KnownRevert::new("Error", vec![ParamType::String]),
        KnownRevert::new("Panic", vec![ParamType::Uint(256)]),
        KnownRevert::new(
            "PublicInputsLengthWrong",
            vec![ParamType::Uint(256), ParamType::Uint(256)],
        ),
        KnownRevert::new(
            "ProofLengthWrong",
            vec![ParamType::Uint(256), ParamType::Uint(256)],
        ),
        KnownRevert::new("SumcheckFailed", vec![]),
        KnownRevert::new("ShpleminiFailed", vec![]),
    ]
});

/// Human-readable reason for a revert payload. `None` for empty data.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.is_empty() {
        return None;
    }
    if data.len() < 4 {
        return Some(format!("unknown revert 0x{}", hex::encode(data)));
    }

    let (head, args) = data.split_at(4);
    let Some(known) = KNOWN_REVERTS.iter().find(|k| k.selector[..] == *head) else {
        return Some(format!("unknown revert 0x{}", hex::encode(data)));
    };

    let Ok(tokens) = abi::decode(&known.params, args) else {
        return Some(format!("{}(<undecodable args>)", known.name));
    };

    match (known.name, tokens.as_slice()) {
        ("Error", [Token::String(message)]) => Some(message.clone()),
        ("Panic", [Token::Uint(code)]) => Some(format!("Panic(0x{code:x})")),
        (name, tokens) => {
            let values: Vec<String> = tokens.iter().map(format_token).collect();
            Some(format!("{name}({})", values.join(", ")))
        }
    }
}

fn format_token(token: &Token) -> String {
    match token {
        Token::Uint(value) | Token::Int(value) => value.to_string(),
        Token::String(value) => value.clone(),
        Token::Bool(value) => value.to_string(),
        other => format!("{other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;
    use std::sync::Mutex;

    struct StaticProvider {
        response: Result<Bytes, ChainCallError>,
        seen: Mutex<Vec<(Address, Bytes)>>,
    }

    impl StaticProvider {
        fn new(response: Result<Bytes, ChainCallError>) -> Self {
            Self {
                response,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChainProvider for StaticProvider {
        async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, ChainCallError> {
            self.seen.lock().unwrap().push((to, calldata));
            self.response.clone()
        }
    }

    fn revert_data(signature: &str, args: &[Token]) -> Bytes {
        let mut data = selector(signature).to_vec();
        data.extend_from_slice(&abi::encode(args));
        Bytes::from(data)
    }

    #[test]
    fn calldata_encodes_selector_and_arguments() {
        let inputs = [Word32::from_u64(1), Word32::from_u64(2)];
        let calldata = VerifierContract::calldata(&[0xde, 0xad], &inputs);

        assert_eq!(&calldata[..4], &ethers::utils::id(VERIFY_SIGNATURE)[..]);
        let tokens = abi::decode(
            &[
                ParamType::Bytes,
                ParamType::Array(Box::new(ParamType::FixedBytes(32))),
            ],
            &calldata[4..],
        )
        .unwrap();
        assert_eq!(tokens[0], Token::Bytes(vec![0xde, 0xad]));
        assert_eq!(
            tokens[1],
            Token::Array(vec![
                Token::FixedBytes(inputs[0].as_bytes().to_vec()),
                Token::FixedBytes(inputs[1].as_bytes().to_vec()),
            ])
        );
    }

    #[tokio::test]
    async fn boolean_result_is_returned() {
        let address = Address::from([0x4c; 20]);
        for expected in [true, false] {
            let provider = StaticProvider::new(Ok(abi::encode(&[Token::Bool(expected)]).into()));
            let contract = VerifierContract::new(&provider, address);
            assert_eq!(contract.verify(b"proof", &[]).await, Ok(expected));
            assert_eq!(provider.seen.lock().unwrap()[0].0, address);
        }
    }

    #[tokio::test]
    async fn reverts_and_transport_errors_are_distinguished() {
        let address = Address::zero();

        let reverted = StaticProvider::new(Err(ChainCallError::Reverted {
            data: Some(revert_data("SumcheckFailed()", &[])),
        }));
        assert_eq!(
            VerifierContract::new(&reverted, address).verify(b"p", &[]).await,
            Err(VerificationError::ContractRevert {
                reason: Some("SumcheckFailed()".into())
            })
        );

        let broken = StaticProvider::new(Err(ChainCallError::Transport("connection refused".into())));
        assert!(matches!(
            VerifierContract::new(&broken, address).verify(b"p", &[]).await,
            Err(VerificationError::BackendVerificationFailure(_))
        ));

        let garbage = StaticProvider::new(Ok(Bytes::from(vec![1, 2, 3])));
        assert!(matches!(
            VerifierContract::new(&garbage, address).verify(b"p", &[]).await,
            Err(VerificationError::BackendVerificationFailure(_))
        ));
    }

    #[test]
    fn revert_reasons_are_decoded() {
        let data = revert_data(
            "PublicInputsLengthWrong(uint256,uint256)",
            &[Token::Uint(U256::from(2)), Token::Uint(U256::from(3))],
        );
        assert_eq!(
            decode_revert_reason(&data).as_deref(),
            Some("PublicInputsLengthWrong(2, 3)")
        );

        let data = revert_data("Error(string)", &[Token::String("bad proof".into())]);
        assert_eq!(decode_revert_reason(&data).as_deref(), Some("bad proof"));

        let data = revert_data("Panic(uint256)", &[Token::Uint(U256::from(0x11))]);
        assert_eq!(decode_revert_reason(&data).as_deref(), Some("Panic(0x11)"));

        assert_eq!(decode_revert_reason(&[]), None);
        assert_eq!(
            decode_revert_reason(&[0xaa, 0xbb, 0xcc, 0xdd]).as_deref(),
            Some("unknown revert 0xaabbccdd")
        );
    }
}
