//! Proof exchange data model shared by the portal handshake and the verifier.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::word::{decode_hex_bytes, Word32};

/// Metadata minted by the requesting application at handshake start and echoed
/// back by the portal inside the proof envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRequest {
    pub nonce: String,
    pub origin: String,
    /// Seconds since the unix epoch.
    pub timestamp: i64,
    /// Older portal builds omit the circuit id from the metadata.
    #[serde(default)]
    pub circuit_id: String,
}

impl ProofRequest {
    pub fn new(
        nonce: impl Into<String>,
        origin: impl Into<String>,
        timestamp: i64,
        circuit_id: impl Into<String>,
    ) -> Self {
        Self {
            nonce: nonce.into(),
            origin: origin.into(),
            timestamp,
            circuit_id: circuit_id.into(),
        }
    }
}

/// Opaque proof bytes. The portal sends either a `0x` hex string or a JSON
/// array of byte values; both decode to the same bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProofBytes(pub Vec<u8>);

impl ProofBytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for ProofBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serialize for ProofBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(&self.0)))
    }
}

impl<'de> Deserialize<'de> for ProofBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Encoded {
            Hex(String),
            Bytes(Vec<u8>),
        }

        match Encoded::deserialize(deserializer)? {
            Encoded::Hex(s) => decode_hex_bytes(&s)
                .map(ProofBytes)
                .map_err(de::Error::custom),
            Encoded::Bytes(bytes) => Ok(ProofBytes(bytes)),
        }
    }
}

/// Public inputs exactly as the portal delivered them. The shape is circuit
/// defined (hex words, field elements or byte slots) and is only interpreted
/// by the circuit's normalizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPublicInputs(pub JsonValue);

impl RawPublicInputs {
    pub fn new(value: JsonValue) -> Self {
        Self(value)
    }

    pub fn from_words(words: &[Word32]) -> Self {
        Self(JsonValue::Array(
            words
                .iter()
                .map(|word| JsonValue::String(word.to_hex()))
                .collect(),
        ))
    }

    pub fn as_json(&self) -> &JsonValue {
        &self.0
    }

    /// The inputs as a list of strings, if every element is a string.
    pub fn as_strings(&self) -> Option<Vec<&str>> {
        self.0
            .as_array()?
            .iter()
            .map(JsonValue::as_str)
            .collect::<Option<Vec<_>>>()
    }
}

/// Proof, public inputs and request metadata delivered by the portal. Lives
/// only for the duration of one verification call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofEnvelope {
    pub proof: ProofBytes,
    pub public_inputs: RawPublicInputs,
    pub meta: ProofRequest,
    #[serde(default)]
    pub circuit_id: String,
}

impl ProofEnvelope {
    /// Circuit id of the envelope, falling back to the one echoed in the metadata.
    pub fn circuit_id(&self) -> &str {
        if self.circuit_id.is_empty() {
            &self.meta.circuit_id
        } else {
            &self.circuit_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn proof_bytes_accepts_hex_and_arrays() {
        let from_hex: ProofBytes = serde_json::from_value(json!("0x0a0b")).unwrap();
        let from_array: ProofBytes = serde_json::from_value(json!([10, 11])).unwrap();
        assert_eq!(from_hex, from_array);
        assert_eq!(serde_json::to_value(&from_hex).unwrap(), json!("0x0a0b"));
    }

    #[test]
    fn proof_bytes_rejects_bad_hex() {
        assert!(serde_json::from_value::<ProofBytes>(json!("0xnothex")).is_err());
    }

    #[test]
    fn envelope_parses_portal_payload() {
        let envelope: ProofEnvelope = serde_json::from_value(json!({
            "proof": "0x01",
            "publicInputs": ["0x01", "0x02"],
            "meta": { "nonce": "n-1", "origin": "https://app.example", "timestamp": 1_700_000_000 }
        }))
        .unwrap();

        assert_eq!(envelope.proof.as_slice(), &[1]);
        assert_eq!(envelope.meta.circuit_id, "");
        assert_eq!(envelope.circuit_id(), "");
        assert_eq!(
            envelope.public_inputs.as_strings().unwrap(),
            vec!["0x01", "0x02"]
        );
    }

    #[test]
    fn envelope_circuit_id_falls_back_to_meta() {
        let mut envelope = ProofEnvelope {
            proof: ProofBytes::default(),
            public_inputs: RawPublicInputs::new(json!([])),
            meta: ProofRequest::new("n", "o", 0, "coinbase_kyc"),
            circuit_id: String::new(),
        };
        assert_eq!(envelope.circuit_id(), "coinbase_kyc");
        envelope.circuit_id = "other".into();
        assert_eq!(envelope.circuit_id(), "other");
    }
}
