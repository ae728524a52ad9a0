//! Canonicalization of heterogeneous public-input encodings into 32-byte words.
//!
//! Portals and proving backends disagree on how a pair of public inputs is
//! serialized. [`classify`] decides which encoding a payload uses, in a fixed
//! priority order, and [`canonicalize`] turns each encoding into the same
//! `[Word32; 2]`. Adding an encoding means adding an [`InputShape`] variant.

use num_bigint::BigUint;
use serde_json::Value as JsonValue;
use zkpp_common::{strip_0x, HexWordError, RawPublicInputs, VerificationError, Word32};

/// Bytes per canonical word; also the element count of one byte row.
const WORD_BYTES: usize = 32;

/// Structural encodings accepted for a two-word public-input pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputShape<'a> {
    /// `["0x…", "0x…"]`: hex words, possibly shorter than 32 bytes.
    HexWords([&'a str; 2]),
    /// Two field elements given as JSON numbers or decimal strings.
    FieldElements([&'a JsonValue; 2]),
    /// 64 byte slots; each half of 32 slots forms one word.
    ByteSlots(&'a [JsonValue]),
    /// Two rows of 32 byte values.
    ByteRows([&'a [JsonValue]; 2]),
}

impl InputShape<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            InputShape::HexWords(_) => "bytes32[2]",
            InputShape::FieldElements(_) => "fieldElement[2]",
            InputShape::ByteSlots(_) => "u8[64]",
            InputShape::ByteRows(_) => "u8[32]x2",
        }
    }
}

/// Pick the first encoding whose structure matches `raw`.
pub fn classify(raw: &JsonValue) -> Option<InputShape<'_>> {
    let items = raw.as_array()?;

    if let [a, b] = items.as_slice() {
        if let (Some(a), Some(b)) = (prefixed_hex(a), prefixed_hex(b)) {
            return Some(InputShape::HexWords([a, b]));
        }
        if is_field_element(a) && is_field_element(b) {
            return Some(InputShape::FieldElements([a, b]));
        }
    }

    if items.len() == 2 * WORD_BYTES {
        return Some(InputShape::ByteSlots(items));
    }

    if let [JsonValue::Array(a), JsonValue::Array(b)] = items.as_slice() {
        if a.len() == WORD_BYTES && b.len() == WORD_BYTES {
            return Some(InputShape::ByteRows([a, b]));
        }
    }

    None
}

/// Convert a classified payload into its canonical word pair.
pub fn canonicalize(shape: InputShape<'_>) -> Result<[Word32; 2], VerificationError> {
    let label = shape.label();
    let pair = match shape {
        InputShape::HexWords([a, b]) => [hex_word(a), hex_word(b)],
        InputShape::FieldElements([a, b]) => [field_element_word(a), field_element_word(b)],
        InputShape::ByteSlots(slots) => {
            let (first, second) = slots.split_at(WORD_BYTES);
            [byte_row_word(first), byte_row_word(second)]
        }
        InputShape::ByteRows([a, b]) => [byte_row_word(a), byte_row_word(b)],
    };

    let [first, second] = pair;
    let wrap = |index: usize, err: String| {
        VerificationError::PublicInputShape(format!("{label} element {index}: {err}"))
    };
    Ok([
        first.map_err(|err| wrap(0, err))?,
        second.map_err(|err| wrap(1, err))?,
    ])
}

/// Normalize a two-word public-input payload of any supported encoding.
pub fn normalize_pair(raw: &RawPublicInputs) -> Result<Vec<Word32>, VerificationError> {
    let shape = classify(raw.as_json()).ok_or_else(|| {
        VerificationError::PublicInputShape(format!(
            "no supported encoding matches {}",
            describe_public_inputs(raw.as_json())
        ))
    })?;
    Ok(canonicalize(shape)?.to_vec())
}

/// Final byte of every 32-byte slot, concatenated.
///
/// Some circuits expose a 20-byte contract address as twenty public inputs,
/// one address byte in the tail of each slot; this recovers those bytes.
pub fn last_byte_of_32<S: AsRef<str>>(words: &[S]) -> Result<Vec<u8>, HexWordError> {
    words
        .iter()
        .map(|word| Word32::from_hex(word.as_ref()).map(|w| w.last_byte()))
        .collect()
}

/// Short structural description of a payload, for diagnostics.
pub fn describe_public_inputs(raw: &JsonValue) -> String {
    let Some(items) = raw.as_array() else {
        return json_kind(raw).to_string();
    };
    let sample: Vec<&str> = items.iter().take(3).map(json_kind).collect();
    let mut description = format!("array(len={}, sample=[{}]", items.len(), sample.join(", "));
    if let Some(JsonValue::Array(inner)) = items.first() {
        description.push_str(&format!(", inner_len={}", inner.len()));
    }
    description.push(')');
    description
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn prefixed_hex(value: &JsonValue) -> Option<&str> {
    value.as_str().filter(|s| s.starts_with("0x"))
}

fn is_field_element(value: &JsonValue) -> bool {
    match value {
        JsonValue::Number(_) => true,
        JsonValue::String(s) => !s.starts_with("0x"),
        _ => false,
    }
}

fn hex_word(value: &str) -> Result<Word32, String> {
    Word32::from_hex(value).map_err(|err| err.to_string())
}

fn field_element_word(value: &JsonValue) -> Result<Word32, String> {
    match value {
        JsonValue::Number(n) => n
            .as_u64()
            .map(Word32::from_u64)
            .ok_or_else(|| format!("{n} is not a non-negative integer")),
        JsonValue::String(s) => {
            let digits = s.trim();
            let value = BigUint::parse_bytes(digits.as_bytes(), 10)
                .ok_or_else(|| format!("'{s}' is not a decimal integer"))?;
            Word32::from_be_slice(&value.to_bytes_be()).map_err(|err| err.to_string())
        }
        other => Err(format!("unsupported field element {}", json_kind(other))),
    }
}

fn byte_row_word(row: &[JsonValue]) -> Result<Word32, String> {
    if row.len() != WORD_BYTES {
        return Err(format!("expected {WORD_BYTES} byte values, got {}", row.len()));
    }
    let mut bytes = [0u8; WORD_BYTES];
    for (slot, value) in bytes.iter_mut().zip(row) {
        *slot = slot_byte(value)?;
    }
    Ok(Word32::from_bytes(bytes))
}

/// Low byte of one slot value: the last two hex digits of a string, the low
/// eight bits of a number, or the first entry of a nested byte array.
fn slot_byte(value: &JsonValue) -> Result<u8, String> {
    match value {
        JsonValue::String(s) => {
            let digits = strip_0x(s);
            if !digits.is_ascii() {
                return Err(format!("'{s}' is not a hex byte"));
            }
            let tail = &digits[digits.len().saturating_sub(2)..];
            u8::from_str_radix(&format!("{tail:0>2}"), 16)
                .map_err(|_| format!("'{s}' is not a hex byte"))
        }
        JsonValue::Number(n) => n
            .as_i64()
            .map(|v| (v & 0xff) as u8)
            .or_else(|| n.as_u64().map(|v| (v & 0xff) as u8))
            .ok_or_else(|| format!("{n} is not an integer byte")),
        JsonValue::Array(inner) => inner
            .first()
            .and_then(JsonValue::as_u64)
            .map(|v| (v & 0xff) as u8)
            .ok_or_else(|| "nested byte array has no leading byte".to_string()),
        other => Err(format!("unsupported byte item {}", json_kind(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: JsonValue) -> RawPublicInputs {
        RawPublicInputs::new(value)
    }

    #[test]
    fn hex_pair_is_padded_and_lowercased() {
        let words = normalize_pair(&raw(json!(["0xAB", "0x01"]))).unwrap();
        assert_eq!(words, vec![Word32::from_u64(0xab), Word32::from_u64(1)]);
    }

    #[test]
    fn field_elements_accept_numbers_and_decimal_strings() {
        let words = normalize_pair(&raw(json!([255, "65536"]))).unwrap();
        assert_eq!(words, vec![Word32::from_u64(255), Word32::from_u64(65536)]);

        // 2^255 does not fit a u64 but fits a word.
        let big = "57896044618658097711785492504343953926634992332820282019728792003956564819968";
        let words = normalize_pair(&raw(json!([big, "0"]))).unwrap();
        assert_eq!(words[0].as_bytes()[0], 0x80);
        assert!(words[0].as_bytes()[1..].iter().all(|b| *b == 0));
    }

    #[test]
    fn byte_slots_split_into_two_words() {
        let mut slots: Vec<JsonValue> = (0u64..32).map(|i| json!(i)).collect();
        slots.extend((0..32).map(|i| json!(format!("0x{:064x}", 0xa0 + i))));
        let words = normalize_pair(&raw(JsonValue::Array(slots))).unwrap();

        let mut first = [0u8; 32];
        let mut second = [0u8; 32];
        for i in 0..32 {
            first[i] = i as u8;
            second[i] = 0xa0 + i as u8;
        }
        assert_eq!(words, vec![Word32::from_bytes(first), Word32::from_bytes(second)]);
    }

    #[test]
    fn byte_rows_become_words() {
        let row_a: Vec<u8> = vec![0x11; 32];
        let row_b: Vec<u8> = (0..32).collect();
        let words = normalize_pair(&raw(json!([row_a, row_b]))).unwrap();
        assert_eq!(words[0], Word32::from_bytes([0x11; 32]));
        assert_eq!(words[1].as_bytes()[31], 31);
    }

    #[test]
    fn hex_pair_takes_priority_over_field_elements() {
        assert!(matches!(
            classify(&json!(["0x01", "0x02"])),
            Some(InputShape::HexWords(_))
        ));
        // A mixed pair matches neither two-element rule.
        assert_eq!(classify(&json!(["0x01", "2"])), None);
    }

    #[test]
    fn unrecognized_shapes_fail() {
        for value in [
            json!(["0x01", "0x02", "0x03"]),
            json!({"a": 1}),
            json!([[1, 2], [3]]),
            json!([]),
        ] {
            let err = normalize_pair(&raw(value)).unwrap_err();
            assert!(matches!(err, VerificationError::PublicInputShape(_)));
        }
    }

    #[test]
    fn malformed_elements_report_index() {
        let err = normalize_pair(&raw(json!(["12", "twelve"]))).unwrap_err();
        assert!(err.to_string().contains("fieldElement[2] element 1"));

        let err = normalize_pair(&raw(json!(["0x01", format!("0x{}", "f".repeat(65))]))).unwrap_err();
        assert!(err.to_string().contains("bytes32[2] element 1"));
    }

    #[test]
    fn last_byte_of_32_collects_slot_tails() {
        let words = ["0x00000000000000000000000000000000000000000000000000000000000000ab", "0xcd", "ef"];
        assert_eq!(last_byte_of_32(&words).unwrap(), vec![0xab, 0xcd, 0xef]);
        assert!(last_byte_of_32(&["0xgg"]).is_err());
    }

    #[test]
    fn describe_reports_structure() {
        assert_eq!(
            describe_public_inputs(&json!(["0x1", 2, [1, 2]])),
            "array(len=3, sample=[string, number, array])"
        );
        assert_eq!(
            describe_public_inputs(&json!([[1, 2], [3, 4]])),
            "array(len=2, sample=[array, array], inner_len=2)"
        );
        assert_eq!(describe_public_inputs(&json!("x")), "string");
    }
}
