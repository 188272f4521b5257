//! Strict text codec for stored embeddings.
//!
//! An embedding lives in a TEXT column as a JSON numeric array, e.g.
//! `[0.12, -3.4, 1.0]`. Decoding goes through `serde_json` and fails loudly
//! on anything that is not a flat array of numbers; there is no generic
//! evaluation path for stored data.

use crate::types::Embedding;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("stored embedding is not a JSON numeric array: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("stored embedding decodes to an empty vector")]
    Empty,
    #[error("embedding contains a non-finite component at index {0}")]
    NonFinite(usize),
}

/// Serialize an embedding to its storage text form.
///
/// Rejects NaN and infinity up front; they have no JSON representation and
/// would poison every later distance computation.
pub fn encode(embedding: &Embedding) -> Result<String, EncodingError> {
    if let Some(i) = embedding.values.iter().position(|v| !v.is_finite()) {
        return Err(EncodingError::NonFinite(i));
    }
    // f32 Display emits the shortest round-tripping decimal, which is a
    // valid JSON number.
    let body: Vec<String> = embedding.values.iter().map(|v| v.to_string()).collect();
    Ok(format!("[{}]", body.join(", ")))
}

/// Parse the storage text form back into an embedding.
pub fn decode(text: &str) -> Result<Embedding, EncodingError> {
    let values: Vec<f32> = serde_json::from_str(text)?;
    if values.is_empty() {
        return Err(EncodingError::Empty);
    }
    Ok(Embedding::new(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_preserves_values() {
        let original = Embedding::new(vec![0.125, -3.5, 1.0, 0.000123, 9999.75]);
        let text = encode(&original).unwrap();
        let decoded = decode(&text).unwrap();

        assert_eq!(decoded.dim(), original.dim());
        for (a, b) in original.values.iter().zip(decoded.values.iter()) {
            assert!((a - b).abs() < 1e-6, "{a} != {b}");
        }
    }

    #[test]
    fn test_decode_accepts_python_style_list() {
        // Legacy rows were written as str(list) — whitespace and all.
        let decoded = decode("[1.0, 2.5, -0.75]").unwrap();
        assert_eq!(decoded.values, vec![1.0, 2.5, -0.75]);
    }

    #[test]
    fn test_decode_rejects_malformed_text() {
        assert!(matches!(decode("not a vector"), Err(EncodingError::Malformed(_))));
        assert!(matches!(decode("[1.0, \"two\"]"), Err(EncodingError::Malformed(_))));
        assert!(matches!(decode("{\"v\": [1.0]}"), Err(EncodingError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_empty_array() {
        assert!(matches!(decode("[]"), Err(EncodingError::Empty)));
    }

    #[test]
    fn test_encode_rejects_non_finite() {
        let bad = Embedding::new(vec![1.0, f32::NAN]);
        assert!(matches!(encode(&bad), Err(EncodingError::NonFinite(1))));
        let inf = Embedding::new(vec![f32::INFINITY]);
        assert!(matches!(encode(&inf), Err(EncodingError::NonFinite(0))));
    }
}
