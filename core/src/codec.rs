//! Decoders and encoders converting between wire bytes and typed values.
//!
//! # Design
//! `Decoder<A>` and `Encoder` are capabilities injected into a resource.
//! The defaults are serde_json based. `JsonDecoder` can rewrite snake_case
//! object keys to camelCase before deserializing, for payloads whose naming
//! does not match the target type's serde names.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{DataError, DecodeError, TaggedError};

/// Turns raw response bytes into `A`.
pub trait Decoder<A>: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<A, DecodeError>;
}

/// Turns a structured body into bytes. `None` means the value could not be
/// encoded.
pub trait Encoder: Send + Sync {
    fn encode(&self, value: &Value) -> Option<Vec<u8>>;
}

/// How `JsonDecoder` treats object keys before deserializing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyDecodingStrategy {
    /// Keys are used as they appear in the payload.
    #[default]
    UseDefaultKeys,
    /// `key_one` becomes `keyOne`, recursively through nested objects and
    /// arrays.
    ConvertFromSnakeCase,
}

/// The default structured decoder.
pub struct JsonDecoder<A> {
    strategy: KeyDecodingStrategy,
    _marker: PhantomData<fn() -> A>,
}

impl<A> JsonDecoder<A> {
    pub fn new(strategy: KeyDecodingStrategy) -> Self {
        Self {
            strategy,
            _marker: PhantomData,
        }
    }

    pub fn snake_case() -> Self {
        Self::new(KeyDecodingStrategy::ConvertFromSnakeCase)
    }
}

impl<A> Default for JsonDecoder<A> {
    fn default() -> Self {
        Self::new(KeyDecodingStrategy::UseDefaultKeys)
    }
}

impl<A: DeserializeOwned> Decoder<A> for JsonDecoder<A> {
    fn decode(&self, bytes: &[u8]) -> Result<A, DecodeError> {
        match self.strategy {
            KeyDecodingStrategy::UseDefaultKeys => serde_json::from_slice(bytes).map_err(classify),
            KeyDecodingStrategy::ConvertFromSnakeCase => {
                let mut value: Value = serde_json::from_slice(bytes).map_err(classify)?;
                convert_keys(&mut value);
                serde_json::from_value(value).map_err(classify)
            }
        }
    }
}

/// Discards the body. Used for endpoints that answer with 204.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreBody;

impl Decoder<()> for IgnoreBody {
    fn decode(&self, _bytes: &[u8]) -> Result<(), DecodeError> {
        Ok(())
    }
}

/// Any closure from bytes to a decode result is a decoder.
impl<A, F> Decoder<A> for F
where
    F: Fn(&[u8]) -> Result<A, DecodeError> + Send + Sync,
{
    fn decode(&self, bytes: &[u8]) -> Result<A, DecodeError> {
        self(bytes)
    }
}

/// The default structured encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl Encoder for JsonEncoder {
    fn encode(&self, value: &Value) -> Option<Vec<u8>> {
        serde_json::to_vec(value).ok()
    }
}

fn classify(error: serde_json::Error) -> DecodeError {
    use serde_json::error::Category;

    let kind = match error.classify() {
        Category::Data => DataError::Parse,
        Category::Syntax | Category::Eof | Category::Io => DataError::InvalidJson,
    };
    TaggedError::with_source(kind, error)
}

fn convert_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let entries = std::mem::take(map);
            for (key, mut nested) in entries {
                convert_keys(&mut nested);
                map.insert(snake_to_camel(&key), nested);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(convert_keys),
        _ => {}
    }
}

/// `key_one` → `keyOne`. Leading and trailing underscores are preserved and
/// a key without inner underscores is returned unchanged.
fn snake_to_camel(key: &str) -> String {
    let trimmed = key.trim_matches('_');
    if trimmed.is_empty() || !trimmed.contains('_') {
        return key.to_string();
    }
    let leading = key.len() - key.trim_start_matches('_').len();
    let trailing = key.len() - key.trim_end_matches('_').len();

    let mut out = String::with_capacity(key.len());
    out.push_str(&key[..leading]);
    for (i, part) in trimmed.split('_').filter(|p| !p.is_empty()).enumerate() {
        if i == 0 {
            out.push_str(part);
            continue;
        }
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out.push_str(&key[key.len() - trailing..]);
    out
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Thing {
        name: String,
        number: i64,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Keyed {
        key_one: String,
        key_two: i64,
    }

    #[test]
    fn default_decoder_reads_plain_objects() {
        let thing: Thing = JsonDecoder::default()
            .decode(br#"{"name":"test","number":1}"#)
            .unwrap();
        assert_eq!(
            thing,
            Thing {
                name: "test".to_string(),
                number: 1
            }
        );
    }

    #[test]
    fn default_decoder_rejects_snake_case_keys_for_camel_case_fields() {
        let err = Decoder::<Keyed>::decode(&JsonDecoder::default(), br#"{"key_one":"v","key_two":2}"#)
            .unwrap_err();
        assert_eq!(*err.kind(), DataError::Parse);
    }

    #[test]
    fn snake_case_decoder_converts_keys() {
        let keyed: Keyed = JsonDecoder::snake_case()
            .decode(br#"{"key_one":"v","key_two":2}"#)
            .unwrap();
        assert_eq!(
            keyed,
            Keyed {
                key_one: "v".to_string(),
                key_two: 2
            }
        );
    }

    #[test]
    fn syntax_errors_are_invalid_json() {
        let err = Decoder::<Thing>::decode(&JsonDecoder::default(), b"{not json").unwrap_err();
        assert_eq!(*err.kind(), DataError::InvalidJson);

        let err = Decoder::<Thing>::decode(&JsonDecoder::default(), b"").unwrap_err();
        assert_eq!(*err.kind(), DataError::InvalidJson);
    }

    #[test]
    fn snake_to_camel_edge_cases() {
        assert_eq!(snake_to_camel("key_one"), "keyOne");
        assert_eq!(snake_to_camel("a_b_c"), "aBC");
        assert_eq!(snake_to_camel("_private_key"), "_privateKey");
        assert_eq!(snake_to_camel("trailing_key_"), "trailingKey_");
        assert_eq!(snake_to_camel("double__under"), "doubleUnder");
        assert_eq!(snake_to_camel("plain"), "plain");
        assert_eq!(snake_to_camel("___"), "___");
    }

    #[test]
    fn conversion_recurses_into_arrays_and_objects() {
        let mut value = serde_json::json!({"outer_key": [{"inner_key": 1}]});
        convert_keys(&mut value);
        assert_eq!(value, serde_json::json!({"outerKey": [{"innerKey": 1}]}));
    }

    #[test]
    fn closures_are_decoders() {
        let decoder = |bytes: &[u8]| -> Result<usize, DecodeError> { Ok(bytes.len()) };
        assert_eq!(decoder.decode(b"abcd").unwrap(), 4);
    }

    #[test]
    fn json_encoder_serializes_values() {
        let bytes = JsonEncoder.encode(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(bytes, br#"{"a":1}"#);
    }
}
