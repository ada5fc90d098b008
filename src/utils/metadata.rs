//! Codec for the TUS `Upload-Metadata` header.
//!
//! The header is a comma separated list of `key base64(value)` pairs; the
//! value part may be omitted. Keys are non-empty ASCII without spaces or
//! commas and must be unique.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::BTreeMap;

pub type UploadMetadata = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata key {0:?} is empty or contains invalid characters")]
    InvalidKey(String),
    #[error("metadata key {0:?} appears more than once")]
    DuplicateKey(String),
    #[error("metadata value for {0:?} is not valid base64 UTF-8")]
    InvalidValue(String),
}

fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii() && !c.is_ascii_control() && c != ' ' && c != ',')
}

pub fn parse(header: &str) -> Result<UploadMetadata, MetadataError> {
    let mut metadata = UploadMetadata::new();

    for pair in header.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let mut parts = pair.splitn(2, ' ');
        let key = parts.next().unwrap_or_default();
        if !valid_key(key) {
            return Err(MetadataError::InvalidKey(key.to_string()));
        }

        let value = match parts.next().map(str::trim).filter(|v| !v.is_empty()) {
            Some(encoded) => STANDARD
                .decode(encoded)
                .ok()
                .and_then(|raw| String::from_utf8(raw).ok())
                .ok_or_else(|| MetadataError::InvalidValue(key.to_string()))?,
            None => String::new(),
        };

        if metadata.insert(key.to_string(), value).is_some() {
            return Err(MetadataError::DuplicateKey(key.to_string()));
        }
    }

    Ok(metadata)
}

pub fn encode(metadata: &UploadMetadata) -> String {
    metadata
        .iter()
        .map(|(key, value)| {
            if value.is_empty() {
                key.clone()
            } else {
                format!("{} {}", key, STANDARD.encode(value))
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs_and_bare_keys() {
        // "filename" -> "xray.dcm", "kind" -> "dicom"
        let parsed = parse("filename eHJheS5kY20=,kind ZGljb20=,is_confidential").unwrap();
        assert_eq!(parsed.get("filename").map(String::as_str), Some("xray.dcm"));
        assert_eq!(parsed.get("kind").map(String::as_str), Some("dicom"));
        assert_eq!(parsed.get("is_confidential").map(String::as_str), Some(""));
    }

    #[test]
    fn empty_header_is_empty_map() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse(" , ").unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            parse("name !!notbase64"),
            Err(MetadataError::InvalidValue("name".to_string()))
        );
        assert_eq!(
            parse("a YQ==,a Yg=="),
            Err(MetadataError::DuplicateKey("a".to_string()))
        );
        assert!(matches!(parse("bäd YQ=="), Err(MetadataError::InvalidKey(_))));
    }

    #[test]
    fn encode_is_accepted_by_parse() {
        let mut metadata = UploadMetadata::new();
        metadata.insert("filename".to_string(), "lab result.pdf".to_string());
        metadata.insert("urgent".to_string(), String::new());

        let header = encode(&metadata);
        assert_eq!(header, "filename bGFiIHJlc3VsdC5wZGY=,urgent");
        assert_eq!(parse(&header).unwrap(), metadata);
    }
}
