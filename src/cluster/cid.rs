//! CID Extraction
//!
//! Add responses differ between node implementations: a JSON object, a JSON
//! array, newline-delimited JSON, or plain text. Structured `cid`/`hash`
//! fields win; otherwise the first CIDv0-looking token in the raw text is used.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::domain::Cid;
use crate::error::{Error, Result};

/// `Qm` followed by at least 44 base58btc characters.
static CID_V0_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Qm[1-9A-HJ-NP-Za-km-z]{44,}").expect("valid CIDv0 pattern"));

const CID_KEYS: &[&str] = &["cid", "Cid", "CID", "hash", "Hash"];

/// Recover the content identifier from an add response body.
pub fn extract_cid(body: &str) -> Result<Cid> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(Error::CidExtraction("empty response body".into()));
    }

    let structured = match structured_cid(trimmed) {
        Some(raw) => match Cid::parse(&raw) {
            Ok(cid) => return Ok(cid),
            Err(e) => Some(e),
        },
        None => None,
    };

    // an unparseable structured field still leaves the raw text to search
    if let Some(cid) = CID_V0_PATTERN
        .find_iter(trimmed)
        .find_map(|m| Cid::parse(m.as_str()).ok())
    {
        return Ok(cid);
    }

    Err(Error::CidExtraction(match structured {
        Some(e) => format!("{} and no CID pattern in response", e),
        None => format!(
            "no cid/hash field and no CID pattern in response: {}",
            truncate(trimmed, 200)
        ),
    }))
}

fn structured_cid(body: &str) -> Option<String> {
    if let Ok(doc) = serde_json::from_str::<Value>(body) {
        return cid_in_document(&doc);
    }
    // newline-delimited JSON, one entry per added object
    body.lines()
        .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
        .find_map(|doc| cid_in_document(&doc))
}

fn cid_in_document(doc: &Value) -> Option<String> {
    match doc {
        Value::Array(items) => items.iter().find_map(cid_in_document),
        Value::Object(map) => CID_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(cid_value),
        _ => None,
    }
}

fn cid_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(link) => link
            .get("/")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string()),
        _ => None,
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const CID: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

    #[test]
    fn test_extract_from_hash_field() {
        let body = format!(r#"{{"Name":"a.txt","Hash":"{}","Size":"12"}}"#, CID);
        assert_eq!(extract_cid(&body).unwrap().as_str(), CID);
    }

    #[test]
    fn test_extract_from_cid_field() {
        let body = format!(r#"{{"name":"a.txt","cid":"{}","size":12}}"#, CID);
        assert_eq!(extract_cid(&body).unwrap().as_str(), CID);
    }

    #[test]
    fn test_extract_from_cid_link_object() {
        let body = format!(r#"[{{"name":"a.txt","cid":{{"/":"{}"}}}}]"#, CID);
        assert_eq!(extract_cid(&body).unwrap().as_str(), CID);
    }

    #[test]
    fn test_extract_from_ndjson() {
        let body = format!(
            "{{\"name\":\"a.txt\",\"bytes\":1024}}\n{{\"name\":\"a.txt\",\"cid\":\"{}\"}}\n",
            CID
        );
        assert_eq!(extract_cid(&body).unwrap().as_str(), CID);
    }

    #[test]
    fn test_structured_field_accepts_cidv1() {
        let v1 = "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";
        let body = format!(r#"{{"cid":"{}"}}"#, v1);
        assert_eq!(extract_cid(&body).unwrap().as_str(), v1);
    }

    #[test]
    fn test_extract_from_raw_text() {
        let body = format!("added {} a.txt\n", CID);
        assert_eq!(extract_cid(&body).unwrap().as_str(), CID);
    }

    #[test]
    fn test_json_without_cid_falls_back_to_pattern() {
        let body = format!(r#"{{"message":"stored as {}"}}"#, CID);
        assert_eq!(extract_cid(&body).unwrap().as_str(), CID);
    }

    #[test]
    fn test_invalid_structured_field_falls_back_to_pattern() {
        let body = format!(
            r#"{{"hash":"sha2-256:deadbeef","message":"added {}"}}"#,
            CID
        );
        assert_eq!(extract_cid(&body).unwrap().as_str(), CID);
    }

    #[test]
    fn test_invalid_structured_field_without_pattern_fails() {
        let err = extract_cid(r#"{"hash":"sha2-256:deadbeef"}"#).unwrap_err();
        assert_matches!(&err, Error::CidExtraction(msg) if msg.contains("sha2-256:deadbeef"));
    }

    #[test]
    fn test_short_qm_token_is_rejected() {
        assert_matches!(
            extract_cid("added QmShort a.txt"),
            Err(Error::CidExtraction(_))
        );
    }

    #[test]
    fn test_non_base58_characters_break_the_pattern() {
        // '0', 'O', 'I' and 'l' are not base58
        let body = "Qm0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl";
        assert_matches!(extract_cid(body), Err(Error::CidExtraction(_)));
    }

    #[test]
    fn test_empty_body() {
        assert_matches!(extract_cid("   \n"), Err(Error::CidExtraction(_)));
    }
}
