//! SIP message parsing
//!
//! Decodes raw signaling payloads into a structured record. The grammar is
//! deliberately narrow: headers are `Name: value` lines split on the first
//! colon (last occurrence wins), and digest-authentication parameters are
//! `token=quoted-string` or `token=bareword` pairs inside the
//! `Authorization` header. Payloads are decoded lossily; a malformed message
//! yields a partial header map, never a failure.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::net::IpAddr;

/// Parsed SIP message with enrichment metadata
///
/// Serializes with the header map flattened at the top level, the document
/// shape the store's consumers index.
#[derive(Debug, Clone, Serialize)]
pub struct SipRecord {
    /// Decoded headers plus flat-merged auth parameters and `Timestamp`
    #[serde(flatten)]
    pub fields: Map<String, Value>,

    #[serde(rename = "Authorization_Details", skip_serializing_if = "Option::is_none")]
    pub authorization_details: Option<Map<String, Value>>,

    #[serde(rename = "Source_IP")]
    pub source_ip: IpAddr,

    #[serde(rename = "Destination_IP")]
    pub destination_ip: IpAddr,

    #[serde(rename = "Source_IP_Details", skip_serializing_if = "Option::is_none")]
    pub source_ip_details: Option<Value>,
}

impl SipRecord {
    /// Look up a decoded header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Attach the source-address enrichment result
    pub fn set_enrichment(&mut self, details: Value) {
        self.source_ip_details = Some(details);
    }
}

/// SIP message parser with pre-compiled grammar
pub struct SipParser {
    /// `token=quoted-string | token=bareword` auth parameter pairs
    param_re: Regex,
    /// Digest `Authorization` header line in the full message
    auth_re: Regex,
}

impl SipParser {
    pub fn new() -> Self {
        Self {
            param_re: Regex::new(r#"(\w+)=("[^"]+"|[\w/]+)"#).unwrap(),
            auth_re: Regex::new(r"Authorization: Digest ([^\r\n]+)").unwrap(),
        }
    }

    /// Parse a raw signaling payload into a `SipRecord`.
    ///
    /// Invalid UTF-8 sequences are replaced rather than rejected, and lines
    /// without a colon are ignored, so partially-malformed probes still
    /// produce a usable record.
    pub fn parse(
        &self,
        payload: &[u8],
        src_ip: IpAddr,
        dst_ip: IpAddr,
        timestamp: DateTime<Utc>,
    ) -> SipRecord {
        let text = String::from_utf8_lossy(payload);

        let mut fields = Map::new();
        for line in text.lines() {
            if let Some((key, value)) = line.split_once(':') {
                fields.insert(
                    key.trim().to_string(),
                    Value::String(value.trim().to_string()),
                );
            }
        }

        // Flat-merge digest parameters into the header map
        let auth = fields
            .get("Authorization")
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(auth) = auth {
            let params = auth.trim_start_matches("Digest").trim().to_string();
            for caps in self.param_re.captures_iter(&params) {
                fields.insert(
                    caps[1].to_string(),
                    Value::String(caps[2].trim_matches('"').to_string()),
                );
            }
        }

        // Second scan of the full message for the nested representation
        let authorization_details = self.auth_re.captures(&text).map(|caps| {
            let mut details = Map::new();
            for kv in self.param_re.captures_iter(&caps[1]) {
                details.insert(
                    kv[1].to_string(),
                    Value::String(kv[2].trim_matches('"').to_string()),
                );
            }
            details
        });

        fields.insert(
            "Timestamp".to_string(),
            Value::String(timestamp.to_rfc3339()),
        );

        SipRecord {
            fields,
            authorization_details,
            source_ip: src_ip,
            destination_ip: dst_ip,
            source_ip_details: None,
        }
    }
}

impl Default for SipParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(payload: &[u8]) -> SipRecord {
        SipParser::new().parse(
            payload,
            "198.51.100.7".parse().unwrap(),
            "203.0.113.5".parse().unwrap(),
            Utc::now(),
        )
    }

    #[test]
    fn test_cseq_header() {
        let record = parse(b"CSeq: 101 INVITE\r\n");
        assert_eq!(record.header("CSeq"), Some("101 INVITE"));
    }

    #[test]
    fn test_first_colon_split_only() {
        let record = parse(b"Via: SIP/2.0/UDP 198.51.100.7:5060;branch=z9hG4bK776\r\n");
        assert_eq!(
            record.header("Via"),
            Some("SIP/2.0/UDP 198.51.100.7:5060;branch=z9hG4bK776")
        );
    }

    #[test]
    fn test_last_duplicate_header_wins() {
        let record = parse(b"Via: first\r\nVia: second\r\n");
        assert_eq!(record.header("Via"), Some("second"));
    }

    #[test]
    fn test_lines_without_colon_ignored() {
        let record = parse(b"garbage line\r\nTo: <sip:100>\r\n");
        assert_eq!(record.header("To"), Some("<sip:100>"));
        assert!(record.header("garbage line").is_none());
    }

    #[test]
    fn test_digest_flat_merge_and_nested_agree() {
        let payload = b"REGISTER sip:203.0.113.5 SIP/2.0\r\n\
            Authorization: Digest username=\"100\", realm=\"asterisk\", \
            nonce=\"464fa712\", uri=\"sip:203.0.113.5\", \
            response=\"a6466dce70e7b098d1d68961d553e2b2\", algorithm=MD5\r\n\
            CSeq: 2 REGISTER\r\n";
        let record = parse(payload);

        // Flat merge, quotes stripped
        assert_eq!(record.header("username"), Some("100"));
        assert_eq!(record.header("realm"), Some("asterisk"));
        assert_eq!(record.header("algorithm"), Some("MD5"));

        // Nested map carries the same content
        let details = record.authorization_details.as_ref().unwrap();
        assert_eq!(details["username"], "100");
        assert_eq!(details["realm"], "asterisk");
        assert_eq!(details["algorithm"], "MD5");
        assert_eq!(details["response"], "a6466dce70e7b098d1d68961d553e2b2");
    }

    #[test]
    fn test_equals_inside_quoted_value() {
        let payload = b"Authorization: Digest username=\"user\", nonce=\"a=b=c\"\r\n";
        let record = parse(payload);
        assert_eq!(record.header("nonce"), Some("a=b=c"));
    }

    #[test]
    fn test_missing_authorization_is_fine() {
        let record = parse(b"OPTIONS sip:100@host SIP/2.0\r\nMax-Forwards: 70\r\n");
        assert!(record.authorization_details.is_none());
        assert_eq!(record.header("Max-Forwards"), Some("70"));
    }

    #[test]
    fn test_invalid_utf8_does_not_abort() {
        let mut payload = b"From: <sip:100@host>\r\n".to_vec();
        payload.extend_from_slice(&[0xff, 0xfe]);
        payload.extend_from_slice(b"\r\nTo: <sip:200@host>\r\n");

        let record = parse(&payload);
        assert_eq!(record.header("From"), Some("<sip:100@host>"));
        assert_eq!(record.header("To"), Some("<sip:200@host>"));
    }

    #[test]
    fn test_timestamp_attached() {
        let record = parse(b"CSeq: 1 OPTIONS\r\n");
        assert!(record.header("Timestamp").is_some());
    }

    #[test]
    fn test_serializes_flattened() {
        let mut record = parse(b"CSeq: 1 OPTIONS\r\n");
        record.set_enrichment(serde_json::json!({"geoip": {"country": "DE"}}));

        let doc = serde_json::to_value(&record).unwrap();
        assert_eq!(doc["CSeq"], "1 OPTIONS");
        assert_eq!(doc["Source_IP"], "198.51.100.7");
        assert_eq!(doc["Source_IP_Details"]["geoip"]["country"], "DE");
    }
}
