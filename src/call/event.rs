//! Bus payload describing one observed call.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::PublishError;
use crate::signaling::CallRequest;

/// Published on `<base>/event`.
///
/// Serializes as `{"type":"request","method":"INVITE","headers":{...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEvent {
    Request {
        method: String,
        headers: BTreeMap<String, String>,
    },
}

impl CallEvent {
    /// Builds the event; repeated header names are joined with `", "` in message order.
    pub fn from_request(request: &CallRequest) -> Self {
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in &request.headers {
            headers
                .entry(name.clone())
                .and_modify(|joined| {
                    joined.push_str(", ");
                    joined.push_str(value);
                })
                .or_insert_with(|| value.clone());
        }
        CallEvent::Request {
            method: request.method.clone(),
            headers,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, PublishError> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_tagged_request() {
        let request = CallRequest::new("INVITE")
            .with_header("To", "<sip:620@fritz.box>")
            .with_header("From", "\"Alice\" <sip:0301234@fritz.box>;tag=1");

        let json = CallEvent::from_request(&request).to_json().unwrap();
        assert_eq!(
            String::from_utf8(json).unwrap(),
            r#"{"type":"request","method":"INVITE","headers":{"From":"\"Alice\" <sip:0301234@fritz.box>;tag=1","To":"<sip:620@fritz.box>"}}"#
        );
    }

    #[test]
    fn repeated_headers_are_joined() {
        let request = CallRequest::new("INVITE")
            .with_header("Via", "SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bK1")
            .with_header("Via", "SIP/2.0/UDP 10.0.0.2:5060;branch=z9hG4bK2");

        let CallEvent::Request { headers, .. } = CallEvent::from_request(&request);
        assert_eq!(headers.len(), 1);
        assert_eq!(
            headers["Via"],
            "SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bK1, SIP/2.0/UDP 10.0.0.2:5060;branch=z9hG4bK2"
        );
    }

    #[test]
    fn request_without_headers_has_empty_mapping() {
        let json = CallEvent::from_request(&CallRequest::new("INVITE")).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value["headers"], serde_json::json!({}));
        assert_eq!(value["type"], "request");
    }
}
