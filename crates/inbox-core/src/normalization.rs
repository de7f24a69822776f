use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    error::ClientError,
    types::{ClientEvent, MessagePage, MutationAck, MutationKind, PageTicket},
};

/// Decode a backend JSON response, honouring the `{status: "error", error}` envelope.
///
/// Non-2xx statuses become status-classified errors carrying the backend text
/// when one is present; 2xx bodies tagged `"error"` become application errors.
pub fn decode_api_response<T: DeserializeOwned>(
    status: u16,
    body: &[u8],
) -> Result<T, ClientError> {
    let parsed = serde_json::from_slice::<Value>(body);

    if !(200..300).contains(&status) {
        let message = parsed
            .ok()
            .as_ref()
            .and_then(envelope_error)
            .unwrap_or_else(|| {
                let text = String::from_utf8_lossy(body).trim().to_owned();
                if text.is_empty() {
                    format!("backend returned HTTP {status}")
                } else {
                    text
                }
            });
        return Err(ClientError::http_status(status, message));
    }

    let value = parsed.map_err(|err| ClientError::serialization(err.to_string()))?;
    if value.get("status").and_then(Value::as_str) == Some("error") {
        let message = envelope_error(&value).unwrap_or_else(|| "backend reported an error".into());
        return Err(ClientError::application(message));
    }

    serde_json::from_value(value).map_err(|err| ClientError::serialization(err.to_string()))
}

fn envelope_error(value: &Value) -> Option<String> {
    value
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Convert a mutation outcome into a stable `ClientEvent::MutationAck`.
pub fn normalize_mutation_outcome(
    request_id: impl Into<String>,
    kind: MutationKind,
    outcome: Result<(), ClientError>,
) -> ClientEvent {
    ClientEvent::MutationAck(MutationAck {
        request_id: request_id.into(),
        kind,
        error: outcome.err(),
    })
}

/// Convert a history fetch outcome into `HistoryPage` or `HistoryFailed`.
pub fn normalize_history_outcome(
    ticket: PageTicket,
    outcome: Result<MessagePage, ClientError>,
) -> ClientEvent {
    match outcome {
        Ok(page) => ClientEvent::HistoryPage { ticket, page },
        Err(error) => ClientEvent::HistoryFailed { ticket, error },
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::error::ClientErrorCategory;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Ok200 {
        status: String,
    }

    #[test]
    fn decodes_success_body() {
        let decoded: Ok200 =
            decode_api_response(200, br#"{"status":"ok"}"#).expect("body should decode");
        assert_eq!(decoded.status, "ok");
    }

    #[test]
    fn error_envelope_on_success_status_is_application_error() {
        let err = decode_api_response::<Ok200>(
            200,
            br#"{"status":"error","error":"Message not found"}"#,
        )
        .expect_err("error envelope should fail");
        assert_eq!(err.category, ClientErrorCategory::Application);
        assert_eq!(err.message, "Message not found");
    }

    #[test]
    fn non_success_status_prefers_envelope_text() {
        let err = decode_api_response::<Ok200>(
            404,
            br#"{"status":"error","error":"File not found"}"#,
        )
        .expect_err("404 should fail");
        assert_eq!(err.category, ClientErrorCategory::NotFound);
        assert_eq!(err.message, "File not found");

        let err = decode_api_response::<Ok200>(502, b"").expect_err("502 should fail");
        assert_eq!(err.category, ClientErrorCategory::Network);
        assert_eq!(err.message, "backend returned HTTP 502");
    }

    #[test]
    fn malformed_body_is_serialization_error() {
        let err = decode_api_response::<Ok200>(200, b"<html>").expect_err("html should fail");
        assert_eq!(err.category, ClientErrorCategory::Serialization);
    }

    #[test]
    fn maps_failure_to_ack_with_error() {
        let event = normalize_mutation_outcome(
            "req-2",
            MutationKind::React,
            Err(ClientError::application("nope")),
        );

        match event {
            ClientEvent::MutationAck(ack) => {
                assert_eq!(ack.request_id, "req-2");
                assert_eq!(ack.kind, MutationKind::React);
                assert!(!ack.is_ok());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
