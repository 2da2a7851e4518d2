//! Migration notification wire formats.
//!
//! Producers in this repository publish the JSON form. Consumers also accept
//! S3 `ObjectCreated` event documents (when the staging bucket notifies the
//! queue directly) and bare staging keys left behind by older producers.

use serde::Deserialize;
use sharespace_core::{KeyError, MigrationNotification, StagingKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Message body is empty")]
    Empty,

    #[error("Unrecognised message body: {0}")]
    Unrecognised(String),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("Invalid notification JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct S3Event {
    #[serde(rename = "Records")]
    records: Vec<S3EventRecord>,
}

#[derive(Debug, Deserialize)]
struct S3EventRecord {
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    object: S3Object,
}

#[derive(Debug, Deserialize)]
struct S3Object {
    key: String,
}

/// Serialize a notification as `{"tenant_id":7,"post_id":42}`.
pub fn encode_notification(notification: &MigrationNotification) -> String {
    serde_json::json!({
        "tenant_id": notification.tenant_id,
        "post_id": notification.post_id,
    })
    .to_string()
}

/// Translate a queue message body into the notifications it carries.
///
/// An S3 test event carries none and decodes to an empty list.
pub fn decode_body(body: &str) -> Result<Vec<MigrationNotification>, NotificationError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(NotificationError::Empty);
    }

    if !body.starts_with('{') {
        return Ok(vec![StagingKey::parse(body)?.notification()]);
    }

    let value: serde_json::Value = serde_json::from_str(body)?;
    if value.get("Records").is_some() {
        let event: S3Event = serde_json::from_value(value)?;
        return event
            .records
            .iter()
            .map(|record| {
                let key = decode_event_key(&record.s3.object.key);
                Ok(StagingKey::parse(&key)?.notification())
            })
            .collect();
    }
    if value.get("Event").and_then(|e| e.as_str()) == Some("s3:TestEvent") {
        return Ok(Vec::new());
    }
    if value.get("tenant_id").is_some() {
        return Ok(vec![serde_json::from_value(value)?]);
    }

    Err(NotificationError::Unrecognised(body.to_string()))
}

/// S3 event keys are form-encoded: spaces arrive as `+`.
fn decode_event_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|k| k.into_owned())
        .unwrap_or(spaced)
}
