//! Newline-delimited JSON envelope shared by clients, peers and KV services.
//!
//! Every line on the wire is one [`Message`]. The body always carries a
//! `type`; requests carry a `msg_id`, replies point back at it through
//! `in_reply_to`. Everything else in the body is workload specific and is kept
//! as a free-form field map that handlers decode into their own request types.

use std::io;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ErrorCode, RpcError};

const LINE_ENDINGS: &[char] = &['\n', '\r'];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub src: String,
    pub dest: String,
    pub body: Body,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Body {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<u64>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Body {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            msg_id: None,
            in_reply_to: None,
            fields: Map::new(),
        }
    }

    /// Builds a body whose fields are taken from a serializable struct.
    ///
    /// The payload must serialize to a JSON object; its keys become body fields.
    pub fn with_payload<T: Serialize>(kind: impl Into<String>, payload: &T) -> Result<Self, RpcError> {
        let kind = kind.into();
        match serde_json::to_value(payload) {
            Ok(Value::Object(fields)) => Ok(Self {
                fields,
                ..Self::new(kind)
            }),
            Ok(other) => Err(RpcError::new(
                ErrorCode::Crash,
                format!("{kind} payload must be an object, got {other}"),
            )),
            Err(err) => Err(RpcError::new(
                ErrorCode::Crash,
                format!("failed to encode {kind} payload: {err}"),
            )),
        }
    }

    /// Decodes the body's fields into a typed request or response.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, RpcError> {
        serde_json::from_value(Value::Object(self.fields.clone())).map_err(|err| {
            RpcError::new(
                ErrorCode::MalformedRequest,
                format!("invalid {} body: {err}", self.kind),
            )
        })
    }

    pub fn error(err: &RpcError) -> Self {
        let mut body = Self::new("error");
        body.fields.insert("code".into(), Value::from(err.code.as_u16()));
        body.fields.insert("text".into(), Value::from(err.text.clone()));
        body
    }

    /// Interprets an `error` reply; returns `None` for any other body type.
    pub fn as_error(&self) -> Option<RpcError> {
        if self.kind != "error" {
            return None;
        }
        let code = self
            .fields
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .map_or(ErrorCode::Crash, ErrorCode::from_u16);
        let text = self
            .fields
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Some(RpcError::new(code, text))
    }
}

pub async fn read_message<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    loop {
        line.clear();
        let bytes = reader.read_line(&mut line).await?;
        if bytes == 0 {
            return Ok(None);
        }

        let trimmed = line.trim_end_matches(LINE_ENDINGS);
        if trimmed.is_empty() {
            continue;
        }

        let parsed = serde_json::from_str(trimmed).map_err(to_io_error)?;
        return Ok(Some(parsed));
    }
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    // One line per message, flushed so the peer sees it before we block again.
    let mut encoded = serde_json::to_vec(message).map_err(to_io_error)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

fn to_io_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_keeps_unknown_fields() {
        let raw = json!({"type": "send", "msg_id": 3, "key": "orders", "msg": 10});
        let body: Body = serde_json::from_value(raw.clone()).expect("decode body");
        assert_eq!(body.kind, "send");
        assert_eq!(body.msg_id, Some(3));
        assert_eq!(body.in_reply_to, None);
        assert_eq!(body.fields.get("key"), Some(&json!("orders")));
        assert_eq!(serde_json::to_value(&body).expect("encode body"), raw);
    }

    #[test]
    fn error_body_round_trips_code_and_text() {
        let err = RpcError::new(ErrorCode::KeyDoesNotExist, "missing");
        let body = Body::error(&err);
        assert_eq!(body.kind, "error");
        assert_eq!(body.fields.get("code"), Some(&json!(20)));
        assert_eq!(body.as_error(), Some(err));
        assert_eq!(Body::new("read_ok").as_error(), None);
    }

    #[test]
    fn out_of_range_error_codes_are_crashes() {
        let body: Body =
            serde_json::from_value(json!({"type": "error", "code": 65556, "text": "odd"})).expect("decode");
        assert_eq!(body.as_error().expect("error body").code, ErrorCode::Crash);

        let body: Body = serde_json::from_value(json!({"type": "error", "text": "no code"})).expect("decode");
        assert_eq!(body.as_error().expect("error body").code, ErrorCode::Crash);
    }

    #[test]
    fn decode_reports_malformed_request() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Send {
            key: String,
            msg: i64,
        }

        let body = Body::new("send");
        let err = body.decode::<Send>().expect_err("missing fields");
        assert_eq!(err.code, ErrorCode::MalformedRequest);
    }

    #[tokio::test]
    async fn messages_are_line_delimited() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = tokio::io::BufReader::new(reader);
        let mut body = Body::new("echo");
        body.msg_id = Some(1);
        body.fields.insert("echo".into(), json!("hello"));
        let message = Message {
            src: "c1".into(),
            dest: "n1".into(),
            body,
        };

        write_message(&mut writer, &message)
            .await
            .expect("write message");
        write_message(&mut writer, &message)
            .await
            .expect("write message");
        drop(writer);

        let first = read_message::<_, Message>(&mut reader)
            .await
            .expect("read message")
            .expect("expected message");
        let second = read_message::<_, Message>(&mut reader)
            .await
            .expect("read message")
            .expect("expected message");
        assert_eq!(first, message);
        assert_eq!(second, message);
        assert!(read_message::<_, Message>(&mut reader)
            .await
            .expect("clean eof")
            .is_none());
    }
}
