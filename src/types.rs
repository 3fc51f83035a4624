//! Records exchanged with the gateway.

use crate::error::MadesError;
use crate::parser::XmlNode;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

/// An outbound message (`SentMessage` in the contract).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SentMessage {
    pub receiver_code: String,
    pub business_type: String,
    #[serde(serialize_with = "serialize_base64")]
    pub content: Vec<u8>,
    /// Free-form tag identifying the sending application
    pub sender_application: String,
    /// Business application correlation ID
    pub ba_message_id: String,
}

impl SentMessage {
    /// Create a message; optional fields start out empty.
    pub fn new(
        receiver_code: impl Into<String>,
        business_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            receiver_code: receiver_code.into(),
            business_type: business_type.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_sender_application(mut self, sender_application: impl Into<String>) -> Self {
        self.sender_application = sender_application.into();
        self
    }

    pub fn with_ba_message_id(mut self, ba_message_id: impl Into<String>) -> Self {
        self.ba_message_id = ba_message_id.into();
        self
    }
}

/// Message and trace states reported by the gateway.
///
/// Values outside the known set are kept verbatim in [`MessageState::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageState {
    Accepted,
    Delivering,
    Delivered,
    Received,
    Failed,
    Other(String),
}

/// Trace items use the same vocabulary as message states.
pub type MessageTraceState = MessageState;

impl MessageState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Accepted => "ACCEPTED",
            Self::Delivering => "DELIVERING",
            Self::Delivered => "DELIVERED",
            Self::Received => "RECEIVED",
            Self::Failed => "FAILED",
            Self::Other(s) => s.as_str(),
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "ACCEPTED" => Self::Accepted,
            "DELIVERING" => Self::Delivering,
            "DELIVERED" => Self::Delivered,
            "RECEIVED" => Self::Received,
            "FAILED" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether the gateway will not move the message any further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Received | Self::Failed)
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One state transition recorded by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageTraceItem {
    pub timestamp: Option<DateTime<Utc>>,
    pub state: MessageTraceState,
    pub component: String,
    pub component_description: String,
    pub details: String,
}

/// Result of `CheckMessageStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageStatus {
    pub message_id: String,
    pub state: MessageState,
    pub receiver_code: String,
    pub sender_code: String,
    pub business_type: String,
    pub sender_application: String,
    pub ba_message_id: String,
    pub send_timestamp: Option<DateTime<Utc>>,
    pub receive_timestamp: Option<DateTime<Utc>>,
    pub trace: Vec<MessageTraceItem>,
}

/// An inbound message (`ReceivedMessage` in the contract).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub receiver_code: String,
    pub sender_code: String,
    pub business_type: String,
    /// Empty when the message was fetched without download
    #[serde(serialize_with = "serialize_base64")]
    pub content: Vec<u8>,
    pub sender_application: String,
    pub ba_message_id: String,
}

/// Result of `ReceiveMessage`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReceiveMessageResponse {
    /// `None` when no message was waiting
    pub received_message: Option<ReceivedMessage>,
    pub remaining_messages_count: i64,
}

/// Options for [`crate::MadesService::receive_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Business type filter, `*` matches any
    pub business_type: String,
    /// Fetch the content; `false` returns metadata only
    pub download_message: bool,
    /// Confirm the received message before returning
    pub auto_confirm: bool,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            business_type: "*".to_string(),
            download_message: true,
            auto_confirm: false,
        }
    }
}

impl ReceiveOptions {
    pub fn business_type(mut self, business_type: impl Into<String>) -> Self {
        self.business_type = business_type.into();
        self
    }

    pub fn download_message(mut self, download_message: bool) -> Self {
        self.download_message = download_message;
        self
    }

    pub fn auto_confirm(mut self, auto_confirm: bool) -> Self {
        self.auto_confirm = auto_confirm;
        self
    }
}

fn serialize_base64<S: Serializer>(content: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(content))
}

// Decoding from response elements

fn text(node: &XmlNode, name: &str) -> String {
    node.child_text(name).unwrap_or_default().to_string()
}

fn required_text(node: &XmlNode, name: &str) -> Result<String, MadesError> {
    node.child_text(name)
        .map(str::to_string)
        .ok_or_else(|| MadesError::Decode(format!("{} is missing {}", node.name, name)))
}

/// Parse an `xsd:dateTime`. Values without an offset are taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, MadesError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| MadesError::Decode(format!("Invalid timestamp: {}", value)))
}

fn optional_timestamp(node: &XmlNode, name: &str) -> Result<Option<DateTime<Utc>>, MadesError> {
    match node.child(name) {
        Some(child) if !child.is_nil() && !child.text.trim().is_empty() => {
            parse_timestamp(&child.text).map(Some)
        }
        _ => Ok(None),
    }
}

fn decode_base64(value: &str) -> Result<Vec<u8>, MadesError> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(compact)
        .map_err(|e| MadesError::Decode(format!("Invalid base64 content: {}", e)))
}

impl MessageTraceItem {
    pub(crate) fn from_node(node: &XmlNode) -> Result<Self, MadesError> {
        Ok(Self {
            timestamp: optional_timestamp(node, "timestamp")?,
            state: MessageState::parse(&text(node, "state")),
            component: text(node, "component"),
            component_description: text(node, "componentDescription"),
            details: text(node, "details"),
        })
    }
}

impl MessageStatus {
    pub(crate) fn from_node(node: &XmlNode) -> Result<Self, MadesError> {
        // MessageTrace wraps a sequence of items that are also named `trace`
        let trace = match node.child("trace") {
            Some(wrapper) => wrapper
                .children_named("trace")
                .map(MessageTraceItem::from_node)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            message_id: required_text(node, "messageID")?,
            state: MessageState::parse(&required_text(node, "state")?),
            receiver_code: text(node, "receiverCode"),
            sender_code: text(node, "senderCode"),
            business_type: text(node, "businessType"),
            sender_application: text(node, "senderApplication"),
            ba_message_id: text(node, "baMessageID"),
            send_timestamp: optional_timestamp(node, "sendTimestamp")?,
            receive_timestamp: optional_timestamp(node, "receiveTimestamp")?,
            trace,
        })
    }
}

impl ReceivedMessage {
    pub(crate) fn from_node(node: &XmlNode) -> Result<Self, MadesError> {
        let content = match node.child("content") {
            Some(c) if !c.is_nil() => decode_base64(&c.text)?,
            _ => Vec::new(),
        };

        Ok(Self {
            message_id: required_text(node, "messageID")?,
            receiver_code: text(node, "receiverCode"),
            sender_code: text(node, "senderCode"),
            business_type: text(node, "businessType"),
            content,
            sender_application: text(node, "senderApplication"),
            ba_message_id: text(node, "baMessageID"),
        })
    }
}

impl ReceiveMessageResponse {
    pub(crate) fn from_node(node: &XmlNode) -> Result<Self, MadesError> {
        // An empty queue comes back as a missing, nil or ID-less receivedMessage
        let received_message = match node.child("receivedMessage") {
            Some(m)
                if !m.is_nil()
                    && m
                        .child_text("messageID")
                        .is_some_and(|id| !id.trim().is_empty()) =>
            {
                Some(ReceivedMessage::from_node(m)?)
            }
            _ => None,
        };

        let remaining_messages_count = match node.child_text("remainingMessagesCount") {
            Some(count) if !count.trim().is_empty() => count.trim().parse().map_err(|_| {
                MadesError::Decode(format!("Invalid remainingMessagesCount: {}", count))
            })?,
            _ => 0,
        };

        Ok(Self {
            received_message,
            remaining_messages_count,
        })
    }
}

/// Extract the `messageID` returned by ConnectivityTest, SendMessage and
/// ConfirmReceiveMessage.
pub(crate) fn message_id_from_node(node: &XmlNode) -> Result<String, MadesError> {
    let id = required_text(node, "messageID")?;
    if id.trim().is_empty() {
        return Err(MadesError::Decode(format!("{} has an empty messageID", node.name)));
    }
    Ok(id)
}
