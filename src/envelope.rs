//! Request envelope construction.

use crate::operation::Operation;
use crate::types::SentMessage;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// SOAP namespace URIs.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

/// Prefix bound to the service namespace in request bodies.
const SERVICE_PREFIX: &str = "mades";

/// SOAP versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoapVersion {
    /// SOAP 1.1 (namespace: http://schemas.xmlsoap.org/soap/envelope/)
    #[serde(rename = "1.1")]
    Soap11,
    /// SOAP 1.2 (namespace: http://www.w3.org/2003/05/soap-envelope)
    #[serde(rename = "1.2")]
    Soap12,
}

impl SoapVersion {
    /// Envelope namespace URI.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Soap11 => SOAP_11_NS,
            Self::Soap12 => SOAP_12_NS,
        }
    }

    /// Content-Type header for a request with the given SOAP action.
    ///
    /// SOAP 1.2 carries the action as a media type parameter; SOAP 1.1 sends it
    /// in a separate `SOAPAction` header (see [`SoapVersion::soap_action_header`]).
    pub fn content_type(&self, action: &str) -> String {
        match self {
            Self::Soap11 => "text/xml; charset=utf-8".to_string(),
            Self::Soap12 if action.is_empty() => "application/soap+xml; charset=utf-8".to_string(),
            Self::Soap12 => format!("application/soap+xml; charset=utf-8; action=\"{}\"", action),
        }
    }

    /// Value of the `SOAPAction` header, SOAP 1.1 only.
    pub fn soap_action_header(&self, action: &str) -> Option<String> {
        match self {
            Self::Soap11 => Some(format!("\"{}\"", action)),
            Self::Soap12 => None,
        }
    }
}

/// A typed request to one of the five operations.
#[derive(Debug, Clone, Copy)]
pub enum Request<'a> {
    ConnectivityTest {
        receiver_code: &'a str,
        business_type: &'a str,
    },
    SendMessage {
        message: &'a SentMessage,
        conversation_id: &'a str,
    },
    CheckMessageStatus {
        message_id: &'a str,
    },
    ReceiveMessage {
        business_type: &'a str,
        download_message: bool,
    },
    ConfirmReceiveMessage {
        message_id: &'a str,
    },
}

impl Request<'_> {
    pub fn operation(&self) -> Operation {
        match self {
            Self::ConnectivityTest { .. } => Operation::ConnectivityTest,
            Self::SendMessage { .. } => Operation::SendMessage,
            Self::CheckMessageStatus { .. } => Operation::CheckMessageStatus,
            Self::ReceiveMessage { .. } => Operation::ReceiveMessage,
            Self::ConfirmReceiveMessage { .. } => Operation::ConfirmReceiveMessage,
        }
    }

    /// Serialize the document/literal body element.
    ///
    /// The wrapper element is always in `namespace`; its children are only
    /// namespace-qualified when the schema says `elementFormDefault="qualified"`.
    pub fn to_body_xml(&self, namespace: &str, qualified: bool) -> String {
        let mut body = BodyWriter::new(self.operation().request_element(), namespace, qualified);

        match *self {
            Self::ConnectivityTest {
                receiver_code,
                business_type,
            } => {
                body.field("receiverCode", receiver_code);
                body.field("businessType", business_type);
            }
            Self::SendMessage {
                message,
                conversation_id,
            } => {
                body.open("message");
                body.field("receiverCode", &message.receiver_code);
                body.field("businessType", &message.business_type);
                body.field("content", &BASE64.encode(&message.content));
                body.field("senderApplication", &message.sender_application);
                body.field("baMessageID", &message.ba_message_id);
                body.close("message");
                body.field("conversationID", conversation_id);
            }
            Self::CheckMessageStatus { message_id } | Self::ConfirmReceiveMessage { message_id } => {
                body.field("messageID", message_id);
            }
            Self::ReceiveMessage {
                business_type,
                download_message,
            } => {
                body.field("businessType", business_type);
                body.field("downloadMessage", if download_message { "true" } else { "false" });
            }
        }

        body.finish()
    }
}

struct BodyWriter {
    element: &'static str,
    qualified: bool,
    out: String,
}

impl BodyWriter {
    fn new(element: &'static str, namespace: &str, qualified: bool) -> Self {
        let out = format!(
            "<{p}:{e} xmlns:{p}=\"{ns}\">",
            p = SERVICE_PREFIX,
            e = element,
            ns = xml_escape(namespace)
        );
        Self {
            element,
            qualified,
            out,
        }
    }

    fn tag(&self, name: &str) -> String {
        if self.qualified {
            format!("{}:{}", SERVICE_PREFIX, name)
        } else {
            name.to_string()
        }
    }

    fn open(&mut self, name: &str) {
        let tag = self.tag(name);
        self.out.push_str(&format!("<{}>", tag));
    }

    fn close(&mut self, name: &str) {
        let tag = self.tag(name);
        self.out.push_str(&format!("</{}>", tag));
    }

    fn field(&mut self, name: &str, value: &str) {
        let tag = self.tag(name);
        self.out
            .push_str(&format!("<{t}>{v}</{t}>", t = tag, v = xml_escape(value)));
    }

    fn finish(mut self) -> String {
        self.out
            .push_str(&format!("</{}:{}>", SERVICE_PREFIX, self.element));
        self.out
    }
}

/// Wrap a body (and optional header blocks) in a SOAP envelope.
pub fn build_envelope(version: SoapVersion, header: Option<&str>, body: &str) -> String {
    let header = header
        .map(|h| format!("\n  <soap:Header>{}</soap:Header>", h))
        .unwrap_or_default();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="{}">{}
  <soap:Body>{}</soap:Body>
</soap:Envelope>"#,
        version.namespace(),
        header,
        body
    )
}

pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
