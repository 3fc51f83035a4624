//! Capture of the last request/response pair for debugging.

use crate::parser::{pretty_print, redact_passwords};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, AUTHORIZATION, PROXY_AUTHORIZATION};
use std::fmt::Write;

/// One captured HTTP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedMessage {
    /// Header name/value pairs in send order; credentials redacted
    pub http_headers: Vec<(String, String)>,
    /// SOAP envelope; password elements are masked on the sent side
    pub envelope: String,
}

impl CapturedMessage {
    pub(crate) fn new(headers: &HeaderMap, envelope: impl Into<String>) -> Self {
        let http_headers = headers
            .iter()
            .map(|(name, value)| {
                let value = if *name == AUTHORIZATION || *name == PROXY_AUTHORIZATION {
                    "[REDACTED]".to_string()
                } else {
                    String::from_utf8_lossy(value.as_bytes()).into_owned()
                };
                (name.as_str().to_string(), value)
            })
            .collect();

        Self {
            http_headers,
            envelope: envelope.into(),
        }
    }

    /// Capture an outgoing request, masking WS-Security passwords.
    pub(crate) fn outgoing(headers: &HeaderMap, envelope: &str) -> Self {
        Self::new(headers, redact_passwords(envelope))
    }
}

/// The most recent exchange. Holds at most one request and one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeTrace {
    pub last_sent: Option<CapturedMessage>,
    pub last_received: Option<CapturedMessage>,
}

impl ExchangeTrace {
    pub fn is_empty(&self) -> bool {
        self.last_sent.is_none() && self.last_received.is_none()
    }

    /// Render headers and pretty-printed envelopes of both sides.
    pub fn render(&self) -> String {
        let rule = "-".repeat(50);
        let mut out = String::new();
        let _ = writeln!(out, "{}", rule);

        for (label, message) in [("SENT", &self.last_sent), ("RECEIVED", &self.last_received)] {
            let Some(message) = message else {
                continue;
            };

            let _ = writeln!(out, "### {} HTTP HEADER ###\n", label);
            for (name, value) in &message.http_headers {
                let _ = writeln!(out, "{}: {}", name, value);
            }
            let _ = writeln!(out, "\n### {} HTTP ENVELOPE START ###\n", label);
            let _ = writeln!(out, "{}", pretty_print(&message.envelope));
            let _ = writeln!(out, "### {} HTTP ENVELOPE END ###\n", label);
        }

        let _ = writeln!(out, "{}", rule);
        out
    }
}

/// Single-slot recorder attached to a client when debugging is enabled.
#[derive(Debug, Default)]
pub(crate) struct ExchangeHistory {
    slot: Mutex<ExchangeTrace>,
}

impl ExchangeHistory {
    /// Replace the previous exchange with a complete request/response pair.
    ///
    /// `received` is `None` when the transport failed before a response.
    pub fn record(&self, sent: CapturedMessage, received: Option<CapturedMessage>) {
        *self.slot.lock() = ExchangeTrace {
            last_sent: Some(sent),
            last_received: received,
        };
    }

    pub fn snapshot(&self) -> ExchangeTrace {
        self.slot.lock().clone()
    }
}
