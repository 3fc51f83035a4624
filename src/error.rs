//! Error types for the MADES client.

use crate::operation::Operation;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// MADES client errors.
///
/// Transport failures and contract faults are separate variants: a
/// [`MadesError::Fault`] means the gateway understood the call and refused it,
/// everything else means the call never produced a contract-level answer.
#[derive(Error, Debug)]
pub enum MadesError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Authentication rejected by {url} (HTTP {status})")]
    Authentication { status: u16, url: String },

    #[error("Unexpected HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Service contract error: {0}")]
    Contract(String),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("Invalid SOAP envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Response decoding error: {0}")]
    Decode(String),

    #[error("{0}")]
    Fault(RemoteFault),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MadesError {
    /// The remote fault, if this error carries one.
    pub fn as_fault(&self) -> Option<&RemoteFault> {
        match self {
            Self::Fault(fault) => Some(fault),
            _ => None,
        }
    }

    /// Whether the gateway answered with a contract fault.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }
}

/// A SOAP fault returned by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteFault {
    /// Operation that was being called
    pub operation: Operation,
    /// Fault code (`faultcode` in SOAP 1.1, `Code/Value` in SOAP 1.2)
    pub code: String,
    /// Human-readable reason
    pub reason: String,
    /// Contract-defined error detail, when the fault carries one
    pub detail: Option<OperationError>,
}

impl fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(
                f,
                "{} fault [{}] {} ({})",
                self.operation.as_str(),
                detail.error_code,
                detail.error_message,
                detail.error_id
            ),
            None => write!(
                f,
                "{} fault [{}] {}",
                self.operation.as_str(),
                self.code,
                self.reason
            ),
        }
    }
}

/// Contents of a `*Error` detail element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OperationError {
    pub error_code: String,
    pub error_id: String,
    pub error_message: String,
    /// Operation-specific identifying field (messageID, receiverCode or businessType)
    pub context: Option<FaultContext>,
    pub error_details: String,
}

/// The identifying field echoed back in a `*Error` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaultContext {
    /// Element name, e.g. `receiverCode`
    pub field: String,
    pub value: String,
}
