//! The five operations of the MADES endpoint contract.

use serde::{Deserialize, Serialize};

/// Remote operations exposed by `madesInWSInterface`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Liveness check towards a receiver
    ConnectivityTest,
    /// Upload a message for delivery
    SendMessage,
    /// Read the state and trace of a sent message
    CheckMessageStatus,
    /// Fetch the next inbound message
    ReceiveMessage,
    /// Acknowledge an inbound message
    ConfirmReceiveMessage,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Self::ConnectivityTest,
        Self::SendMessage,
        Self::CheckMessageStatus,
        Self::ReceiveMessage,
        Self::ConfirmReceiveMessage,
    ];

    /// Operation name as it appears in the WSDL.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectivityTest => "ConnectivityTest",
            Self::SendMessage => "SendMessage",
            Self::CheckMessageStatus => "CheckMessageStatus",
            Self::ReceiveMessage => "ReceiveMessage",
            Self::ConfirmReceiveMessage => "ConfirmReceiveMessage",
        }
    }

    /// Look up an operation by its WSDL name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }

    /// Body wrapper element of the request.
    pub fn request_element(&self) -> &'static str {
        match self {
            Self::ConnectivityTest => "ConnectivityTestRequest",
            Self::SendMessage => "SendMessageRequest",
            Self::CheckMessageStatus => "CheckMessageStatusRequest",
            Self::ReceiveMessage => "ReceiveMessageRequest",
            Self::ConfirmReceiveMessage => "ConfirmReceiveMessageRequest",
        }
    }

    /// Body wrapper element of a successful response.
    pub fn response_element(&self) -> &'static str {
        match self {
            Self::ConnectivityTest => "ConnectivityTestResponse",
            Self::SendMessage => "SendMessageResponse",
            Self::CheckMessageStatus => "CheckMessageStatusResponse",
            Self::ReceiveMessage => "ReceiveMessageResponse",
            Self::ConfirmReceiveMessage => "ConfirmReceiveMessageResponse",
        }
    }

    /// Fault detail element.
    pub fn error_element(&self) -> &'static str {
        match self {
            Self::ConnectivityTest => "ConnectivityTestError",
            Self::SendMessage => "SendMessageError",
            Self::CheckMessageStatus => "CheckMessageStatusError",
            Self::ReceiveMessage => "ReceiveMessageError",
            Self::ConfirmReceiveMessage => "ConfirmReceiveMessageError",
        }
    }

    /// Identifying field carried by this operation's error element.
    pub fn fault_context_field(&self) -> &'static str {
        match self {
            Self::ConnectivityTest | Self::SendMessage => "receiverCode",
            Self::CheckMessageStatus | Self::ConfirmReceiveMessage => "messageID",
            Self::ReceiveMessage => "businessType",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::ConnectivityTest.as_str(), "ConnectivityTest");
        assert_eq!(
            Operation::ConfirmReceiveMessage.request_element(),
            "ConfirmReceiveMessageRequest"
        );
        assert_eq!(
            Operation::CheckMessageStatus.response_element(),
            "CheckMessageStatusResponse"
        );
        assert_eq!(Operation::ReceiveMessage.error_element(), "ReceiveMessageError");
    }

    #[test]
    fn test_from_name() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_name(op.as_str()), Some(op));
        }
        assert_eq!(Operation::from_name("ConfirmReceivedMessage"), None);
    }

    #[test]
    fn test_fault_context_fields() {
        assert_eq!(Operation::SendMessage.fault_context_field(), "receiverCode");
        assert_eq!(Operation::ReceiveMessage.fault_context_field(), "businessType");
        assert_eq!(Operation::CheckMessageStatus.fault_context_field(), "messageID");
    }
}
