//! Client for the ENTSO-E MADES gateway web service
//!
//! Talks to the `madesInWSInterface` SOAP endpoint of an ECP/EDX node:
//! authenticates an HTTP session, binds to the service contract and exposes
//! the five gateway operations as typed async calls.
//!
//! # Features
//!
//! - Basic auth, custom transport auth and WS-Security UsernameToken
//! - SOAP 1.1 and 1.2 bindings, resolved from the published WSDL
//! - Typed remote faults (`*Error` detail elements)
//! - Auto-confirm on receive
//! - Optional capture of the last raw exchange for debugging
//!
//! # Example
//!
//! ```ignore
//! use mades_client::{MadesClient, MadesService, ReceiveOptions, SentMessage};
//!
//! let client = MadesClient::builder("https://ecp.example.org")
//!     .credentials("ecp-user", "ecp-pass")
//!     .debug(true)
//!     .connect()
//!     .await?;
//!
//! let id = client
//!     .send_message(&SentMessage::new("10X1001A1001A450", "A01", b"<doc/>".to_vec()), None)
//!     .await?;
//! let status = client.check_message_status(&id).await?;
//!
//! let inbox = client
//!     .receive_message(&ReceiveOptions::default().auto_confirm(true))
//!     .await?;
//! client.print_last_exchange();
//! ```

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod history;
pub mod operation;
pub mod parser;
pub mod security;
pub mod types;
pub mod wsdl;

pub use client::{MadesClient, MadesClientBuilder, MadesService};
pub use config::{MadesClientConfig, TlsVerification};
pub use envelope::SoapVersion;
pub use error::{FaultContext, MadesError, OperationError, RemoteFault};
pub use history::{CapturedMessage, ExchangeTrace};
pub use operation::Operation;
pub use security::{BasicAuth, SecurityTokenProvider, TransportAuth, UsernameTokenProvider};
pub use types::{
    MessageState, MessageStatus, MessageTraceItem, MessageTraceState, ReceiveMessageResponse,
    ReceiveOptions, ReceivedMessage, SentMessage,
};
pub use wsdl::{QualifiedName, ServiceBinding};
