//! MADES gateway client.
//!
//! [`MadesClient`] owns one HTTP session and one resolved [`ServiceBinding`]
//! for its whole lifetime. Calls are dispatched through the [`MadesService`]
//! trait so callers can substitute a mock.

use crate::config::{MadesClientConfig, TlsVerification};
use crate::envelope::{build_envelope, Request};
use crate::error::MadesError;
use crate::history::{CapturedMessage, ExchangeHistory, ExchangeTrace};
use crate::operation::Operation;
use crate::parser::{parse_fault, parse_soap_envelope, XmlNode};
use crate::security::{AuthSetup, BasicAuth, SecurityTokenProvider, TransportAuth};
use crate::types::{
    message_id_from_node, MessageStatus, ReceiveMessageResponse, ReceiveOptions, SentMessage,
};
use crate::wsdl::{ServiceBinding, ServiceContract};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use secrecy::Secret;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// The five operations of the MADES endpoint.
#[async_trait]
pub trait MadesService: Send + Sync {
    /// Probe the path to `receiver_code`. Returns the ID of the test message.
    async fn connectivity_test(
        &self,
        receiver_code: &str,
        business_type: &str,
    ) -> Result<String, MadesError>;

    /// Upload a message. A missing conversation ID is sent as an empty string.
    async fn send_message(
        &self,
        message: &SentMessage,
        conversation_id: Option<&str>,
    ) -> Result<String, MadesError>;

    async fn check_message_status(&self, message_id: &str) -> Result<MessageStatus, MadesError>;

    /// A single `ReceiveMessage` call, without confirmation.
    async fn fetch_message(
        &self,
        business_type: &str,
        download_message: bool,
    ) -> Result<ReceiveMessageResponse, MadesError>;

    /// Acknowledge a received message so the gateway stops redelivering it.
    async fn confirm_received_message(&self, message_id: &str) -> Result<String, MadesError>;

    /// Receive the next message, confirming it first when `auto_confirm` is set.
    ///
    /// An empty queue is not an error and is never confirmed. A failed
    /// confirmation fails the whole call.
    async fn receive_message(
        &self,
        options: &ReceiveOptions,
    ) -> Result<ReceiveMessageResponse, MadesError> {
        let response = self
            .fetch_message(&options.business_type, options.download_message)
            .await?;

        if options.auto_confirm {
            if let Some(message) = &response.received_message {
                self.confirm_received_message(&message.message_id).await?;
            }
        }

        Ok(response)
    }
}

/// Builder for [`MadesClient`].
///
/// Configuration comes from a [`MadesClientConfig`]; authentication plug-ins
/// that cannot be expressed in a config file are set here.
#[derive(Debug)]
pub struct MadesClientBuilder {
    config: MadesClientConfig,
    timeout: Option<Duration>,
    transport_auth: Option<Arc<dyn TransportAuth>>,
    security: Option<Arc<dyn SecurityTokenProvider>>,
}

impl MadesClientBuilder {
    pub fn new(server: impl Into<String>) -> Self {
        Self::from_config(MadesClientConfig::new(server))
    }

    pub fn from_config(config: MadesClientConfig) -> Self {
        Self {
            timeout: config.timeout(),
            config,
            transport_auth: None,
            security: None,
        }
    }

    /// Basic auth credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(Secret::new(password.into()));
        self
    }

    /// Record the last exchange for [`MadesClient::print_last_exchange`].
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn tls_verification(mut self, tls_verify: TlsVerification) -> Self {
        self.config.tls_verify = tls_verify;
        self
    }

    pub fn preemptive_auth(mut self, preemptive_auth: bool) -> Self {
        self.config.preemptive_auth = preemptive_auth;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Custom transport authentication; replaces basic auth.
    pub fn transport_auth(mut self, auth: Arc<dyn TransportAuth>) -> Self {
        self.transport_auth = Some(auth);
        self
    }

    /// Message-level security header provider.
    pub fn security_token_provider(mut self, provider: Arc<dyn SecurityTokenProvider>) -> Self {
        self.security = Some(provider);
        self
    }

    /// Open the session, fetch the contract and bind to it.
    pub async fn connect(self) -> Result<MadesClient, MadesError> {
        let config = self.config;
        let server = config.validate()?;
        let wsdl_url = config.wsdl_url()?;
        let endpoint = config.endpoint_url()?;
        let binding_name = config.service.binding_name()?;

        let http = build_http_client(&config, self.timeout).await?;
        let auth = AuthSetup::resolve(&config, self.transport_auth, self.security);

        if config.preemptive_auth && auth.transport.is_some() {
            let response = auth.apply(http.get(wsdl_url.clone())).send().await?;
            debug!(
                url = %wsdl_url,
                status = %response.status(),
                "Preemptive authentication round trip"
            );
        }

        let response = auth.apply(http.get(wsdl_url.clone())).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &wsdl_url));
        }
        let wsdl = response.bytes().await?;
        let contract = ServiceContract::parse(&wsdl)?;
        let binding = contract.bind(&binding_name, endpoint)?;

        info!(
            server = %server,
            endpoint = %binding.endpoint(),
            binding = %binding_name,
            soap_version = ?binding.version(),
            transport_auth = auth.transport.is_some(),
            message_security = auth.message.is_some(),
            debug = config.debug,
            "MADES client ready"
        );

        Ok(MadesClient {
            http,
            binding,
            auth,
            history: config.debug.then(ExchangeHistory::default),
        })
    }
}

async fn build_http_client(
    config: &MadesClientConfig,
    timeout: Option<Duration>,
) -> Result<Client, MadesError> {
    let mut builder = Client::builder()
        .cookie_store(true)
        .user_agent(config.user_agent.clone());

    match &config.tls_verify {
        TlsVerification::Enabled(true) => {}
        TlsVerification::Enabled(false) => {
            warn!(server = %config.server, "TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        TlsVerification::TrustAnchor(path) => {
            let pem = tokio::fs::read(path).await.map_err(|e| {
                MadesError::Config(format!("cannot read trust anchor {}: {}", path.display(), e))
            })?;
            let certificates = reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| {
                MadesError::Config(format!("invalid trust anchor {}: {}", path.display(), e))
            })?;
            if certificates.is_empty() {
                return Err(MadesError::Config(format!(
                    "trust anchor {} contains no certificates",
                    path.display()
                )));
            }

            // Only the configured anchors are trusted
            builder = builder.tls_built_in_root_certs(false);
            for certificate in certificates {
                builder = builder.add_root_certificate(certificate);
            }
        }
    }

    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }

    Ok(builder.build()?)
}

fn status_error(status: StatusCode, url: &Url) -> MadesError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        MadesError::Authentication {
            status: status.as_u16(),
            url: url.to_string(),
        }
    } else {
        MadesError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        }
    }
}

/// Turn an HTTP response into the operation's response element.
///
/// A SOAP fault wins over the HTTP status, since gateways send faults with
/// 4xx/5xx codes. A non-SOAP body is reported by status when the status is an
/// error, otherwise as a parse error.
fn decode_response(
    operation: Operation,
    status: StatusCode,
    url: &Url,
    body: &[u8],
) -> Result<XmlNode, MadesError> {
    let envelope = match parse_soap_envelope(body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => return Err(status_error(status, url)),
        Err(e) => return Err(e),
    };

    if let Some(fault) = envelope.fault() {
        let fault = parse_fault(operation, envelope.version, fault);
        warn!(
            operation = operation.as_str(),
            code = %fault.code,
            reason = %fault.reason,
            "Gateway returned SOAP fault"
        );
        return Err(MadesError::Fault(fault));
    }

    if !status.is_success() {
        return Err(status_error(status, url));
    }

    let payload = envelope.body.children.into_iter().next().ok_or_else(|| {
        MadesError::Decode(format!("{} response has an empty body", operation.as_str()))
    })?;

    if payload.name != operation.response_element() {
        return Err(MadesError::Decode(format!(
            "expected {}, got {}",
            operation.response_element(),
            payload.name
        )));
    }

    Ok(payload)
}

/// Client for the MADES `madesInWSInterface` endpoint.
#[derive(Debug)]
pub struct MadesClient {
    http: Client,
    binding: ServiceBinding,
    auth: AuthSetup,
    /// Present only when debugging is enabled
    history: Option<ExchangeHistory>,
}

impl MadesClient {
    pub fn builder(server: impl Into<String>) -> MadesClientBuilder {
        MadesClientBuilder::new(server)
    }

    /// Connect using a configuration, without auth plug-ins.
    pub async fn connect(config: MadesClientConfig) -> Result<Self, MadesError> {
        MadesClientBuilder::from_config(config).connect().await
    }

    /// Connect with basic auth, the way most gateways are set up.
    pub async fn connect_basic(
        server: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, MadesError> {
        Self::builder(server)
            .transport_auth(Arc::new(BasicAuth::new(
                username,
                Some(Secret::new(password.into())),
            )))
            .connect()
            .await
    }

    pub fn binding(&self) -> &ServiceBinding {
        &self.binding
    }

    pub fn debug_enabled(&self) -> bool {
        self.history.is_some()
    }

    /// The last captured exchange, `None` when debugging is disabled.
    pub fn last_exchange(&self) -> Option<ExchangeTrace> {
        self.history.as_ref().map(ExchangeHistory::snapshot)
    }

    /// The last exchange rendered as text. Logs a warning and returns `None`
    /// when debugging is disabled.
    pub fn render_last_exchange(&self) -> Option<String> {
        match &self.history {
            Some(history) => Some(history.snapshot().render()),
            None => {
                warn!("debug mode must be enabled to inspect the last message exchange");
                None
            }
        }
    }

    /// Print the last sent and received SOAP messages to stdout.
    pub fn print_last_exchange(&self) {
        if let Some(rendered) = self.render_last_exchange() {
            print!("{}", rendered);
        }
    }

    async fn call(&self, request: Request<'_>) -> Result<XmlNode, MadesError> {
        let operation = request.operation();
        let version = self.binding.version();
        let action = self.binding.action(operation);
        let endpoint = self.binding.endpoint();

        let body = request.to_body_xml(self.binding.namespace(), self.binding.qualified());
        let header = self.auth.security_header()?;
        let envelope = build_envelope(version, header.as_deref(), &body);

        let mut builder = self
            .http
            .post(endpoint.clone())
            .header(CONTENT_TYPE, version.content_type(action));
        if let Some(soap_action) = version.soap_action_header(action) {
            builder = builder.header("SOAPAction", soap_action);
        }
        let http_request = self.auth.apply(builder).body(envelope.clone()).build()?;

        let sent = self
            .history
            .as_ref()
            .map(|_| CapturedMessage::outgoing(http_request.headers(), &envelope));

        debug!(
            operation = operation.as_str(),
            endpoint = %endpoint,
            "Sending SOAP request"
        );

        let exchange = self.exchange(http_request).await;

        if let (Some(history), Some(sent)) = (&self.history, sent) {
            let received = exchange
                .as_ref()
                .ok()
                .map(|(_, headers, bytes)| CapturedMessage::new(headers, String::from_utf8_lossy(bytes)));
            history.record(sent, received);
        }

        let (status, _, bytes) = exchange?;

        debug!(
            operation = operation.as_str(),
            status = %status,
            bytes = bytes.len(),
            "SOAP response received"
        );

        decode_response(operation, status, endpoint, &bytes)
    }

    /// One HTTP round trip, returning status, headers and the full body.
    async fn exchange(
        &self,
        request: reqwest::Request,
    ) -> Result<(StatusCode, HeaderMap, Vec<u8>), MadesError> {
        let response = self.http.execute(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok((status, headers, body.to_vec()))
    }
}

#[async_trait]
impl MadesService for MadesClient {
    async fn connectivity_test(
        &self,
        receiver_code: &str,
        business_type: &str,
    ) -> Result<String, MadesError> {
        let response = self
            .call(Request::ConnectivityTest {
                receiver_code,
                business_type,
            })
            .await?;
        message_id_from_node(&response)
    }

    async fn send_message(
        &self,
        message: &SentMessage,
        conversation_id: Option<&str>,
    ) -> Result<String, MadesError> {
        let response = self
            .call(Request::SendMessage {
                message,
                conversation_id: conversation_id.unwrap_or_default(),
            })
            .await?;
        message_id_from_node(&response)
    }

    async fn check_message_status(&self, message_id: &str) -> Result<MessageStatus, MadesError> {
        let response = self.call(Request::CheckMessageStatus { message_id }).await?;
        let status = response
            .child("messageStatus")
            .ok_or_else(|| MadesError::Decode("response has no messageStatus".to_string()))?;
        MessageStatus::from_node(status)
    }

    async fn fetch_message(
        &self,
        business_type: &str,
        download_message: bool,
    ) -> Result<ReceiveMessageResponse, MadesError> {
        let response = self
            .call(Request::ReceiveMessage {
                business_type,
                download_message,
            })
            .await?;
        ReceiveMessageResponse::from_node(&response)
    }

    async fn confirm_received_message(&self, message_id: &str) -> Result<String, MadesError> {
        let response = self
            .call(Request::ConfirmReceiveMessage { message_id })
            .await?;
        message_id_from_node(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReceivedMessage;
    use parking_lot::Mutex;

    fn url() -> Url {
        Url::parse("https://ecp.example.org/ws/madesInWSInterface").unwrap()
    }

    const OK_RESPONSE: &str = r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope"><env:Body>
<ns2:ConfirmReceiveMessageResponse xmlns:ns2="http://mades.entsoe.eu/"><messageID>m-1</messageID></ns2:ConfirmReceiveMessageResponse>
</env:Body></env:Envelope>"#;

    const FAULT_RESPONSE: &str = r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope"><env:Body><env:Fault>
<env:Code><env:Value>env:Receiver</env:Value></env:Code><env:Reason><env:Text>Unknown message</env:Text></env:Reason>
<env:Detail><ns2:ConfirmReceiveMessageError xmlns:ns2="http://mades.entsoe.eu/"><errorCode>NOT_FOUND</errorCode>
<errorID>1</errorID><errorMessage>Unknown message</errorMessage><messageID>m-1</messageID><errorDetails/></ns2:ConfirmReceiveMessageError></env:Detail>
</env:Fault></env:Body></env:Envelope>"#;

    #[test]
    fn test_decode_success() {
        let node =
            decode_response(Operation::ConfirmReceiveMessage, StatusCode::OK, &url(), OK_RESPONSE.as_bytes())
                .unwrap();
        assert_eq!(node.name, "ConfirmReceiveMessageResponse");
        assert_eq!(message_id_from_node(&node).unwrap(), "m-1");
    }

    #[test]
    fn test_decode_fault_wins_over_status() {
        let err = decode_response(
            Operation::ConfirmReceiveMessage,
            StatusCode::INTERNAL_SERVER_ERROR,
            &url(),
            FAULT_RESPONSE.as_bytes(),
        )
        .unwrap_err();
        let fault = err.as_fault().unwrap();
        assert_eq!(fault.operation, Operation::ConfirmReceiveMessage);
        assert_eq!(fault.detail.as_ref().unwrap().error_code, "NOT_FOUND");
    }

    #[test]
    fn test_decode_fault_with_html_details() {
        let body = FAULT_RESPONSE.replace(
            "<errorDetails/>",
            "<errorDetails><![CDATA[<!DOCTYPE html><html><body>Bad Gateway</body></html>]]></errorDetails>",
        );
        let err = decode_response(
            Operation::ConfirmReceiveMessage,
            StatusCode::INTERNAL_SERVER_ERROR,
            &url(),
            body.as_bytes(),
        )
        .unwrap_err();
        let detail = err.as_fault().unwrap().detail.clone().unwrap();
        assert_eq!(detail.error_code, "NOT_FOUND");
        assert!(detail.error_details.contains("Bad Gateway"));
    }

    #[tokio::test]
    async fn test_unreadable_trust_anchor() {
        let dir = tempfile::tempdir().unwrap();
        let config = MadesClientConfig {
            tls_verify: TlsVerification::TrustAnchor(dir.path().join("missing.pem")),
            ..MadesClientConfig::new("https://ecp.example.org")
        };
        let err = build_http_client(&config, None).await.unwrap_err();
        assert!(matches!(err, MadesError::Config(_)));
    }

    #[tokio::test]
    async fn test_trust_anchor_without_certificates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca.pem");
        std::fs::write(&path, "not a certificate\n").unwrap();
        let config = MadesClientConfig {
            tls_verify: TlsVerification::TrustAnchor(path),
            ..MadesClientConfig::new("https://ecp.example.org")
        };
        let err = build_http_client(&config, None).await.unwrap_err();
        assert!(matches!(err, MadesError::Config(_)));
    }

    #[tokio::test]
    async fn test_trust_anchor_with_malformed_pem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca.pem");
        std::fs::write(
            &path,
            "-----BEGIN CERTIFICATE-----\n!!!!not base64!!!!\n-----END CERTIFICATE-----\n",
        )
        .unwrap();
        let config = MadesClientConfig {
            tls_verify: TlsVerification::TrustAnchor(path),
            ..MadesClientConfig::new("https://ecp.example.org")
        };
        let err = build_http_client(&config, None).await.unwrap_err();
        assert!(matches!(err, MadesError::Config(_)));
    }

    #[test]
    fn test_decode_non_soap_error_status() {
        let err = decode_response(Operation::SendMessage, StatusCode::UNAUTHORIZED, &url(), b"denied")
            .unwrap_err();
        assert!(matches!(err, MadesError::Authentication { status: 401, .. }));

        let err = decode_response(Operation::SendMessage, StatusCode::BAD_GATEWAY, &url(), b"<html/>")
            .unwrap_err();
        assert!(matches!(err, MadesError::HttpStatus { status: 502, .. }));
    }

    #[test]
    fn test_decode_non_soap_success_status() {
        let err = decode_response(Operation::SendMessage, StatusCode::OK, &url(), b"<html/>").unwrap_err();
        assert!(matches!(err, MadesError::InvalidEnvelope(_)));
    }

    #[test]
    fn test_decode_wrong_response_element() {
        let err = decode_response(Operation::SendMessage, StatusCode::OK, &url(), OK_RESPONSE.as_bytes())
            .unwrap_err();
        assert!(matches!(err, MadesError::Decode(_)));
    }

    /// In-memory service that records confirmations.
    #[derive(Default)]
    struct MockService {
        inbox: Option<ReceivedMessage>,
        fail_confirm: bool,
        confirmed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MadesService for MockService {
        async fn connectivity_test(&self, _: &str, _: &str) -> Result<String, MadesError> {
            Ok("ct-mock".to_string())
        }

        async fn send_message(&self, _: &SentMessage, _: Option<&str>) -> Result<String, MadesError> {
            Ok("sent".to_string())
        }

        async fn check_message_status(&self, _: &str) -> Result<MessageStatus, MadesError> {
            Err(MadesError::Decode("not used".to_string()))
        }

        async fn fetch_message(&self, _: &str, _: bool) -> Result<ReceiveMessageResponse, MadesError> {
            Ok(ReceiveMessageResponse {
                received_message: self.inbox.clone(),
                remaining_messages_count: 0,
            })
        }

        async fn confirm_received_message(&self, message_id: &str) -> Result<String, MadesError> {
            if self.fail_confirm {
                return Err(MadesError::Decode("confirm failed".to_string()));
            }
            self.confirmed.lock().push(message_id.to_string());
            Ok(message_id.to_string())
        }
    }

    fn inbox_message() -> ReceivedMessage {
        ReceivedMessage {
            message_id: "in-1".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_auto_confirm_confirms_received_message() {
        let service = MockService {
            inbox: Some(inbox_message()),
            ..Default::default()
        };
        let response = service
            .receive_message(&ReceiveOptions::default().auto_confirm(true))
            .await
            .unwrap();
        assert_eq!(response.received_message.unwrap().message_id, "in-1");
        assert_eq!(*service.confirmed.lock(), vec!["in-1".to_string()]);
    }

    #[tokio::test]
    async fn test_auto_confirm_skips_empty_queue() {
        let service = MockService::default();
        let response = service
            .receive_message(&ReceiveOptions::default().auto_confirm(true))
            .await
            .unwrap();
        assert!(response.received_message.is_none());
        assert!(service.confirmed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_no_confirm_without_flag() {
        let service = MockService {
            inbox: Some(inbox_message()),
            ..Default::default()
        };
        service.receive_message(&ReceiveOptions::default()).await.unwrap();
        assert!(service.confirmed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_auto_confirm_failure_propagates() {
        let service = MockService {
            inbox: Some(inbox_message()),
            fail_confirm: true,
            ..Default::default()
        };
        let result = service
            .receive_message(&ReceiveOptions::default().auto_confirm(true))
            .await;
        assert!(matches!(result, Err(MadesError::Decode(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_server() {
        let result = MadesClientBuilder::new("").connect().await;
        assert!(matches!(result, Err(MadesError::Config(_))));
    }
}
