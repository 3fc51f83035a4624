//! Transport authentication and message-level (WS-Security) tokens.
//!
//! Precedence is resolved once, when the client is built: a custom
//! [`TransportAuth`] replaces basic auth; a [`SecurityTokenProvider`] is
//! independent of both and adds a SOAP header to every call.

use crate::config::{MadesClientConfig, UsernameTokenConfig};
use crate::envelope::xml_escape;
use crate::error::MadesError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{Duration, SecondsFormat, Utc};
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, Secret};
use std::fmt;
use std::sync::Arc;

pub const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const WSU_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
const PASSWORD_TEXT: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";
const BASE64_ENCODING: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

/// Decorates every outgoing HTTP request with transport-level credentials.
pub trait TransportAuth: Send + Sync + fmt::Debug {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder;
}

/// HTTP basic authentication.
#[derive(Clone)]
pub struct BasicAuth {
    username: String,
    password: Option<Secret<String>>,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: Option<Secret<String>>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl TransportAuth for BasicAuth {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(
            &self.username,
            self.password.as_ref().map(|p| p.expose_secret()),
        )
    }
}

/// Produces the SOAP header block attached to each request.
pub trait SecurityTokenProvider: Send + Sync + fmt::Debug {
    /// Serialized header element(s), placed verbatim inside `soap:Header`.
    fn security_header(&self) -> Result<String, MadesError>;
}

/// WS-Security UsernameToken (PasswordText) with an optional Timestamp.
#[derive(Clone)]
pub struct UsernameTokenProvider {
    username: String,
    password: Secret<String>,
    timestamp_ttl: Option<Duration>,
}

impl UsernameTokenProvider {
    pub fn new(username: impl Into<String>, password: Secret<String>) -> Self {
        Self {
            username: username.into(),
            password,
            timestamp_ttl: None,
        }
    }

    /// Add a `wsu:Timestamp` that expires `ttl` after creation.
    pub fn with_timestamp(mut self, ttl: Duration) -> Self {
        self.timestamp_ttl = Some(ttl);
        self
    }

    pub fn from_config(config: &UsernameTokenConfig) -> Self {
        let provider = Self::new(config.username.clone(), config.password.clone());
        match config.timestamp_ttl_secs {
            Some(secs) => provider.with_timestamp(Duration::seconds(secs as i64)),
            None => provider,
        }
    }
}

impl fmt::Debug for UsernameTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsernameTokenProvider")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("timestamp_ttl", &self.timestamp_ttl)
            .finish()
    }
}

impl SecurityTokenProvider for UsernameTokenProvider {
    fn security_header(&self) -> Result<String, MadesError> {
        let now = Utc::now();
        let created = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let nonce = BASE64.encode(uuid::Uuid::new_v4().as_bytes());

        let timestamp = match self.timestamp_ttl {
            Some(ttl) => {
                let expires = (now + ttl).to_rfc3339_opts(SecondsFormat::Millis, true);
                format!(
                    "<wsu:Timestamp wsu:Id=\"TS-{id}\"><wsu:Created>{c}</wsu:Created><wsu:Expires>{e}</wsu:Expires></wsu:Timestamp>",
                    id = uuid::Uuid::new_v4().simple(),
                    c = created,
                    e = expires
                )
            }
            None => String::new(),
        };

        Ok(format!(
            "<wsse:Security xmlns:wsse=\"{wsse}\" xmlns:wsu=\"{wsu}\">{ts}\
             <wsse:UsernameToken wsu:Id=\"UT-{id}\">\
             <wsse:Username>{user}</wsse:Username>\
             <wsse:Password Type=\"{ptype}\">{pass}</wsse:Password>\
             <wsse:Nonce EncodingType=\"{enc}\">{nonce}</wsse:Nonce>\
             <wsu:Created>{created}</wsu:Created>\
             </wsse:UsernameToken></wsse:Security>",
            wsse = WSSE_NS,
            wsu = WSU_NS,
            ts = timestamp,
            id = uuid::Uuid::new_v4().simple(),
            user = xml_escape(&self.username),
            ptype = PASSWORD_TEXT,
            pass = xml_escape(self.password.expose_secret()),
            enc = BASE64_ENCODING,
            nonce = nonce,
            created = created,
        ))
    }
}

/// Authentication resolved for one client instance.
#[derive(Debug, Clone, Default)]
pub(crate) struct AuthSetup {
    pub transport: Option<Arc<dyn TransportAuth>>,
    pub message: Option<Arc<dyn SecurityTokenProvider>>,
}

impl AuthSetup {
    /// Resolve auth from config plus explicit plug-ins.
    pub fn resolve(
        config: &MadesClientConfig,
        transport: Option<Arc<dyn TransportAuth>>,
        message: Option<Arc<dyn SecurityTokenProvider>>,
    ) -> Self {
        let transport = transport.or_else(|| {
            config.username.as_ref().map(|username| {
                Arc::new(BasicAuth::new(username.clone(), config.password.clone()))
                    as Arc<dyn TransportAuth>
            })
        });

        let message = message.or_else(|| {
            config.ws_security.as_ref().map(|ws| {
                Arc::new(UsernameTokenProvider::from_config(ws)) as Arc<dyn SecurityTokenProvider>
            })
        });

        Self { transport, message }
    }

    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.transport {
            Some(auth) => auth.apply(request),
            None => request,
        }
    }

    pub fn security_header(&self) -> Result<Option<String>, MadesError> {
        self.message.as_ref().map(|p| p.security_header()).transpose()
    }
}
