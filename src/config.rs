//! Configuration types for the MADES client.

use crate::error::MadesError;
use crate::wsdl::{QualifiedName, MADES_NS};
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default path of the service endpoint, relative to the server address.
pub const DEFAULT_SERVICE_PATH: &str = "ws/madesInWSInterface";

/// Default binding the client resolves from the WSDL.
pub const DEFAULT_BINDING: &str = "MadesEndpointSOAP12";

/// Main configuration for the MADES client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MadesClientConfig {
    /// Gateway address, e.g. `https://ecp.example.org`
    pub server: String,

    /// Basic auth username
    pub username: Option<String>,

    /// Basic auth password
    pub password: Option<Secret<String>>,

    /// Record the last exchange for [`crate::MadesClient::print_last_exchange`]
    pub debug: bool,

    /// TLS certificate verification
    pub tls_verify: TlsVerification,

    /// GET the WSDL once with credentials before the real fetch, to complete
    /// redirect-based login flows (e.g. Keycloak-fronted gateways)
    pub preemptive_auth: bool,

    /// Per-request timeout; none means the transport default
    pub timeout_secs: Option<u64>,

    /// User-Agent header
    pub user_agent: String,

    /// Service contract location
    pub service: ServiceConfig,

    /// WS-Security UsernameToken settings
    pub ws_security: Option<UsernameTokenConfig>,
}

impl Default for MadesClientConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            username: None,
            password: None,
            debug: false,
            tls_verify: TlsVerification::default(),
            preemptive_auth: true,
            timeout_secs: None,
            user_agent: format!("mades-client/{}", env!("CARGO_PKG_VERSION")),
            service: ServiceConfig::default(),
            ws_security: None,
        }
    }
}

impl MadesClientConfig {
    /// Configuration for a server with everything else defaulted.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Default::default()
        }
    }

    /// Check the configuration and return the server base URL.
    pub fn validate(&self) -> Result<Url, MadesError> {
        let server = self.server.trim();
        if server.is_empty() {
            return Err(MadesError::Config("server address is required".to_string()));
        }

        let url = Url::parse(server)
            .map_err(|e| MadesError::Config(format!("invalid server address '{}': {}", server, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(MadesError::Config(format!(
                "server address must be http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.password.is_some() && self.username.is_none() {
            return Err(MadesError::Config(
                "password given without a username".to_string(),
            ));
        }

        if let Some(ws) = &self.ws_security {
            if ws.username.is_empty() {
                return Err(MadesError::Config(
                    "ws_security.username must not be empty".to_string(),
                ));
            }
        }

        if self.service.path.trim_matches('/').is_empty() {
            return Err(MadesError::Config("service.path must not be empty".to_string()));
        }
        self.service.binding_name()?;

        Ok(url)
    }

    /// Address the operations are posted to.
    pub fn endpoint_url(&self) -> Result<Url, MadesError> {
        self.service_url("")
    }

    /// Address of the contract description.
    pub fn wsdl_url(&self) -> Result<Url, MadesError> {
        self.service_url(".wsdl")
    }

    fn service_url(&self, suffix: &str) -> Result<Url, MadesError> {
        let raw = format!(
            "{}/{}{}",
            self.server.trim().trim_end_matches('/'),
            self.service.path.trim_matches('/'),
            suffix
        );
        Url::parse(&raw).map_err(|e| MadesError::Config(format!("invalid service URL '{}': {}", raw, e)))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// TLS certificate verification: on, off, or against a specific trust anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TlsVerification {
    /// `true` verifies against the system roots, `false` disables verification
    Enabled(bool),
    /// PEM bundle with the trusted CA certificates; replaces the built-in roots
    TrustAnchor(PathBuf),
}

impl Default for TlsVerification {
    fn default() -> Self {
        // Kept off for compatibility with gateways using private CAs.
        Self::Enabled(false)
    }
}

impl TlsVerification {
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Enabled(false))
    }
}

/// Location of the service contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Endpoint path; the WSDL is expected at `<path>.wsdl`
    pub path: String,

    /// Binding name in Clark notation, `{namespace}local`
    pub binding: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_SERVICE_PATH.to_string(),
            binding: format!("{{{}}}{}", MADES_NS, DEFAULT_BINDING),
        }
    }
}

impl ServiceConfig {
    pub fn binding_name(&self) -> Result<QualifiedName, MadesError> {
        QualifiedName::parse_clark(&self.binding)
    }
}

/// WS-Security UsernameToken settings.
#[derive(Debug, Clone, Deserialize)]
pub struct UsernameTokenConfig {
    pub username: String,
    pub password: Secret<String>,
    /// Add a Timestamp expiring after this many seconds
    #[serde(default)]
    pub timestamp_ttl_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_default_config() {
        let config = MadesClientConfig::default();
        assert!(!config.debug);
        assert!(config.preemptive_auth);
        assert!(config.tls_verify.is_disabled());
        assert_eq!(config.service.path, "ws/madesInWSInterface");
        assert_eq!(
            config.service.binding,
            "{http://mades.entsoe.eu/}MadesEndpointSOAP12"
        );
    }

    #[test]
    fn test_service_urls() {
        let config = MadesClientConfig::new("https://ecp.example.org/");
        assert_eq!(
            config.endpoint_url().unwrap().as_str(),
            "https://ecp.example.org/ws/madesInWSInterface"
        );
        assert_eq!(
            config.wsdl_url().unwrap().as_str(),
            "https://ecp.example.org/ws/madesInWSInterface.wsdl"
        );
    }

    #[test]
    fn test_validate_rejects_empty_server() {
        let config = MadesClientConfig::new("  ");
        assert!(matches!(config.validate(), Err(MadesError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_scheme() {
        let config = MadesClientConfig::new("ftp://ecp.example.org");
        assert!(matches!(config.validate(), Err(MadesError::Config(_))));
        let config = MadesClientConfig::new("not a url");
        assert!(matches!(config.validate(), Err(MadesError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_password_without_username() {
        let config = MadesClientConfig {
            password: Some(Secret::new("secret".to_string())),
            ..MadesClientConfig::new("https://ecp.example.org")
        };
        assert!(matches!(config.validate(), Err(MadesError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_binding() {
        let mut config = MadesClientConfig::new("https://ecp.example.org");
        config.service.binding = "MadesEndpointSOAP12".to_string();
        assert!(matches!(config.validate(), Err(MadesError::Config(_))));
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
server: "https://ecp.example.org"
username: "ecp-user"
password: "ecp-pass"
debug: true
tls_verify: "/etc/ssl/mades-ca.pem"
preemptive_auth: false
timeout_secs: 30
ws_security:
  username: "token-user"
  password: "token-pass"
  timestamp_ttl_secs: 300
"#;
        let config: MadesClientConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server, "https://ecp.example.org");
        assert_eq!(config.username.as_deref(), Some("ecp-user"));
        assert_eq!(config.password.as_ref().unwrap().expose_secret(), "ecp-pass");
        assert!(config.debug);
        assert_eq!(
            config.tls_verify,
            TlsVerification::TrustAnchor(PathBuf::from("/etc/ssl/mades-ca.pem"))
        );
        assert!(!config.preemptive_auth);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.service, ServiceConfig::default());
        assert!(config.validate().is_ok());
        let ws = config.ws_security.unwrap();
        assert_eq!(ws.timestamp_ttl_secs, Some(300));
    }

    #[test]
    fn test_tls_verify_bool() {
        let config: MadesClientConfig =
            serde_yaml::from_str("server: https://x\ntls_verify: true\n").unwrap();
        assert_eq!(config.tls_verify, TlsVerification::Enabled(true));
        assert!(!config.tls_verify.is_disabled());
    }
}
