//! Service contract (WSDL 1.1) reading and binding resolution.
//!
//! Only what the client needs is extracted: the target namespace, the schema
//! element form, and per binding its SOAP version and operation actions.

use crate::envelope::SoapVersion;
use crate::error::MadesError;
use crate::operation::Operation;
use crate::parser::{parse_document, XmlNode};
use std::collections::HashMap;
use std::fmt;
use url::Url;

/// Namespace of the MADES service contract.
pub const MADES_NS: &str = "http://mades.entsoe.eu/";

pub const WSDL_NS: &str = "http://schemas.xmlsoap.org/wsdl/";
pub const WSDL_SOAP11_NS: &str = "http://schemas.xmlsoap.org/wsdl/soap/";
pub const WSDL_SOAP12_NS: &str = "http://schemas.xmlsoap.org/wsdl/soap12/";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// A namespace-qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub namespace: String,
    pub local: String,
}

impl QualifiedName {
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    /// Parse Clark notation: `{http://mades.entsoe.eu/}MadesEndpointSOAP12`.
    pub fn parse_clark(value: &str) -> Result<Self, MadesError> {
        let rest = value.trim().strip_prefix('{').ok_or_else(|| {
            MadesError::Config(format!("binding '{}' is not in {{namespace}}name form", value))
        })?;
        let (namespace, local) = rest.split_once('}').ok_or_else(|| {
            MadesError::Config(format!("binding '{}' has an unterminated namespace", value))
        })?;
        if local.is_empty() {
            return Err(MadesError::Config(format!("binding '{}' has no local name", value)));
        }
        Ok(Self::new(namespace, local))
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.local)
    }
}

/// A binding as declared in the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractBinding {
    pub name: String,
    pub version: SoapVersion,
    /// `document` or `rpc`; WSDL defaults to document
    pub style: String,
    /// Operation name → soapAction (empty when not declared)
    pub operations: HashMap<String, String>,
}

/// The parts of a WSDL document the client relies on.
#[derive(Debug, Clone)]
pub struct ServiceContract {
    pub target_namespace: String,
    /// `elementFormDefault="qualified"` on the target namespace schema
    pub element_form_qualified: bool,
    pub bindings: Vec<ContractBinding>,
}

impl ServiceContract {
    /// Parse a WSDL document.
    pub fn parse(data: &[u8]) -> Result<Self, MadesError> {
        let root = parse_document(data)?;

        if root.name != "definitions" || root.namespace.as_deref() != Some(WSDL_NS) {
            return Err(MadesError::Contract(format!(
                "expected wsdl:definitions root element, found {}",
                root.name
            )));
        }

        let target_namespace = root
            .attribute("targetNamespace")
            .ok_or_else(|| MadesError::Contract("definitions has no targetNamespace".to_string()))?
            .to_string();

        let element_form_qualified = root
            .children_named("types")
            .flat_map(|types| types.children_named("schema"))
            .filter(|schema| schema.namespace.as_deref() == Some(XSD_NS))
            .filter(|schema| schema.attribute("targetNamespace") == Some(target_namespace.as_str()))
            .any(|schema| schema.attribute("elementFormDefault") == Some("qualified"));

        let bindings = root
            .children_named("binding")
            .filter(|b| b.namespace.as_deref() == Some(WSDL_NS))
            .filter_map(read_binding)
            .collect();

        Ok(Self {
            target_namespace,
            element_form_qualified,
            bindings,
        })
    }

    /// Find a binding by qualified name.
    pub fn binding(&self, name: &QualifiedName) -> Option<&ContractBinding> {
        if name.namespace != self.target_namespace {
            return None;
        }
        self.bindings.iter().find(|b| b.name == name.local)
    }

    /// Resolve a binding into a call-ready [`ServiceBinding`] at `endpoint`.
    ///
    /// Fails if the binding is absent, uses RPC style, or lacks any of the five
    /// operations.
    pub fn bind(&self, name: &QualifiedName, endpoint: Url) -> Result<ServiceBinding, MadesError> {
        let binding = self.binding(name).ok_or_else(|| {
            let available: Vec<_> = self
                .bindings
                .iter()
                .map(|b| format!("{{{}}}{}", self.target_namespace, b.name))
                .collect();
            MadesError::Contract(format!(
                "binding {} not found (available: {:?})",
                name, available
            ))
        })?;

        if binding.style != "document" {
            return Err(MadesError::Contract(format!(
                "binding {} uses unsupported style '{}'",
                name, binding.style
            )));
        }

        let mut actions = HashMap::new();
        for op in Operation::ALL {
            let action = binding.operations.get(op.as_str()).ok_or_else(|| {
                MadesError::Contract(format!(
                    "binding {} does not define operation {}",
                    name,
                    op.as_str()
                ))
            })?;
            actions.insert(op, action.clone());
        }

        Ok(ServiceBinding {
            endpoint,
            version: binding.version,
            namespace: self.target_namespace.clone(),
            qualified: self.element_form_qualified,
            actions,
        })
    }
}

fn read_binding(node: &XmlNode) -> Option<ContractBinding> {
    let name = node.attribute("name")?.to_string();

    // Only SOAP bindings are usable; HTTP/MIME bindings are skipped.
    let extension = node.children.iter().find(|c| {
        c.name == "binding"
            && matches!(
                c.namespace.as_deref(),
                Some(WSDL_SOAP11_NS) | Some(WSDL_SOAP12_NS)
            )
    })?;
    let version = match extension.namespace.as_deref() {
        Some(WSDL_SOAP12_NS) => SoapVersion::Soap12,
        _ => SoapVersion::Soap11,
    };
    let style = extension.attribute("style").unwrap_or("document").to_string();

    let operations = node
        .children_named("operation")
        .filter_map(|op| {
            let op_name = op.attribute("name")?.to_string();
            let action = op
                .child("operation")
                .and_then(|soap_op| soap_op.attribute("soapAction"))
                .unwrap_or_default()
                .to_string();
            Some((op_name, action))
        })
        .collect();

    Some(ContractBinding {
        name,
        version,
        style,
        operations,
    })
}

/// The resolved, immutable binding every call is dispatched through.
#[derive(Debug, Clone)]
pub struct ServiceBinding {
    endpoint: Url,
    version: SoapVersion,
    namespace: String,
    qualified: bool,
    actions: HashMap<Operation, String>,
}

impl ServiceBinding {
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    /// Namespace of request and response wrapper elements.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Whether wrapper children are namespace-qualified.
    pub fn qualified(&self) -> bool {
        self.qualified
    }

    pub fn action(&self, operation: Operation) -> &str {
        self.actions
            .get(&operation)
            .map(String::as_str)
            .unwrap_or_default()
    }
}
