//! SOAP XML parsing utilities.
//!
//! Entities are never expanded and documents carrying a DTD are rejected.
//! Documents are read into a small owned element tree; elements are matched by
//! namespace-resolved local name so prefixes chosen by the server don't matter.

use crate::envelope::{SoapVersion, SOAP_11_NS, SOAP_12_NS};
use crate::error::{FaultContext, MadesError, OperationError, RemoteFault};
use crate::operation::Operation;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use quick_xml::{Reader, Writer};

/// An element of a parsed XML document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    /// Resolved namespace URI
    pub namespace: Option<String>,
    /// Local name (prefix stripped)
    pub name: String,
    /// Attributes by local name, namespace declarations excluded
    pub attributes: Vec<(String, String)>,
    /// Concatenated text content
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// First child with the given local name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given local name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first child with the given local name.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Attribute value by local name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether the element is marked `xsi:nil="true"`.
    pub fn is_nil(&self) -> bool {
        matches!(self.attribute("nil"), Some("true") | Some("1"))
    }

    /// Depth-first search for the first descendant with the given local name.
    pub fn find(&self, name: &str) -> Option<&XmlNode> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }
}

/// Parse a complete XML document into its root element.
pub fn parse_document(data: &[u8]) -> Result<XmlNode, MadesError> {
    let xml_str = std::str::from_utf8(data)
        .map_err(|e| MadesError::XmlParse(format!("Invalid UTF-8: {}", e)))?;

    let mut reader = NsReader::from_str(xml_str);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_resolved_event() {
            Ok((ns, Event::Start(ref e))) => {
                let node = element_node(namespace_uri(&ns), e)?;
                stack.push(node);
            }

            Ok((ns, Event::Empty(ref e))) => {
                let node = element_node(namespace_uri(&ns), e)?;
                attach(&mut stack, &mut root, node)?;
            }

            Ok((_, Event::End(_))) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| MadesError::XmlParse("Unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, node)?;
            }

            Ok((_, Event::Text(ref e))) => {
                if let Some(current) = stack.last_mut() {
                    let text = e
                        .unescape()
                        .map_err(|e| MadesError::XmlParse(format!("Bad text content: {}", e)))?;
                    current.text.push_str(&text);
                }
            }

            Ok((_, Event::CData(ref e))) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(e));
                }
            }

            // DTDs are never legitimate in gateway traffic
            Ok((_, Event::DocType(_))) => {
                return Err(MadesError::XmlParse(
                    "DOCTYPE declarations are not allowed".to_string(),
                ));
            }

            Ok((_, Event::Eof)) => break,

            Err(e) => {
                return Err(MadesError::XmlParse(format!("XML parse error: {}", e)));
            }

            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(MadesError::XmlParse("Unexpected end of document".to_string()));
    }

    root.ok_or_else(|| MadesError::XmlParse("Document has no root element".to_string()))
}

fn attach(
    stack: &mut [XmlNode],
    root: &mut Option<XmlNode>,
    node: XmlNode,
) -> Result<(), MadesError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_none() => *root = Some(node),
        None => {
            return Err(MadesError::XmlParse(
                "Multiple root elements".to_string(),
            ))
        }
    }
    Ok(())
}

fn namespace_uri(ns: &ResolveResult) -> Option<String> {
    match ns {
        ResolveResult::Bound(Namespace(uri)) => Some(String::from_utf8_lossy(uri).into_owned()),
        _ => None,
    }
}

fn element_node(namespace: Option<String>, e: &BytesStart) -> Result<XmlNode, MadesError> {
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| MadesError::XmlParse(format!("Bad attribute: {}", e)))?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let value = attr
            .unescape_value()
            .map_err(|e| MadesError::XmlParse(format!("Bad attribute value: {}", e)))?;
        attributes.push((
            String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned(),
            value.into_owned(),
        ));
    }

    Ok(XmlNode {
        namespace,
        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        attributes,
        ..Default::default()
    })
}

/// Parsed SOAP envelope.
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    /// Detected SOAP version
    pub version: SoapVersion,
    /// SOAP Header (if present)
    pub header: Option<XmlNode>,
    /// SOAP Body
    pub body: XmlNode,
}

impl SoapEnvelope {
    /// The `Fault` element, if the body carries one.
    pub fn fault(&self) -> Option<&XmlNode> {
        let ns = self.version.namespace();
        self.body
            .children
            .iter()
            .find(|c| c.name == "Fault" && c.namespace.as_deref() == Some(ns))
    }

    /// First element inside the body.
    pub fn payload(&self) -> Option<&XmlNode> {
        self.body.children.first()
    }
}

/// Parse raw bytes as SOAP envelope.
pub fn parse_soap_envelope(data: &[u8]) -> Result<SoapEnvelope, MadesError> {
    let root = parse_document(data)?;

    if root.name != "Envelope" {
        return Err(MadesError::InvalidEnvelope(format!(
            "Expected Envelope root element, found {}",
            root.name
        )));
    }

    let version = match root.namespace.as_deref() {
        Some(SOAP_11_NS) => SoapVersion::Soap11,
        Some(SOAP_12_NS) => SoapVersion::Soap12,
        other => {
            return Err(MadesError::InvalidEnvelope(format!(
                "No valid SOAP Envelope found with recognized namespace (got {:?})",
                other
            )))
        }
    };

    let ns = version.namespace();
    let mut header = None;
    let mut body = None;
    for child in root.children {
        if child.namespace.as_deref() != Some(ns) {
            continue;
        }
        match child.name.as_str() {
            "Header" if header.is_none() => header = Some(child),
            "Body" if body.is_none() => body = Some(child),
            _ => {}
        }
    }

    let body =
        body.ok_or_else(|| MadesError::InvalidEnvelope("SOAP Body is missing".to_string()))?;

    Ok(SoapEnvelope {
        version,
        header,
        body,
    })
}

/// Decode a SOAP 1.1 or 1.2 `Fault` element.
pub fn parse_fault(operation: Operation, version: SoapVersion, fault: &XmlNode) -> RemoteFault {
    let (code, reason, detail) = match version {
        SoapVersion::Soap11 => (
            fault.child_text("faultcode").unwrap_or_default().to_string(),
            fault.child_text("faultstring").unwrap_or_default().to_string(),
            fault.child("detail"),
        ),
        SoapVersion::Soap12 => (
            fault
                .child("Code")
                .and_then(|c| c.child_text("Value"))
                .unwrap_or_default()
                .to_string(),
            fault
                .child("Reason")
                .and_then(|r| r.child_text("Text"))
                .unwrap_or_default()
                .to_string(),
            fault.child("Detail"),
        ),
    };

    let detail = detail.and_then(|d| {
        d.child(operation.error_element())
            .or_else(|| d.children.iter().find(|c| c.name.ends_with("Error")))
            .map(|e| operation_error(operation, e))
    });

    RemoteFault {
        operation,
        code,
        reason,
        detail,
    }
}

fn operation_error(operation: Operation, node: &XmlNode) -> OperationError {
    let text = |name: &str| node.child_text(name).unwrap_or_default().to_string();
    let field = operation.fault_context_field();

    OperationError {
        error_code: text("errorCode"),
        error_id: text("errorID"),
        error_message: text("errorMessage"),
        context: node.child(field).map(|c| FaultContext {
            field: field.to_string(),
            value: c.text.clone(),
        }),
        error_details: text("errorDetails"),
    }
}

/// Re-indent an XML document for display. Returns the input unchanged if it
/// cannot be parsed.
pub fn pretty_print(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(event) => {
                if writer.write_event(event).is_err() {
                    return xml.to_string();
                }
            }
            Err(_) => return xml.to_string(),
        }
    }

    String::from_utf8(writer.into_inner()).unwrap_or_else(|_| xml.to_string())
}

const REDACTED: &str = "[REDACTED]";

/// Mask the text of every `Password` element, whatever its prefix.
///
/// A document that cannot be re-read is replaced by the placeholder as a whole.
pub fn redact_passwords(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut in_password = false;

    loop {
        let event = match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                in_password = e.local_name().as_ref() == b"Password";
                Event::Start(e)
            }
            Ok(Event::End(e)) => {
                in_password = false;
                Event::End(e)
            }
            Ok(Event::Text(_)) | Ok(Event::CData(_)) if in_password => {
                Event::Text(BytesText::new(REDACTED))
            }
            Ok(event) => event,
            Err(_) => return REDACTED.to_string(),
        };
        if writer.write_event(event).is_err() {
            return REDACTED.to_string();
        }
    }

    String::from_utf8(writer.into_inner()).unwrap_or_else(|_| REDACTED.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOAP_12_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope">
  <env:Header/>
  <env:Body>
    <ns2:ConnectivityTestResponse xmlns:ns2="http://mades.entsoe.eu/">
      <messageID>a1b2c3</messageID>
    </ns2:ConnectivityTestResponse>
  </env:Body>
</env:Envelope>"#;

    const SOAP_12_FAULT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope">
  <env:Body>
    <env:Fault>
      <env:Code><env:Value>env:Receiver</env:Value></env:Code>
      <env:Reason><env:Text xml:lang="en">Message not found</env:Text></env:Reason>
      <env:Detail>
        <ns2:CheckMessageStatusError xmlns:ns2="http://mades.entsoe.eu/">
          <errorCode>MESSAGE_NOT_FOUND</errorCode>
          <errorID>ERR-42</errorID>
          <errorMessage>No message with this ID</errorMessage>
          <messageID>missing-id</messageID>
          <errorDetails>lookup failed</errorDetails>
        </ns2:CheckMessageStatusError>
      </env:Detail>
    </env:Fault>
  </env:Body>
</env:Envelope>"#;

    const SOAP_11_FAULT: &str = r#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <soap:Fault>
      <faultcode>soap:Server</faultcode>
      <faultstring>Receiver unknown</faultstring>
      <detail>
        <m:ConnectivityTestError xmlns:m="http://mades.entsoe.eu/">
          <errorCode>UNKNOWN_RECEIVER</errorCode>
          <errorID>ERR-7</errorID>
          <errorMessage>Receiver is not registered</errorMessage>
          <receiverCode>10X-UNKNOWN</receiverCode>
          <errorDetails/>
        </m:ConnectivityTestError>
      </detail>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#;

    #[test]
    fn test_parse_document_tree() {
        let root = parse_document(b"<a xmlns='urn:x'><b id='1'>one</b><b>two</b><c/></a>").unwrap();
        assert_eq!(root.name, "a");
        assert_eq!(root.namespace.as_deref(), Some("urn:x"));
        assert_eq!(root.children_named("b").count(), 2);
        assert_eq!(root.child("b").unwrap().attribute("id"), Some("1"));
        assert_eq!(root.child_text("c"), Some(""));
    }

    #[test]
    fn test_parse_document_unescapes_text() {
        let root = parse_document(b"<a>R&amp;D &lt;ok&gt;</a>").unwrap();
        assert_eq!(root.text, "R&D <ok>");
    }

    #[test]
    fn test_nil_attribute() {
        let root = parse_document(
            br#"<a xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><b xsi:nil="true"/></a>"#,
        )
        .unwrap();
        assert!(root.child("b").unwrap().is_nil());
        assert!(!root.is_nil());
    }

    #[test]
    fn test_parse_soap_12_response() {
        let envelope = parse_soap_envelope(SOAP_12_RESPONSE.as_bytes()).unwrap();
        assert_eq!(envelope.version, SoapVersion::Soap12);
        assert!(envelope.header.is_some());
        assert!(envelope.fault().is_none());

        let payload = envelope.payload().unwrap();
        assert_eq!(payload.name, "ConnectivityTestResponse");
        assert_eq!(payload.namespace.as_deref(), Some("http://mades.entsoe.eu/"));
        assert_eq!(payload.child_text("messageID"), Some("a1b2c3"));
    }

    #[test]
    fn test_parse_soap_12_fault() {
        let envelope = parse_soap_envelope(SOAP_12_FAULT.as_bytes()).unwrap();
        let fault = parse_fault(
            Operation::CheckMessageStatus,
            envelope.version,
            envelope.fault().unwrap(),
        );

        assert_eq!(fault.code, "env:Receiver");
        assert_eq!(fault.reason, "Message not found");
        let detail = fault.detail.unwrap();
        assert_eq!(detail.error_code, "MESSAGE_NOT_FOUND");
        assert_eq!(detail.error_id, "ERR-42");
        assert_eq!(detail.error_details, "lookup failed");
        let context = detail.context.unwrap();
        assert_eq!(context.field, "messageID");
        assert_eq!(context.value, "missing-id");
    }

    #[test]
    fn test_parse_soap_11_fault() {
        let envelope = parse_soap_envelope(SOAP_11_FAULT.as_bytes()).unwrap();
        assert_eq!(envelope.version, SoapVersion::Soap11);

        let fault = parse_fault(
            Operation::ConnectivityTest,
            envelope.version,
            envelope.fault().unwrap(),
        );
        assert_eq!(fault.code, "soap:Server");
        assert_eq!(fault.reason, "Receiver unknown");
        let detail = fault.detail.unwrap();
        assert_eq!(detail.error_message, "Receiver is not registered");
        assert_eq!(detail.context.unwrap().value, "10X-UNKNOWN");
        assert_eq!(detail.error_details, "");
    }

    #[test]
    fn test_fault_without_detail() {
        let xml = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body><s:Fault>
<s:Code><s:Value>s:Sender</s:Value></s:Code><s:Reason><s:Text>Bad request</s:Text></s:Reason>
</s:Fault></s:Body></s:Envelope>"#;
        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        let fault = parse_fault(Operation::SendMessage, envelope.version, envelope.fault().unwrap());
        assert_eq!(fault.code, "s:Sender");
        assert!(fault.detail.is_none());
    }

    #[test]
    fn test_non_soap_document_rejected() {
        let result = parse_soap_envelope(b"<html><body>Login</body></html>");
        assert!(matches!(result, Err(MadesError::InvalidEnvelope(_))));
    }

    #[test]
    fn test_missing_body_rejected() {
        let xml = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Header/></s:Envelope>"#;
        let result = parse_soap_envelope(xml.as_bytes());
        assert!(matches!(result, Err(MadesError::InvalidEnvelope(_))));
    }

    #[test]
    fn test_xxe_detection() {
        let xxe_payload = r#"<?xml version="1.0"?>
<!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>&xxe;</soap:Body>
</soap:Envelope>"#;

        let result = parse_soap_envelope(xxe_payload.as_bytes());
        assert!(matches!(result, Err(MadesError::XmlParse(_))));
    }

    #[test]
    fn test_doctype_inside_cdata_is_text() {
        let xml = r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope"><env:Body><env:Fault>
<env:Code><env:Value>env:Receiver</env:Value></env:Code><env:Reason><env:Text>Upstream failure</env:Text></env:Reason>
<env:Detail><ns2:ConnectivityTestError xmlns:ns2="http://mades.entsoe.eu/"><errorCode>UPSTREAM</errorCode>
<errorID>E-9</errorID><errorMessage>Upstream failure</errorMessage><receiverCode>10X1001A1001A450</receiverCode>
<errorDetails><![CDATA[<!DOCTYPE html><html><body>502 <!ENTITY></body></html>]]></errorDetails>
</ns2:ConnectivityTestError></env:Detail></env:Fault></env:Body></env:Envelope>"#;

        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        let fault = parse_fault(
            Operation::ConnectivityTest,
            envelope.version,
            envelope.fault().unwrap(),
        );
        let detail = fault.detail.unwrap();
        assert_eq!(detail.error_code, "UPSTREAM");
        assert!(detail.error_details.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn test_malformed_xml() {
        assert!(matches!(
            parse_document(b"<a><b></a>"),
            Err(MadesError::XmlParse(_))
        ));
        assert!(matches!(parse_document(b""), Err(MadesError::XmlParse(_))));
    }

    #[test]
    fn test_pretty_print_indents() {
        let pretty = pretty_print("<a><b>text</b><c/></a>");
        assert!(pretty.contains("\n  <b>text</b>"));
        assert!(pretty.contains("\n  <c/>"));
    }

    #[test]
    fn test_redact_passwords() {
        let xml = r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"><soap:Header>
<wsse:Security xmlns:wsse="urn:wsse"><wsse:UsernameToken><wsse:Username>ecp-user</wsse:Username>
<wsse:Password Type="urn:text">p&amp;ss-1</wsse:Password></wsse:UsernameToken></wsse:Security>
</soap:Header><soap:Body><m:Req xmlns:m="urn:m"><Password2>kept</Password2></m:Req></soap:Body></soap:Envelope>"#;

        let redacted = redact_passwords(xml);
        assert!(!redacted.contains("p&amp;ss-1"));
        assert!(redacted.contains(r#"<wsse:Password Type="urn:text">[REDACTED]</wsse:Password>"#));
        assert!(redacted.contains("<wsse:Username>ecp-user</wsse:Username>"));
        assert!(redacted.contains("<Password2>kept</Password2>"));
    }

    #[test]
    fn test_redact_passwords_withholds_unreadable_input() {
        assert_eq!(redact_passwords("<a><Password>x</b>"), "[REDACTED]");
    }

    #[test]
    fn test_pretty_print_falls_back_on_garbage() {
        assert_eq!(pretty_print("not <xml"), "not <xml");
    }
}
