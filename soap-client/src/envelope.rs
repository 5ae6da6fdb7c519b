//! SOAP 1.2 envelope construction and parsing

use xmltree::Element;

use crate::auth::UsernameToken;
use crate::error::{Result, SoapError};
use crate::fault::Fault;
use crate::xml::{self, XmlWriter};

/// Namespace URIs declared on every envelope this crate emits
pub mod ns {
    pub const SOAP_ENV: &str = "http://www.w3.org/2003/05/soap-envelope";
    pub const DEVICE: &str = "http://www.onvif.org/ver10/device/wsdl";
    pub const MEDIA: &str = "http://www.onvif.org/ver10/media/wsdl";
    pub const PTZ: &str = "http://www.onvif.org/ver20/ptz/wsdl";
    pub const IMAGING: &str = "http://www.onvif.org/ver20/imaging/wsdl";
    pub const EVENTS: &str = "http://www.onvif.org/ver10/events/wsdl";
    pub const ANALYTICS: &str = "http://www.onvif.org/ver20/analytics/wsdl";
    pub const SCHEMA: &str = "http://www.onvif.org/ver10/schema";
    pub const WSNT: &str = "http://docs.oasis-open.org/wsn/b-2";
    pub const WSA: &str = "http://www.w3.org/2005/08/addressing";
    pub const WSSE: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
    pub const WSU: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
    pub const TOPICS: &str = "http://www.onvif.org/ver10/topics";
    pub const ERROR: &str = "http://www.onvif.org/ver10/error";
    pub const WSTOP: &str = "http://docs.oasis-open.org/wsn/t-1";

    /// `(prefix, uri)` pairs declared on the envelope root
    pub const DECLARED: &[(&str, &str)] = &[
        ("s", SOAP_ENV),
        ("tds", DEVICE),
        ("trt", MEDIA),
        ("tptz", PTZ),
        ("timg", IMAGING),
        ("tev", EVENTS),
        ("tan", ANALYTICS),
        ("tt", SCHEMA),
        ("wsnt", WSNT),
        ("wsa", WSA),
        ("wsse", WSSE),
        ("wsu", WSU),
        ("tns1", TOPICS),
        ("ter", ERROR),
        ("wstop", WSTOP),
    ];
}

fn envelope(header: Option<&str>, body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 1024);
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope"#);
    for (prefix, uri) in ns::DECLARED {
        out.push_str(&format!(r#" xmlns:{}="{}""#, prefix, uri));
    }
    out.push('>');
    if let Some(header) = header {
        out.push_str("<s:Header>");
        out.push_str(header);
        out.push_str("</s:Header>");
    }
    out.push_str("<s:Body>");
    out.push_str(body);
    out.push_str("</s:Body></s:Envelope>");
    out
}

/// Wrap an operation payload in its element, e.g. `<trt:GetProfiles>...`.
pub fn operation_element(prefix: &str, name: &str, inner: &str) -> String {
    if inner.is_empty() {
        return format!("<{}:{}/>", prefix, name);
    }
    format!("<{p}:{n}>{inner}</{p}:{n}>", p = prefix, n = name, inner = inner)
}

/// Client request envelope with an optional WS-Security header.
pub fn build_request(body: &str, security: Option<&UsernameToken>) -> String {
    let header = security.map(UsernameToken::to_xml);
    envelope(header.as_deref(), body)
}

/// Server response envelope
pub fn build_response(body: &str) -> String {
    envelope(None, body)
}

pub fn build_fault(fault: &Fault) -> String {
    envelope(None, &fault.to_xml())
}

/// Server-side view of a received request
#[derive(Debug, Clone)]
pub struct ParsedEnvelope {
    pub header: Option<Element>,
    pub security: Option<UsernameToken>,
    /// Local name of the first body child
    pub operation: String,
    /// The first body child itself
    pub body: Element,
}

fn body_of(root: &Element) -> Result<&Element> {
    if root.name != "Envelope" {
        return Err(SoapError::Parse(format!(
            "expected Envelope root, found {}",
            root.name
        )));
    }
    xml::child(root, "s:Body").ok_or_else(|| SoapError::MissingElement("Envelope/Body".to_string()))
}

pub fn parse_envelope(raw: &str) -> Result<ParsedEnvelope> {
    let root = xml::parse_document(raw)?;
    let body = body_of(&root)?;
    let operation = xml::first_element_child(body)
        .ok_or_else(|| SoapError::MissingElement("Body/operation".to_string()))?
        .clone();
    let header = xml::child(&root, "s:Header").cloned();
    let security = match &header {
        Some(h) => UsernameToken::from_header(h)?,
        None => None,
    };
    Ok(ParsedEnvelope {
        header,
        security,
        operation: operation.name.clone(),
        body: operation,
    })
}

/// Client-side: surface a fault, otherwise return the `{action}Response`
/// element.
pub fn extract_response(raw: &str, action: &str) -> Result<Element> {
    let root = xml::parse_document(raw)?;
    let body = body_of(&root)?;

    if let Some(fault) = xml::child(body, "s:Fault") {
        return Err(SoapError::Fault(Fault::from_element(fault)));
    }

    let response_name = format!("{}Response", action);
    xml::child(body, &response_name)
        .cloned()
        .ok_or(SoapError::MissingElement(format!("Body/{}", response_name)))
}

/// Operation name (local name of the first body child) of a raw envelope,
/// `None` when the text is not a parseable envelope.
pub fn detect_operation(raw: &str) -> Option<String> {
    let root = xml::parse_document(raw).ok()?;
    let body = body_of(&root).ok()?;
    xml::first_element_child(body).map(|el| el.name.clone())
}
