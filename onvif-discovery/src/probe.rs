//! WS-Discovery message building and parsing
//!
//! Messages are small and arrive one per datagram, so they are decoded with
//! a streaming reader that only tracks the element path.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{DiscoveryError, Result};

pub const ACTION_PROBE: &str = "http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe";
pub const ACTION_PROBE_MATCHES: &str = "http://schemas.xmlsoap.org/ws/2005/04/discovery/ProbeMatches";
pub const DISCOVERY_TO: &str = "urn:schemas-xmlsoap-org:ws:2005:04:discovery";
pub const ANONYMOUS: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous";
pub const NETWORK_VIDEO_TRANSMITTER: &str = "dn:NetworkVideoTransmitter";

const ENVELOPE_OPEN: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8"?>"#,
    r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope""#,
    r#" xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing""#,
    r#" xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery""#,
    r#" xmlns:dn="http://www.onvif.org/ver10/network/wsdl""#,
    r#" xmlns:tds="http://www.onvif.org/ver10/device/wsdl">"#,
);

/// Build a `Probe` for the given types, identified by `message_id`.
pub fn build_probe(message_id: &str, types: &[String]) -> String {
    let types = escape(types.join(" ").as_str()).into_owned();
    format!(
        "{open}<s:Header>\
         <a:Action s:mustUnderstand=\"1\">{action}</a:Action>\
         <a:MessageID>{id}</a:MessageID>\
         <a:ReplyTo><a:Address>{anon}</a:Address></a:ReplyTo>\
         <a:To s:mustUnderstand=\"1\">{to}</a:To>\
         </s:Header><s:Body><d:Probe><d:Types>{types}</d:Types></d:Probe></s:Body></s:Envelope>",
        open = ENVELOPE_OPEN,
        action = ACTION_PROBE,
        id = escape(message_id),
        anon = ANONYMOUS,
        to = DISCOVERY_TO,
        types = types,
    )
}

/// One `ProbeMatch` entry of a `ProbeMatches` reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeMatch {
    pub endpoint_reference: String,
    pub types: Vec<String>,
    pub scopes: Vec<String>,
    pub xaddrs: Vec<String>,
    pub metadata_version: u32,
}

/// Build a `ProbeMatches` reply to the probe identified by `relates_to`.
pub fn build_probe_matches(message_id: &str, relates_to: &str, matches: &[ProbeMatch]) -> String {
    let mut body = String::new();
    for m in matches {
        body.push_str(&format!(
            "<d:ProbeMatch>\
             <a:EndpointReference><a:Address>{}</a:Address></a:EndpointReference>\
             <d:Types>{}</d:Types><d:Scopes>{}</d:Scopes><d:XAddrs>{}</d:XAddrs>\
             <d:MetadataVersion>{}</d:MetadataVersion></d:ProbeMatch>",
            escape(m.endpoint_reference.as_str()),
            escape(m.types.join(" ").as_str()),
            escape(m.scopes.join(" ").as_str()),
            escape(m.xaddrs.join(" ").as_str()),
            m.metadata_version,
        ));
    }
    format!(
        "{open}<s:Header>\
         <a:Action s:mustUnderstand=\"1\">{action}</a:Action>\
         <a:MessageID>{id}</a:MessageID>\
         <a:RelatesTo>{relates}</a:RelatesTo>\
         <a:To s:mustUnderstand=\"1\">{anon}</a:To>\
         </s:Header><s:Body><d:ProbeMatches>{body}</d:ProbeMatches></s:Body></s:Envelope>",
        open = ENVELOPE_OPEN,
        action = ACTION_PROBE_MATCHES,
        id = escape(message_id),
        relates = escape(relates_to),
        anon = ANONYMOUS,
        body = body,
    )
}

/// The parts of a WS-Discovery message this crate cares about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WsdMessage {
    pub action: Option<String>,
    pub message_id: Option<String>,
    pub relates_to: Option<String>,
    /// `Some` when the body is a `Probe`; holds its requested types
    pub probe_types: Option<Vec<String>>,
    pub matches: Vec<ProbeMatch>,
}

impl WsdMessage {
    pub fn is_probe(&self) -> bool {
        self.probe_types.is_some()
    }
}

fn split_list(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Decode a WS-Discovery envelope.
pub fn parse_message(xml: &str) -> Result<WsdMessage> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut message = WsdMessage::default();
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<ProbeMatch> = None;
    let mut saw_envelope = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if path.is_empty() {
                    if name != "Envelope" {
                        return Err(DiscoveryError::Parse(format!("unexpected root {}", name)));
                    }
                    saw_envelope = true;
                }
                match name.as_str() {
                    "ProbeMatch" => current = Some(ProbeMatch::default()),
                    "Probe" => message.probe_types = Some(Vec::new()),
                    _ => {}
                }
                path.push(name);
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"Probe" {
                    message.probe_types = Some(Vec::new());
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| DiscoveryError::Parse(e.to_string()))?
                    .into_owned();
                let Some(leaf) = path.last().map(String::as_str) else {
                    continue;
                };
                let parent = path.len().checked_sub(2).map(|i| path[i].as_str());
                match (leaf, current.as_mut()) {
                    ("Action", _) if parent == Some("Header") => message.action = Some(text),
                    ("MessageID", _) if parent == Some("Header") => message.message_id = Some(text),
                    ("RelatesTo", _) if parent == Some("Header") => message.relates_to = Some(text),
                    ("Address", Some(m)) if parent == Some("EndpointReference") => {
                        m.endpoint_reference = text
                    }
                    ("Types", Some(m)) => m.types = split_list(&text),
                    ("Scopes", Some(m)) => m.scopes = split_list(&text),
                    ("XAddrs", Some(m)) => m.xaddrs = split_list(&text),
                    ("MetadataVersion", Some(m)) => m.metadata_version = text.trim().parse().unwrap_or(0),
                    ("Types", None) if parent == Some("Probe") => {
                        message.probe_types = Some(split_list(&text))
                    }
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                if path.pop().as_deref() == Some("ProbeMatch") {
                    if let Some(m) = current.take() {
                        message.matches.push(m);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(DiscoveryError::Parse(e.to_string())),
        }
    }

    if !saw_envelope || !path.is_empty() {
        return Err(DiscoveryError::Parse("incomplete envelope".to_string()));
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_round_trip() {
        let xml = build_probe("urn:uuid:1234", &[NETWORK_VIDEO_TRANSMITTER.to_string()]);
        let parsed = parse_message(&xml).unwrap();
        assert!(parsed.is_probe());
        assert_eq!(parsed.action.as_deref(), Some(ACTION_PROBE));
        assert_eq!(parsed.message_id.as_deref(), Some("urn:uuid:1234"));
        assert_eq!(parsed.probe_types.unwrap(), vec!["dn:NetworkVideoTransmitter".to_string()]);
        assert!(parsed.matches.is_empty());
    }

    #[test]
    fn test_probe_matches_round_trip() {
        let entry = ProbeMatch {
            endpoint_reference: "urn:uuid:cam-1".to_string(),
            types: vec!["dn:NetworkVideoTransmitter".to_string(), "tds:Device".to_string()],
            scopes: vec!["onvif://www.onvif.org/name/Front%20Door".to_string()],
            xaddrs: vec![
                "http://10.0.0.5/onvif/device_service".to_string(),
                "http://[fe80::1]/onvif/device_service".to_string(),
            ],
            metadata_version: 3,
        };
        let xml = build_probe_matches("urn:uuid:reply", "urn:uuid:probe", &[entry.clone()]);
        let parsed = parse_message(&xml).unwrap();
        assert!(!parsed.is_probe());
        assert_eq!(parsed.relates_to.as_deref(), Some("urn:uuid:probe"));
        assert_eq!(parsed.matches, vec![entry]);
    }

    #[test]
    fn test_parses_foreign_prefixes() {
        let xml = r#"<?xml version="1.0"?>
            <SOAP-ENV:Envelope xmlns:SOAP-ENV="http://www.w3.org/2003/05/soap-envelope"
                xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/08/addressing"
                xmlns:wsdd="http://schemas.xmlsoap.org/ws/2005/04/discovery">
              <SOAP-ENV:Header>
                <wsa:RelatesTo>urn:uuid:abc</wsa:RelatesTo>
              </SOAP-ENV:Header>
              <SOAP-ENV:Body>
                <wsdd:ProbeMatches>
                  <wsdd:ProbeMatch>
                    <wsa:EndpointReference><wsa:Address>urn:uuid:x</wsa:Address></wsa:EndpointReference>
                    <wsdd:XAddrs>http://192.168.1.20:8000/onvif/device_service</wsdd:XAddrs>
                  </wsdd:ProbeMatch>
                </wsdd:ProbeMatches>
              </SOAP-ENV:Body>
            </SOAP-ENV:Envelope>"#;
        let parsed = parse_message(xml).unwrap();
        assert_eq!(parsed.relates_to.as_deref(), Some("urn:uuid:abc"));
        assert_eq!(parsed.matches.len(), 1);
        assert_eq!(parsed.matches[0].endpoint_reference, "urn:uuid:x");
        assert_eq!(parsed.matches[0].metadata_version, 0);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_message("not xml at all").is_err());
        assert!(parse_message("<html><body/></html>").is_err());
        assert!(parse_message("<s:Envelope xmlns:s=\"urn:x\"><s:Body>").is_err());
    }
}
