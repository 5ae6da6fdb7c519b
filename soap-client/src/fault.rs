//! SOAP 1.2 faults
//!
//! A fault carries a top-level code (`s:Sender` or `s:Receiver`), an
//! optional chain of subcodes and a human readable reason. Only the
//! innermost subcode is usually interesting, so [`Fault::subcode`] returns
//! that one.

use std::fmt;

use serde::{Deserialize, Serialize};
use xmltree::Element;

use crate::xml::{self, XmlWriter};

/// Top-level fault codes
pub mod code {
    pub const SENDER: &str = "s:Sender";
    pub const RECEIVER: &str = "s:Receiver";
}

/// Well-known ONVIF error subcodes
pub mod subcode {
    pub const INVALID_ARG_VAL: &str = "ter:InvalidArgVal";
    pub const NO_PROFILE: &str = "ter:NoProfile";
    pub const NO_TOKEN: &str = "ter:NoToken";
    pub const NO_CONFIG: &str = "ter:NoConfig";
    pub const NO_SOURCE: &str = "ter:NoSource";
    pub const PTZ_NOT_SUPPORTED: &str = "ter:PTZNotSupported";
    pub const ACTION_NOT_SUPPORTED: &str = "ter:ActionNotSupported";
    pub const NOT_AUTHORIZED: &str = "ter:NotAuthorized";
    pub const RESOURCE_UNKNOWN: &str = "ter:ResourceUnknown";
    pub const SUBSCRIPTION_EXPIRED: &str = "ter:SubscriptionExpired";
    pub const ACTION: &str = "ter:Action";
    pub const CANNOT_DELETE_FIXED: &str = "ter:DeletionOfFixedProfile";
    pub const CONFLICT: &str = "ter:Conflict";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Qualified top-level code, e.g. `s:Sender`
    pub code: String,
    /// Subcodes from outermost to innermost
    pub subcodes: Vec<String>,
    pub reason: String,
}

impl Fault {
    pub fn new(code: &str, subcodes: &[&str], reason: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            subcodes: subcodes.iter().map(|s| s.to_string()).collect(),
            reason: reason.into(),
        }
    }

    /// Fault caused by the request (bad argument, unknown token, ...)
    pub fn sender(subcodes: &[&str], reason: impl Into<String>) -> Self {
        Self::new(code::SENDER, subcodes, reason)
    }

    /// Fault caused by the receiving side
    pub fn receiver(subcodes: &[&str], reason: impl Into<String>) -> Self {
        Self::new(code::RECEIVER, subcodes, reason)
    }

    /// Innermost subcode, if any
    pub fn subcode(&self) -> Option<&str> {
        self.subcodes.last().map(String::as_str)
    }

    /// Whether any subcode has the given local name (prefix ignored).
    pub fn has_subcode(&self, name: &str) -> bool {
        let wanted = xml::local_name(name);
        self.subcodes.iter().any(|s| xml::local_name(s) == wanted)
    }

    pub fn is_sender(&self) -> bool {
        xml::local_name(&self.code) == "Sender" || xml::local_name(&self.code) == "Client"
    }

    /// Serialize as an `s:Fault` element (namespace prefixes are declared by
    /// the enclosing envelope).
    pub fn to_xml(&self) -> String {
        let mut w = XmlWriter::new();
        w.open("s:Fault").open("s:Code").leaf("s:Value", &self.code);
        for sub in &self.subcodes {
            w.open("s:Subcode").leaf("s:Value", sub);
        }
        for _ in &self.subcodes {
            w.close("s:Subcode");
        }
        w.close("s:Code")
            .open("s:Reason")
            .open_with("s:Text", &[("xml:lang", "en")])
            .raw(&xml::escape(&self.reason))
            .close("s:Text")
            .close("s:Reason")
            .close("s:Fault");
        w.finish()
    }

    /// Decode a `Fault` element. SOAP 1.1 `faultcode`/`faultstring` are
    /// accepted when the 1.2 structure is absent.
    pub fn from_element(el: &Element) -> Self {
        if let Some(code_el) = xml::child(el, "s:Code") {
            let code = xml::child_text(code_el, "s:Value").unwrap_or_default();
            let mut subcodes = Vec::new();
            let mut current = xml::child(code_el, "s:Subcode");
            while let Some(sub) = current {
                if let Some(value) = xml::child_text(sub, "s:Value") {
                    subcodes.push(value);
                }
                current = xml::child(sub, "s:Subcode");
            }
            let reason = xml::child(el, "s:Reason")
                .and_then(|r| xml::child_text(r, "s:Text"))
                .unwrap_or_default();
            return Self {
                code,
                subcodes,
                reason,
            };
        }

        Self {
            code: xml::child_text(el, "faultcode").unwrap_or_default(),
            subcodes: Vec::new(),
            reason: xml::child_text(el, "faultstring").unwrap_or_default(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(sub) = self.subcode() {
            write!(f, "/{}", sub)?;
        }
        if !self.reason.is_empty() {
            write!(f, ": {}", self.reason)?;
        }
        Ok(())
    }
}
