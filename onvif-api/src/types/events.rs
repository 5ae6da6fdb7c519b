//! Event service types: topic properties and pull-point subscriptions
//!
//! `Renew` and `Unsubscribe` belong to WS-BaseNotification, so their
//! elements live in the `wsnt` namespace. Both, like `PullMessages`, are sent
//! to the subscription reference address rather than the event service.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use onvif_soap::envelope::ns;
use onvif_soap::time;
use onvif_soap::xml::{self, XmlWriter};
use onvif_soap::SoapError;
use serde::{Deserialize, Serialize};
use xmltree::Element;

use crate::operation::{Empty, Validate, ValidationError, XmlBody};

pub const CONCRETE_SET_DIALECT: &str = "http://www.onvif.org/ver10/tev/topicExpression/ConcreteSet";
pub const MESSAGE_CONTENT_DIALECT: &str = "http://www.onvif.org/ver10/tev/messageContentFilter/ItemFilter";

/// Requested or reported end of a subscription. Devices accept either a
/// relative `xs:duration` or an absolute `xs:dateTime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationTime {
    Relative(Duration),
    Absolute(DateTime<Utc>),
}

impl TerminationTime {
    pub fn parse(raw: &str) -> Result<Self, SoapError> {
        let raw = raw.trim();
        if raw.starts_with('P') || raw.starts_with("-P") {
            time::parse_duration(raw).map(TerminationTime::Relative)
        } else {
            time::parse_datetime(raw).map(TerminationTime::Absolute)
        }
    }

    /// Resolve against `now`. An absolute time in the past yields zero.
    pub fn duration_from(&self, now: DateTime<Utc>) -> Duration {
        match self {
            TerminationTime::Relative(d) => *d,
            TerminationTime::Absolute(at) => (*at - now).to_std().unwrap_or(Duration::ZERO),
        }
    }
}

impl fmt::Display for TerminationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationTime::Relative(d) => f.write_str(&time::format_duration(*d)),
            TerminationTime::Absolute(at) => f.write_str(&time::format_datetime(*at)),
        }
    }
}

/// Whether a property event reports the initial, a changed or a removed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyOperation {
    Initialized,
    Changed,
    Deleted,
}

impl PropertyOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyOperation::Initialized => "Initialized",
            PropertyOperation::Changed => "Changed",
            PropertyOperation::Deleted => "Deleted",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Initialized" => Some(PropertyOperation::Initialized),
            "Changed" => Some(PropertyOperation::Changed),
            "Deleted" => Some(PropertyOperation::Deleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleItem {
    pub name: String,
    pub value: String,
}

impl SimpleItem {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

fn write_items(w: &mut XmlWriter, name: &str, items: &[SimpleItem]) {
    if items.is_empty() {
        return;
    }
    w.open(name);
    for item in items {
        w.empty(
            "tt:SimpleItem",
            &[("Name", item.name.as_str()), ("Value", item.value.as_str())],
        );
    }
    w.close(name);
}

fn read_items(el: &Element, name: &str) -> Vec<SimpleItem> {
    xml::child(el, name)
        .map(|items| {
            xml::children(items, "tt:SimpleItem")
                .filter_map(|item| {
                    Some(SimpleItem::new(xml::attr(item, "Name")?, xml::attr(item, "Value")?))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// Concrete topic path, e.g. `tns1:VideoSource/MotionAlarm`
    pub topic: String,
    pub property_operation: Option<PropertyOperation>,
    pub utc_time: DateTime<Utc>,
    pub source: Vec<SimpleItem>,
    pub data: Vec<SimpleItem>,
}

impl NotificationMessage {
    pub fn new(topic: impl Into<String>, utc_time: DateTime<Utc>) -> Self {
        Self {
            topic: topic.into(),
            property_operation: None,
            utc_time,
            source: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn with_source(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.source.push(SimpleItem::new(name, value));
        self
    }

    pub fn with_data(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.push(SimpleItem::new(name, value));
        self
    }

    pub fn with_operation(mut self, operation: PropertyOperation) -> Self {
        self.property_operation = Some(operation);
        self
    }

    /// Value of a data item by name
    pub fn data_value(&self, name: &str) -> Option<&str> {
        self.data
            .iter()
            .find(|item| item.name == name)
            .map(|item| item.value.as_str())
    }

    pub(crate) fn write(&self, w: &mut XmlWriter) {
        let utc = time::format_datetime(self.utc_time);
        let mut attrs = vec![("UtcTime", utc.as_str())];
        if let Some(op) = self.property_operation {
            attrs.push(("PropertyOperation", op.as_str()));
        }
        w.open("wsnt:NotificationMessage")
            .open_with("wsnt:Topic", &[("Dialect", CONCRETE_SET_DIALECT)])
            .raw(&xml::escape(&self.topic))
            .close("wsnt:Topic")
            .open("wsnt:Message")
            .open_with("tt:Message", &attrs);
        write_items(w, "tt:Source", &self.source);
        write_items(w, "tt:Data", &self.data);
        w.close("tt:Message")
            .close("wsnt:Message")
            .close("wsnt:NotificationMessage");
    }

    pub(crate) fn read(el: &Element) -> Result<Self, SoapError> {
        let message = xml::require_child(xml::require_child(el, "wsnt:Message")?, "tt:Message")?;
        let utc_time = match xml::attr(message, "UtcTime") {
            Some(raw) => time::parse_datetime(raw)?,
            None => return Err(SoapError::MissingElement("Message/@UtcTime".to_string())),
        };
        Ok(Self {
            topic: xml::require_text(el, "wsnt:Topic")?,
            property_operation: xml::attr(message, "PropertyOperation").and_then(PropertyOperation::parse),
            utc_time,
            source: read_items(message, "tt:Source"),
            data: read_items(message, "tt:Data"),
        })
    }
}

/// Topics and dialects the event service advertises
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventProperties {
    pub topic_namespace_locations: Vec<String>,
    pub fixed_topic_set: bool,
    /// Topic paths, first segment prefixed (`tns1:Device/Trigger/Relay`)
    pub topics: Vec<String>,
    pub topic_expression_dialects: Vec<String>,
    pub message_content_filter_dialects: Vec<String>,
}

#[derive(Default)]
struct TopicNode {
    leaf: bool,
    children: BTreeMap<String, TopicNode>,
}

impl TopicNode {
    fn insert(&mut self, path: &str) {
        let mut node = self;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.leaf = true;
    }

    fn write(&self, w: &mut XmlWriter) {
        for (name, node) in &self.children {
            if node.leaf {
                w.open_with(name, &[("wstop:topic", "true")]);
            } else {
                w.open(name);
            }
            node.write(w);
            w.close(name);
        }
    }
}

fn collect_topics(el: &Element, prefix: &str, out: &mut Vec<String>) {
    for child in el.children.iter().filter_map(|n| n.as_element()) {
        let segment = match (&child.prefix, prefix.is_empty()) {
            (Some(p), true) => format!("{}:{}", p, child.name),
            _ => child.name.clone(),
        };
        let path = if prefix.is_empty() {
            segment
        } else {
            format!("{}/{}", prefix, segment)
        };
        let has_children = child.children.iter().any(|n| n.as_element().is_some());
        let marked = xml::attr(child, "topic").and_then(xml::parse_bool).unwrap_or(false);
        if child.name == "MessageDescription" {
            continue;
        }
        if marked || !has_children {
            out.push(path.clone());
        }
        if has_children {
            collect_topics(child, &path, out);
        }
    }
}

impl XmlBody for EventProperties {
    fn write_xml(&self, w: &mut XmlWriter) {
        for location in &self.topic_namespace_locations {
            w.leaf("tev:TopicNamespaceLocation", location);
        }
        w.leaf("wsnt:FixedTopicSet", xml::bool_str(self.fixed_topic_set));
        let mut root = TopicNode::default();
        for topic in &self.topics {
            root.insert(topic);
        }
        w.open("wstop:TopicSet");
        root.write(w);
        w.close("wstop:TopicSet");
        for dialect in &self.topic_expression_dialects {
            w.leaf("wsnt:TopicExpressionDialect", dialect);
        }
        for dialect in &self.message_content_filter_dialects {
            w.leaf("tev:MessageContentFilterDialect", dialect);
        }
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        let mut topics = Vec::new();
        if let Some(set) = xml::child(el, "wstop:TopicSet") {
            collect_topics(set, "", &mut topics);
        }
        let texts = |name: &str| xml::children(el, name).map(xml::text).collect::<Vec<_>>();
        Ok(Self {
            topic_namespace_locations: xml::children(el, "tev:TopicNamespaceLocation")
                .map(xml::text)
                .collect(),
            fixed_topic_set: xml::child_flag(el, "wsnt:FixedTopicSet"),
            topics,
            topic_expression_dialects: texts("wsnt:TopicExpressionDialect"),
            message_content_filter_dialects: texts("tev:MessageContentFilterDialect"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePullPointSubscriptionRequest {
    /// Concrete-set topic expression
    pub filter: Option<String>,
    pub initial_termination_time: Option<TerminationTime>,
}

impl CreatePullPointSubscriptionRequest {
    pub fn with_duration(duration: Duration) -> Self {
        Self {
            filter: None,
            initial_termination_time: Some(TerminationTime::Relative(duration)),
        }
    }
}

impl XmlBody for CreatePullPointSubscriptionRequest {
    fn write_xml(&self, w: &mut XmlWriter) {
        if let Some(filter) = &self.filter {
            w.open("tev:Filter")
                .open_with("wsnt:TopicExpression", &[("Dialect", CONCRETE_SET_DIALECT)])
                .raw(&xml::escape(filter))
                .close("wsnt:TopicExpression")
                .close("tev:Filter");
        }
        w.leaf_opt("tev:InitialTerminationTime", self.initial_termination_time);
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        let filter = xml::child(el, "tev:Filter")
            .and_then(|f| xml::child_text(f, "wsnt:TopicExpression"))
            .filter(|f| !f.is_empty());
        let initial_termination_time = match xml::child_text(el, "tev:InitialTerminationTime") {
            Some(raw) if !raw.is_empty() => Some(TerminationTime::parse(&raw)?),
            _ => None,
        };
        Ok(Self {
            filter,
            initial_termination_time,
        })
    }
}

impl Validate for CreatePullPointSubscriptionRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePullPointSubscriptionResponse {
    /// Subscription manager address; `PullMessages`, `Renew` and
    /// `Unsubscribe` go here
    pub address: String,
    pub current_time: DateTime<Utc>,
    pub termination_time: DateTime<Utc>,
}

impl XmlBody for CreatePullPointSubscriptionResponse {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.open("tev:SubscriptionReference")
            .leaf("wsa:Address", &self.address)
            .close("tev:SubscriptionReference")
            .leaf("wsnt:CurrentTime", time::format_datetime(self.current_time))
            .leaf("wsnt:TerminationTime", time::format_datetime(self.termination_time));
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        let reference = xml::require_child(el, "tev:SubscriptionReference")?;
        Ok(Self {
            address: xml::require_text(reference, "wsa:Address")?,
            current_time: time::parse_datetime(&xml::require_text(el, "wsnt:CurrentTime")?)?,
            termination_time: time::parse_datetime(&xml::require_text(el, "wsnt:TerminationTime")?)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullMessagesRequest {
    /// Longest time the device may hold the request open
    pub timeout: Duration,
    pub message_limit: u32,
}

impl PullMessagesRequest {
    pub fn new(timeout: Duration, message_limit: u32) -> Self {
        Self {
            timeout,
            message_limit,
        }
    }
}

impl XmlBody for PullMessagesRequest {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.leaf("tev:Timeout", time::format_duration(self.timeout))
            .leaf("tev:MessageLimit", self.message_limit);
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        Ok(Self {
            timeout: time::parse_duration(&xml::require_text(el, "tev:Timeout")?)?,
            message_limit: xml::require_parsed(el, "tev:MessageLimit")?,
        })
    }
}

impl Validate for PullMessagesRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.message_limit == 0 {
            return Err(ValidationError::range_error("MessageLimit", 1, u32::MAX, 0));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullMessagesResponse {
    pub current_time: DateTime<Utc>,
    pub termination_time: DateTime<Utc>,
    pub messages: Vec<NotificationMessage>,
}

impl XmlBody for PullMessagesResponse {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.leaf("tev:CurrentTime", time::format_datetime(self.current_time))
            .leaf("tev:TerminationTime", time::format_datetime(self.termination_time));
        for message in &self.messages {
            message.write(w);
        }
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        Ok(Self {
            current_time: time::parse_datetime(&xml::require_text(el, "tev:CurrentTime")?)?,
            termination_time: time::parse_datetime(&xml::require_text(el, "tev:TerminationTime")?)?,
            messages: xml::children(el, "wsnt:NotificationMessage")
                .map(NotificationMessage::read)
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewRequest {
    pub termination_time: TerminationTime,
}

impl XmlBody for RenewRequest {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.leaf("wsnt:TerminationTime", self.termination_time);
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        Ok(Self {
            termination_time: TerminationTime::parse(&xml::require_text(el, "wsnt:TerminationTime")?)?,
        })
    }
}

impl Validate for RenewRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewResponse {
    pub termination_time: DateTime<Utc>,
    pub current_time: Option<DateTime<Utc>>,
}

impl XmlBody for RenewResponse {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.leaf("wsnt:TerminationTime", time::format_datetime(self.termination_time))
            .leaf_opt("wsnt:CurrentTime", self.current_time.map(time::format_datetime));
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        let current_time = match xml::child_text(el, "wsnt:CurrentTime") {
            Some(raw) if !raw.is_empty() => Some(time::parse_datetime(&raw)?),
            _ => None,
        };
        Ok(Self {
            termination_time: time::parse_datetime(&xml::require_text(el, "wsnt:TerminationTime")?)?,
            current_time,
        })
    }
}

crate::define_onvif_operation! {
    operation: GetEventProperties,
    service: Events,
    request: Empty,
    response: EventProperties,
}

crate::define_onvif_operation! {
    operation: CreatePullPointSubscription,
    service: Events,
    request: CreatePullPointSubscriptionRequest,
    response: CreatePullPointSubscriptionResponse,
}

crate::define_onvif_operation! {
    operation: PullMessages,
    service: Events,
    request: PullMessagesRequest,
    response: PullMessagesResponse,
}

crate::define_onvif_operation! {
    operation: Renew,
    service: Events,
    namespace: ns::WSNT, prefix: "wsnt",
    request: RenewRequest,
    response: RenewResponse,
}

crate::define_onvif_operation! {
    operation: Unsubscribe,
    service: Events,
    namespace: ns::WSNT, prefix: "wsnt",
    request: Empty,
    response: Empty,
}
