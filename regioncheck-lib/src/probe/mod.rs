use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use http::{Method, StatusCode};
use serde::{Serialize, Serializer};

pub mod evaluator;
pub mod executor;
pub mod selector;

pub use evaluator::Evaluator;
pub use executor::{AnyBatchExecutor, BatchExecutor, TransportError};

/// An egress path owned by the host. The evaluator only uses it as a label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Outbound(Arc<str>);

impl Outbound {
    pub fn new<T: Into<Arc<str>>>(tag: T) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Outbound {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for Outbound {
    fn from(tag: String) -> Self {
        Self::new(tag)
    }
}

impl Serialize for Outbound {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// A single HTTP probe routed through one outbound.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRequest {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub body: Option<String>,
    /// Return the first 3xx response as is instead of following it.
    pub disable_redirect: bool,
    pub outbound: Outbound,
    /// Index of the service template this request was built from.
    pub probe: usize,
    pub timeout: Option<Duration>,
}

/// Latency is compared at millisecond resolution.
pub fn whole_millis(cost: Duration) -> Duration {
    Duration::from_millis(u64::try_from(cost.as_millis()).unwrap_or(u64::MAX))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReply {
    pub status: StatusCode,
    /// Multi-valued headers are joined with `", "`.
    pub headers: HashMap<String, String>,
    pub body: String,
    pub cost: Duration,
}

impl ProbeReply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The answer to one [`ProbeRequest`], tagged with the request's outbound and
/// probe index so results never depend on batch ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResponse {
    pub outbound: Outbound,
    pub probe: usize,
    pub reply: Result<ProbeReply, String>,
}

impl ProbeResponse {
    pub fn ok(&self) -> Option<&ProbeReply> {
        self.reply.as_ref().ok()
    }

    pub fn error(&self) -> Option<&str> {
        self.reply.as_ref().err().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    Yes,
    Blocked,
    OriginalsOnly,
    Failed,
    /// Served the mainland China mirror.
    Mirror,
    Global,
    /// Region code derived from the service response, e.g. `US`.
    Region(String),
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Yes => f.write_str("Yes"),
            Category::Blocked => f.write_str("Blocked"),
            Category::OriginalsOnly => f.write_str("Originals Only"),
            Category::Failed => f.write_str("Failed"),
            Category::Mirror => f.write_str("CN"),
            Category::Global => f.write_str("Global"),
            Category::Region(code) => f.write_str(code),
        }
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn serialize_millis<S: Serializer>(
    cost: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(cost.as_micros() as f64 / 1000.0)
}

fn serialize_statuses<S: Serializer>(
    statuses: &[StatusCode],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(statuses.iter().map(|s| s.as_u16()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub category: Category,
    pub allowed: bool,
    #[serde(rename = "cost_ms", serialize_with = "serialize_millis")]
    pub cost: Duration,
    #[serde(serialize_with = "serialize_statuses")]
    pub statuses: Vec<StatusCode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// A required probe failed at the transport level.
    Excluded(String),
    Classified(Classification),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundReport {
    pub outbound: Outbound,
    pub outcome: Outcome,
}

impl OutboundReport {
    pub fn classification(&self) -> Option<&Classification> {
        match &self.outcome {
            Outcome::Classified(c) => Some(c),
            Outcome::Excluded(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub service: String,
    pub selected: Outbound,
    pub classification: Classification,
    pub reports: Vec<OutboundReport>,
}

impl Selection {
    pub fn report(&self, outbound: &str) -> Option<&OutboundReport> {
        self.reports.iter().find(|r| r.outbound.as_str() == outbound)
    }
}
