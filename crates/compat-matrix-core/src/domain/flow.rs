//! Flow-level value types: traffic legs, observations, flow tuples and
//! combination keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the four directed hops through the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficLeg {
    ClientToProxy,
    ProxyToServer,
    ServerToProxy,
    ProxyToClient,
}

impl TrafficLeg {
    /// All legs in request-then-response order.
    pub const ALL: [TrafficLeg; 4] = [
        TrafficLeg::ClientToProxy,
        TrafficLeg::ProxyToServer,
        TrafficLeg::ServerToProxy,
        TrafficLeg::ProxyToClient,
    ];

    /// Counter family carrying this leg's message count.
    ///
    /// Families may be exported with a vendor prefix
    /// (`kroxylicious_client_to_proxy_request_total`); the decoder matches on
    /// the suffix.
    pub fn family(&self) -> &'static str {
        match self {
            TrafficLeg::ClientToProxy => "client_to_proxy_request_total",
            TrafficLeg::ProxyToServer => "proxy_to_server_request_total",
            TrafficLeg::ServerToProxy => "server_to_proxy_response_total",
            TrafficLeg::ProxyToClient => "proxy_to_client_response_total",
        }
    }

    /// Resolve a metric family name (with or without prefix) to a leg.
    pub fn from_family(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|leg| {
            let family = leg.family();
            name == family
                || name
                    .strip_suffix(family)
                    .is_some_and(|prefix| prefix.ends_with('_'))
        })
    }
}

impl fmt::Display for TrafficLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrafficLeg::ClientToProxy => "client->proxy",
            TrafficLeg::ProxyToServer => "proxy->server",
            TrafficLeg::ServerToProxy => "server->proxy",
            TrafficLeg::ProxyToClient => "proxy->client",
        };
        f.write_str(s)
    }
}

/// Which side of the proxy an error counter reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSide {
    Client,
    Upstream,
}

const ERROR_FAMILIES: [(&str, ErrorSide); 4] = [
    ("client_to_proxy_errors_total", ErrorSide::Client),
    ("client_connection_failures_total", ErrorSide::Client),
    ("upstream_connection_failures_total", ErrorSide::Upstream),
    ("proxy_to_upstream_errors_total", ErrorSide::Upstream),
];

impl ErrorSide {
    /// Resolve an error counter family (with or without prefix).
    pub fn from_family(name: &str) -> Option<Self> {
        ERROR_FAMILIES
            .iter()
            .find(|(family, _)| {
                name == *family
                    || name
                        .strip_suffix(family)
                        .is_some_and(|prefix| prefix.ends_with('_'))
            })
            .map(|(_, side)| *side)
    }
}

/// Error counters summed over a snapshot. Display only: never part of the
/// balance rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorTotals {
    pub client: f64,
    pub upstream: f64,
}

impl ErrorTotals {
    pub fn add(&mut self, side: ErrorSide, value: f64) {
        match side {
            ErrorSide::Client => self.client += value,
            ErrorSide::Upstream => self.upstream += value,
        }
    }

    pub fn merged(self, other: ErrorTotals) -> ErrorTotals {
        ErrorTotals {
            client: self.client + other.client,
            upstream: self.upstream + other.upstream,
        }
    }

    pub fn total(&self) -> f64 {
        self.client + self.upstream
    }
}

/// One decoded counter sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Protocol operation name as exported (e.g. `produce`).
    pub operation: String,

    /// Operation version label, kept verbatim.
    pub operation_version: String,

    /// Proxy node that reported the sample, if labelled.
    pub node: Option<String>,

    /// Isolation group (`virtual_cluster` label).
    pub group: String,

    /// Which hop the counter measures.
    pub leg: TrafficLeg,

    /// Cumulative counter reading.
    pub value: f64,
}

impl Observation {
    /// The flow tuple this sample contributes to. Node identity is dropped.
    pub fn flow(&self) -> FlowTuple {
        FlowTuple {
            operation: self.operation.clone(),
            operation_version: self.operation_version.clone(),
            group: self.group.clone(),
        }
    }
}

/// Unit of balance evaluation: (operation, operation version, isolation group).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowTuple {
    pub operation: String,
    pub operation_version: String,
    pub group: String,
}

impl FlowTuple {
    pub fn new(
        operation: impl Into<String>,
        operation_version: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            operation_version: operation_version.into(),
            group: group.into(),
        }
    }
}

impl fmt::Display for FlowTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{} [{}]",
            self.operation, self.operation_version, self.group
        )
    }
}

/// Accumulated totals for the four legs of one flow tuple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LegTotals {
    pub client_to_proxy: f64,
    pub proxy_to_server: f64,
    pub server_to_proxy: f64,
    pub proxy_to_client: f64,
}

impl LegTotals {
    /// Add a reading to the given leg.
    pub fn add(&mut self, leg: TrafficLeg, value: f64) {
        match leg {
            TrafficLeg::ClientToProxy => self.client_to_proxy += value,
            TrafficLeg::ProxyToServer => self.proxy_to_server += value,
            TrafficLeg::ServerToProxy => self.server_to_proxy += value,
            TrafficLeg::ProxyToClient => self.proxy_to_client += value,
        }
    }

    /// Leg-wise sum of two totals.
    pub fn merged(self, other: LegTotals) -> LegTotals {
        LegTotals {
            client_to_proxy: self.client_to_proxy + other.client_to_proxy,
            proxy_to_server: self.proxy_to_server + other.proxy_to_server,
            server_to_proxy: self.server_to_proxy + other.server_to_proxy,
            proxy_to_client: self.proxy_to_client + other.proxy_to_client,
        }
    }

    pub fn request_in(&self) -> f64 {
        self.client_to_proxy
    }

    pub fn request_out(&self) -> f64 {
        self.proxy_to_server
    }

    pub fn response_in(&self) -> f64 {
        self.server_to_proxy
    }

    pub fn response_out(&self) -> f64 {
        self.proxy_to_client
    }
}

/// Unit of final reporting: one client version paired with one server version.
///
/// Version tokens are opaque strings; they are never parsed as semver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CombinationKey {
    pub client_version: String,
    pub server_version: String,
}

impl CombinationKey {
    pub fn new(client_version: impl Into<String>, server_version: impl Into<String>) -> Self {
        Self {
            client_version: client_version.into(),
            server_version: server_version.into(),
        }
    }
}

impl fmt::Display for CombinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "client {} / server {}",
            self.client_version, self.server_version
        )
    }
}

/// Transport/authentication mode an evidence directory belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportMode {
    Plaintext,
    Ssl,
    Sasl,
}

impl TransportMode {
    /// Classify a group or directory name by substring.
    ///
    /// `sasl` wins over `ssl` so that `sasl_ssl` lands in SASL.
    pub fn classify(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.contains("sasl") {
            TransportMode::Sasl
        } else if lower.contains("ssl") {
            TransportMode::Ssl
        } else {
            TransportMode::Plaintext
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportMode::Plaintext => "PLAINTEXT",
            TransportMode::Ssl => "SSL",
            TransportMode::Sasl => "SASL",
        };
        f.write_str(s)
    }
}
