use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

// ===== WIRE TYPES =====

/// Payload of one `data:` line on a node's `/sent` stream.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SentWire {
    #[serde(default)]
    pub message: serde_json::Value,
    pub to_addr: String,
    pub time_sent: String,
    pub id: String,
}

/// Payload of one `data:` line on a node's `/recv` stream.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecvWire {
    #[serde(default)]
    pub message: serde_json::Value,
    pub from_addr: String,
    pub time_recv: String,
    pub id: String,
}

impl SentWire {
    pub fn decode(data: &str) -> Result<Self, WireError> {
        serde_json::from_str(data).map_err(WireError::Json)
    }

    pub fn timestamp(&self) -> Result<Timestamp, WireError> {
        self.time_sent.parse()
    }
}

impl RecvWire {
    pub fn decode(data: &str) -> Result<Self, WireError> {
        serde_json::from_str(data).map_err(WireError::Json)
    }

    pub fn timestamp(&self) -> Result<Timestamp, WireError> {
        self.time_recv.parse()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("malformed event payload: {0}")]
    Json(#[source] serde_json::Error),
    #[error("malformed timestamp '{0}'")]
    Timestamp(String),
}

/// Which of a node's two event streams a payload came from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Sent,
    Recv,
}

impl StreamKind {
    pub fn path(self) -> &'static str {
        match self {
            StreamKind::Sent => "sent",
            StreamKind::Recv => "recv",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

// ===== TIMESTAMPS =====

/// Number of leading digits kept from a wire timestamp. Proxies emit
/// microseconds (16 digits) or milliseconds (13 digits); everything past the
/// 13th digit is dropped so all streams share millisecond resolution.
pub const TIMESTAMP_DIGITS: usize = 13;

/// Millisecond timestamp of one half-event.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn millis(self) -> u64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64
    }

    pub fn abs_diff(self, other: Timestamp) -> u64 {
        self.0.abs_diff(other.0)
    }
}

impl FromStr for Timestamp {
    type Err = WireError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let digits = raw.trim();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(WireError::Timestamp(raw.to_string()));
        }
        let kept = &digits[..digits.len().min(TIMESTAMP_DIGITS)];
        kept.parse::<u64>()
            .map(Timestamp)
            .map_err(|_| WireError::Timestamp(raw.to_string()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ===== TOPOLOGY =====

/// Colors handed out by position when a node has none configured.
pub const FALLBACK_PALETTE: [&str; 10] = [
    "#FF6E6E", "#85DCFE", "#70FF8E", "#8BEDFF", "#B2C5FF", "#FFB2FE", "#FFB2BC", "#FFEBB2",
    "#B6FFB2", "#B2FFE7",
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub id: String,
    pub addr: String,
    pub proxy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl NodeConfig {
    pub fn stream_url(&self, kind: StreamKind) -> String {
        format!("{}/{}", self.proxy.trim_end_matches('/'), kind.path())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Topology {
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("invalid JSON topology: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML topology: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("topology lists no nodes")]
    NoNodes,
    #[error("node id '{0}' is declared twice")]
    DuplicateId(String),
    #[error("address '{0}' is declared by two nodes")]
    DuplicateAddr(String),
}

impl Topology {
    pub fn from_json_str(content: &str) -> Result<Self, TopologyError> {
        let topology: Topology = serde_json::from_str(content)?;
        topology.validate()?;
        Ok(topology)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, TopologyError> {
        let topology: Topology = toml::from_str(content)?;
        topology.validate()?;
        Ok(topology)
    }

    pub fn validate(&self) -> Result<(), TopologyError> {
        if self.nodes.is_empty() {
            return Err(TopologyError::NoNodes);
        }
        let mut ids = HashSet::new();
        let mut addrs = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(TopologyError::DuplicateId(node.id.clone()));
            }
            if !addrs.insert(node.addr.as_str()) {
                return Err(TopologyError::DuplicateAddr(node.addr.clone()));
            }
        }
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|node| node.id == id)
    }

    /// Configured color of a node, or its palette color by position.
    pub fn color_of(&self, id: &str) -> Option<String> {
        let position = self.position_of(id)?;
        let node = &self.nodes[position];
        Some(
            node.color
                .clone()
                .unwrap_or_else(|| FALLBACK_PALETTE[position % FALLBACK_PALETTE.len()].to_string()),
        )
    }

    pub fn address_book(&self) -> AddressBook {
        self.nodes
            .iter()
            .map(|node| (node.addr.clone(), node.id.clone()))
            .collect()
    }
}

/// Resolution table from a node's dial address to its id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressBook {
    by_addr: HashMap<String, String>,
}

impl AddressBook {
    pub fn resolve(&self, addr: &str) -> Option<&str> {
        self.by_addr.get(addr).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_addr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_addr.is_empty()
    }
}

impl FromIterator<(String, String)> for AddressBook {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut by_addr = HashMap::new();
        for (addr, id) in iter {
            // First declaration wins, matching `Topology::validate`.
            if let Entry::Vacant(slot) = by_addr.entry(addr) {
                slot.insert(id);
            }
        }
        AddressBook { by_addr }
    }
}

// ===== EXPORT =====

/// One flattened ledger entry, in export column order.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    pub message: serde_json::Value,
    pub from_node: String,
    pub to_node: String,
    pub time_sent: Timestamp,
    pub time_recv: Option<Timestamp>,
    pub id: String,
    pub color: String,
}

impl ExportRecord {
    pub const COLUMNS: [&'static str; 7] = [
        "message", "fromNode", "toNode", "timeSent", "timeRecv", "id", "color",
    ];
}
