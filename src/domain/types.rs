use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Namespace prefix stripped from generated entity names before reporting.
pub const GENERATED_PREFIX: &str = "be.gen.";

/// Credentials for a management endpoint that requires authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// How a monitored engine is reached: over the network, or by attaching
/// to a process running on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineIdentity {
    Remote { host: String, port: u16 },
    Local { pid: u32 },
}

/// Identity of one monitored engine. Immutable after construction; one
/// collector owns exactly one endpoint's connection.
#[derive(Debug, Clone)]
pub struct EngineEndpoint {
    pub name: String,
    pub identity: EngineIdentity,
    pub credentials: Option<Credentials>,
}

impl EngineEndpoint {
    pub fn remote(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        credentials: Option<Credentials>,
    ) -> Self {
        Self {
            name: name.into(),
            identity: EngineIdentity::Remote {
                host: host.into(),
                port,
            },
            credentials,
        }
    }

    pub fn local(pid: u32) -> Self {
        Self {
            name: format!("PID-{}", pid),
            identity: EngineIdentity::Local { pid },
            credentials: None,
        }
    }

    /// Key used to de-duplicate engines at configuration load.
    pub fn key(&self) -> String {
        match &self.identity {
            EngineIdentity::Remote { host, port } => format!("{}:{}", host, port),
            EngineIdentity::Local { pid } => format!("pid:{}", pid),
        }
    }

    /// Leading components of this engine's report filenames.
    pub fn file_stem(&self) -> String {
        match &self.identity {
            EngineIdentity::Remote { host, port } => {
                format!("{}_{}_{}", self.name, host, port)
            }
            EngineIdentity::Local { .. } => self.name.clone(),
        }
    }
}

impl fmt::Display for EngineEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identity {
            EngineIdentity::Remote { host, port } => {
                write!(f, "{} @ {}:{}", self.name, host, port)
            }
            EngineIdentity::Local { pid } => write!(f, "{} @ pid {}", self.name, pid),
        }
    }
}

/// Name of one managed object inside an engine, e.g.
/// `com.tibco.be:type=Agent,agentId=1,subType=Entity,entityId=be.gen.Order`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectIdentifier {
    raw: String,
}

impl ObjectIdentifier {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Value of a `key=value` property in the identifier, if present.
    pub fn property(&self, key: &str) -> Option<&str> {
        let props = self.raw.split_once(':').map(|(_, p)| p).unwrap_or(&self.raw);
        props.split(',').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == key).then_some(v)
        })
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Attribute name/value pairs fetched for one managed object.
pub type AttributeMap = HashMap<String, Value>;

/// Textual token an attribute value serializes to in a report row.
/// Absent values and explicit nulls both render as `null` so a missing
/// counter round-trips to the same token on every cycle.
pub fn attribute_token(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "null".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}

// Ordered column schemas, bit-compatible with downstream report consumers.
static ENTITY_CACHE_COLUMNS: &[&str] = &[
    "ClassName",
    "DateTime",
    "CacheSize",
    "GetAvgTime",
    "GetCount",
    "NumHandlesInStore",
    "PutAvgTime",
    "PutCount",
    "RemoveAvgTime",
    "RemoveCount",
    "TypeId",
];

static AGENT_ENTITY_COLUMNS: &[&str] = &[
    "DateTime",
    "AvgTimeInRTC",
    "AvgTimePostRTC",
    "AvgTimePreRTC",
    "CacheMode",
    "NumAssertedFromAgents",
    "NumAssertedFromChannel",
    "NumHitsInL1Cache",
    "NumMissesInL1Cache",
    "NumModifiedFromAgents",
    "NumModifiedFromChannel",
    "NumRecovered",
    "NumRetractedFromAgents",
    "NumRetractedFromChannel",
];

static TXN_MANAGER_COLUMNS: &[&str] = &[
    "DateTime",
    "AvgActionTxnMillis",
    "AvgCacheQueueWaitTimeMillis",
    "AvgCacheTxnMillis",
    "AvgDBOpsBatchSize",
    "AvgDBQueueWaitTimeMillis",
    "AvgDBTxnMillis",
    "AvgSuccessfulTxnTimeMillis",
    "LastDBBatchSize",
    "PendingActions",
    "PendingCacheWrites",
    "PendingDBWrites",
    "PendingEventsToAck",
    "PendingLocksToRelease",
    "TotalDBTxnsCompleted",
    "TotalErrors",
    "TotalSuccessfulTxns",
];

/// One of the fixed report kinds. Each category carries its own column
/// schema, object query, and display-name rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricCategory {
    EntityCache,
    AgentEntity,
    TxnManagerReport,
}

impl MetricCategory {
    pub fn all() -> Vec<MetricCategory> {
        vec![
            MetricCategory::EntityCache,
            MetricCategory::AgentEntity,
            MetricCategory::TxnManagerReport,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricCategory::EntityCache => "EntityCache",
            MetricCategory::AgentEntity => "AgentEntity",
            MetricCategory::TxnManagerReport => "TxnManagerReport",
        }
    }

    /// Ordered column schema for this category's report rows.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            MetricCategory::EntityCache => ENTITY_CACHE_COLUMNS,
            MetricCategory::AgentEntity => AGENT_ENTITY_COLUMNS,
            MetricCategory::TxnManagerReport => TXN_MANAGER_COLUMNS,
        }
    }

    /// Whether the header carries a separate leading `Object` column.
    /// EntityCache does not: its identifier column is the first schema
    /// column (`ClassName`).
    pub fn has_object_column(&self) -> bool {
        !matches!(self, MetricCategory::EntityCache)
    }

    /// Delta-style categories are reset on the engine after every
    /// successful read so the next read reports a fresh window.
    pub fn is_delta(&self) -> bool {
        matches!(self, MetricCategory::TxnManagerReport)
    }

    /// Object query pattern selecting this category's managed objects.
    pub fn query_pattern(&self) -> &'static str {
        match self {
            MetricCategory::EntityCache => "com.tibco.be:service=Cache,name=*",
            MetricCategory::AgentEntity => {
                "com.tibco.be:type=Agent,agentId=*,subType=Entity,entityId=*"
            }
            MetricCategory::TxnManagerReport => "com.tibco.be:service=RTCTxnManagerReport",
        }
    }

    /// Header line for a newly created report file.
    pub fn header(&self) -> String {
        let columns = self.columns().join(",");
        if self.has_object_column() {
            format!("Object,{}", columns)
        } else {
            columns
        }
    }

    /// Short label for an object before its attributes are known; used in
    /// row-level diagnostics.
    pub fn entity_label(&self, id: &ObjectIdentifier) -> String {
        let label = match self {
            MetricCategory::EntityCache => id.property("name"),
            MetricCategory::AgentEntity => id.property("entityId"),
            MetricCategory::TxnManagerReport => Some(self.as_str()),
        };
        label.unwrap_or(id.as_str()).to_string()
    }

    /// Display name an object reports under, with the generated-namespace
    /// prefix stripped. `None` means the object carries no usable name and
    /// its row is skipped.
    pub fn display_name(&self, id: &ObjectIdentifier, attrs: &AttributeMap) -> Option<String> {
        let name = match self {
            MetricCategory::EntityCache => attrs.get("ClassName")?.as_str()?.to_string(),
            MetricCategory::AgentEntity => id.property("entityId")?.to_string(),
            MetricCategory::TxnManagerReport => return Some(self.as_str().to_string()),
        };
        Some(
            name.strip_prefix(GENERATED_PREFIX)
                .map(str::to_string)
                .unwrap_or(name),
        )
    }
}

impl FromStr for MetricCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EntityCache" => Ok(MetricCategory::EntityCache),
            "AgentEntity" => Ok(MetricCategory::AgentEntity),
            "TxnManagerReport" => Ok(MetricCategory::TxnManagerReport),
            _ => Err(anyhow!(
                "Invalid report type: '{}'. Valid options: EntityCache, AgentEntity, TxnManagerReport",
                s
            )),
        }
    }
}

impl fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_str() {
        assert_eq!(
            MetricCategory::from_str("EntityCache").unwrap(),
            MetricCategory::EntityCache
        );
        assert_eq!(
            MetricCategory::from_str("AgentEntity").unwrap(),
            MetricCategory::AgentEntity
        );
        assert_eq!(
            MetricCategory::from_str("TxnManagerReport").unwrap(),
            MetricCategory::TxnManagerReport
        );
        assert!(MetricCategory::from_str("Channels").is_err());
    }

    #[test]
    fn test_headers() {
        assert!(
            MetricCategory::EntityCache
                .header()
                .starts_with("ClassName,DateTime,CacheSize")
        );
        assert!(
            MetricCategory::AgentEntity
                .header()
                .starts_with("Object,DateTime,AvgTimeInRTC")
        );
        assert!(
            MetricCategory::TxnManagerReport
                .header()
                .starts_with("Object,DateTime,AvgActionTxnMillis")
        );
    }

    #[test]
    fn test_object_identifier_property() {
        let id = ObjectIdentifier::new(
            "com.tibco.be:type=Agent,agentId=1,subType=Entity,entityId=be.gen.Order",
        );
        assert_eq!(id.property("entityId"), Some("be.gen.Order"));
        assert_eq!(id.property("agentId"), Some("1"));
        assert_eq!(id.property("name"), None);
    }

    #[test]
    fn test_display_name_strips_generated_prefix() {
        let id = ObjectIdentifier::new(
            "com.tibco.be:type=Agent,agentId=1,subType=Entity,entityId=be.gen.OrderLine",
        );
        let name = MetricCategory::AgentEntity
            .display_name(&id, &AttributeMap::new())
            .unwrap();
        assert_eq!(name, "OrderLine");

        let id = ObjectIdentifier::new("com.tibco.be:service=Cache,name=Order");
        let mut attrs = AttributeMap::new();
        attrs.insert("ClassName".to_string(), json!("be.gen.Order"));
        let name = MetricCategory::EntityCache.display_name(&id, &attrs).unwrap();
        assert_eq!(name, "Order");
    }

    #[test]
    fn test_display_name_missing_class_name() {
        let id = ObjectIdentifier::new("com.tibco.be:service=Cache,name=Order");
        assert!(
            MetricCategory::EntityCache
                .display_name(&id, &AttributeMap::new())
                .is_none()
        );
    }

    #[test]
    fn test_attribute_token() {
        assert_eq!(attribute_token(None), "null");
        assert_eq!(attribute_token(Some(&Value::Null)), "null");
        assert_eq!(attribute_token(Some(&json!("Memory"))), "Memory");
        assert_eq!(attribute_token(Some(&json!(42))), "42");
        assert_eq!(attribute_token(Some(&json!(1.5))), "1.5");
        assert_eq!(attribute_token(Some(&json!(true))), "true");
    }

    #[test]
    fn test_endpoint_file_stem() {
        let remote = EngineEndpoint::remote("BE", "host1", 5555, None);
        assert_eq!(remote.file_stem(), "BE_host1_5555");

        let local = EngineEndpoint::local(4242);
        assert_eq!(local.name, "PID-4242");
        assert_eq!(local.file_stem(), "PID-4242");
    }
}
