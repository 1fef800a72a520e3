use std::collections::BTreeMap;
use std::fmt;

use udplink::PeerId;

/// String-keyed table, the shape of every record handed to scripts.
pub type Table = BTreeMap<String, Value>;

/// Opaque handle to a host living in a `Context`. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostRef(pub(crate) u64);

/// Opaque handle to one slot of a host's peer table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerRef {
    pub(crate) host: HostRef,
    pub(crate) slot: PeerId,
}

impl PeerRef {
    pub fn host(&self) -> HostRef {
        self.host
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    /// Script strings are byte strings; payloads need not be UTF-8.
    String(Vec<u8>),
    Table(Table),
    Host(HostRef),
    Peer(PeerRef),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Host(_) => "Host",
            Value::Peer(_) => "Peer",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Looks up `key` when `self` is a table.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Table(table) => table.get(key),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_peer(&self) -> Option<PeerRef> {
        match self {
            Value::Peer(peer) => Some(*peer),
            _ => None,
        }
    }

    pub fn as_host(&self) -> Option<HostRef> {
        match self {
            Value::Host(host) => Some(*host),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(value) => write!(f, "{}", value),
            Value::Integer(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{}", value),
            Value::String(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
            Value::Table(table) => write!(f, "table({} entries)", table.len()),
            Value::Host(host) => write!(f, "Host#{}", host.0),
            Value::Peer(peer) => write!(f, "Peer#{}.{}", peer.host.0, peer.slot),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value.into_bytes())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::String(value)
    }
}

impl From<Table> for Value {
    fn from(value: Table) -> Self {
        Value::Table(value)
    }
}

impl From<HostRef> for Value {
    fn from(value: HostRef) -> Self {
        Value::Host(value)
    }
}

impl From<PeerRef> for Value {
    fn from(value: PeerRef) -> Self {
        Value::Peer(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
