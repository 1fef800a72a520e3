use udplink::{HostError, PacketError, ResolveError};

/// Every failure a native function can raise into the script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("{0}")]
    MalformedAddress(&'static str),
    #[error("Failed to resolve host name: {0}")]
    ResolutionFailure(#[source] ResolveError),
    #[error("Unknown packet flag {0}")]
    InvalidFlag(i64),
    #[error("Failed to create packet: {0}")]
    AllocationFailure(#[source] PacketError),
    #[error("wrong number of parameters to {op}: got {got}, expected {expected}")]
    ArityMismatch {
        op: &'static str,
        got: usize,
        expected: String,
    },
    #[error("{0}")]
    TypeMismatch(String),
    #[error("{0} constructor is protected")]
    ConstructionForbidden(&'static str),
    #[error("Could not find peer index")]
    IndexNotFound,
    #[error("Failed to create peer: {0}")]
    PeerCreationFailure(#[source] HostError),
    #[error("Error checking network event: {0}")]
    EventCheckFailure(#[source] HostError),
    #[error("Error during network servicing: {0}")]
    ServiceFailure(#[source] HostError),
    #[error("{0} handle is stale")]
    StaleHandle(&'static str),
    #[error("no member named `{0}`")]
    UnknownMember(String),
}

impl ScriptError {
    pub fn is_arity_mismatch(&self) -> bool {
        matches!(self, ScriptError::ArityMismatch { .. })
    }
}
