use std::collections::BTreeMap;

use crate::bind::Args;
use crate::config::BindingConfig;
use crate::context::Context;
use crate::error::ScriptError;
use crate::event::{EVENT_TYPE_CONNECT, EVENT_TYPE_DISCONNECT, EVENT_TYPE_NONE, EVENT_TYPE_RECEIVE};
use crate::packet::{PACKET_FLAG_RELIABLE, PACKET_FLAG_UNRELIABLE, PACKET_FLAG_UNSEQUENCED};
use crate::value::Value;
use crate::{host, peer};

/// Signature of every native function the namespace exposes.
pub type NativeFn = fn(&mut Context, &Args) -> Result<Value, ScriptError>;

/// A script class whose instances only the engine can hand out.
pub struct Class {
    name: &'static str,
    methods: BTreeMap<&'static str, NativeFn>,
}

impl Class {
    fn new(name: &'static str, methods: &[(&'static str, NativeFn)]) -> Self {
        Self {
            name,
            methods: methods.iter().copied().collect(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn method(&self, name: &str) -> Option<NativeFn> {
        self.methods.get(name).copied()
    }

    pub fn method_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.methods.keys().copied()
    }

    /// Scripts may never construct hosts or peers directly.
    pub fn construct(&self, _cx: &mut Context, _args: &Args) -> Result<Value, ScriptError> {
        Err(ScriptError::ConstructionForbidden(self.name))
    }
}

/// Everything the binding registers: constants, the `Host` and `Peer`
/// classes and the `host_create` factory.
pub struct Namespace {
    name: String,
    constants: BTreeMap<&'static str, Value>,
    host: Class,
    peer: Class,
    functions: BTreeMap<&'static str, NativeFn>,
}

impl Namespace {
    pub fn register(config: &BindingConfig) -> Self {
        let constants = [
            ("EVENT_TYPE_NONE", EVENT_TYPE_NONE),
            ("EVENT_TYPE_CONNECT", EVENT_TYPE_CONNECT),
            ("EVENT_TYPE_DISCONNECT", EVENT_TYPE_DISCONNECT),
            ("EVENT_TYPE_RECEIVE", EVENT_TYPE_RECEIVE),
            ("PACKET_FLAG_RELIABLE", PACKET_FLAG_RELIABLE),
            ("PACKET_FLAG_UNSEQUENCED", PACKET_FLAG_UNSEQUENCED),
            ("PACKET_FLAG_UNRELIABLE", PACKET_FLAG_UNRELIABLE),
        ]
        .into_iter()
        .map(|(name, value)| (name, Value::Integer(value)))
        .collect();

        let peer = Class::new(
            peer::CLASS_NAME,
            &[
                ("disconnect", peer::disconnect as NativeFn),
                ("disconnect_later", peer::disconnect_later),
                ("disconnect_now", peer::disconnect_now),
                ("index", peer::index),
                ("send", peer::send),
                ("incoming_bandwidth", peer::incoming_bandwidth),
                ("outgoing_bandwidth", peer::outgoing_bandwidth),
                ("packet_loss", peer::packet_loss),
                ("round_trip_time", peer::round_trip_time),
                ("ping", peer::ping),
                ("ping_interval", peer::ping_interval),
                ("reset", peer::reset),
                ("throttle_configure", peer::throttle_configure),
                ("timeout", peer::timeout),
                ("state", peer::state),
                ("address", peer::address),
            ],
        );

        let host = Class::new(
            host::CLASS_NAME,
            &[
                ("broadcast", host::broadcast as NativeFn),
                ("check_events", host::check_events),
                ("connect", host::connect),
                ("service", host::service),
                ("bandwidth_limit", host::bandwidth_limit),
                ("compress_with_range_coder", host::compress_with_range_coder),
                ("flush", host::flush),
                ("socket_address", host::socket_address),
                ("peer_count", host::peer_count),
                ("destroy", host::destroy),
            ],
        );

        let functions = BTreeMap::from([("host_create", host::host_create as NativeFn)]);

        log::debug!(
            "registered namespace `{}` ({} host methods, {} peer methods)",
            config.namespace,
            host.methods.len(),
            peer.methods.len()
        );

        Self {
            name: config.namespace.clone(),
            constants,
            host,
            peer,
            functions,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constant(&self, name: &str) -> Option<&Value> {
        self.constants.get(name)
    }

    pub fn constants(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.constants.iter().map(|(name, value)| (*name, value))
    }

    pub fn class(&self, name: &str) -> Option<&Class> {
        [&self.host, &self.peer]
            .into_iter()
            .find(|class| class.name == name)
    }

    /// `udp.Host()` / `udp.Peer()`.
    pub fn construct(
        &self,
        cx: &mut Context,
        class: &str,
        args: Args,
    ) -> Result<Value, ScriptError> {
        self.class(class)
            .ok_or_else(|| ScriptError::UnknownMember(class.to_string()))?
            .construct(cx, &args)
    }

    /// Calls a free function such as `host_create`.
    pub fn call(&self, cx: &mut Context, name: &str, args: Args) -> Result<Value, ScriptError> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| ScriptError::UnknownMember(name.to_string()))?;
        function(cx, &args)
    }

    /// Calls `receiver:method(rest...)`. The receiver counts toward arity.
    pub fn invoke(
        &self,
        cx: &mut Context,
        receiver: &Value,
        method: &str,
        rest: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        let class = match receiver {
            Value::Host(_) => &self.host,
            Value::Peer(_) => &self.peer,
            other => {
                return Err(ScriptError::TypeMismatch(format!(
                    "attempt to call method `{}` on a {} value",
                    method,
                    other.type_name()
                )));
            }
        };

        let function = class
            .method(method)
            .ok_or_else(|| ScriptError::UnknownMember(format!("{}.{}", class.name, method)))?;
        function(cx, &Args::with_receiver(receiver.clone(), rest))
    }
}
