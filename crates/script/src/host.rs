//! Native methods of the `Host` class and the `host_create` factory.

use std::time::Duration;

use udplink::Host;

use crate::address::parse_address;
use crate::bind::Args;
use crate::context::Context;
use crate::error::ScriptError;
use crate::event::translate;
use crate::packet::build_packet;
use crate::peer::SendArgs;
use crate::value::{HostRef, PeerRef, Value};

pub const CLASS_NAME: &str = "Host";

/// Diagnostic emitted when the factory cannot bind a socket.
pub const CREATE_FAILED: &str = "Failed to create host (port already in use?)";

fn receiver(args: &Args, op: &'static str) -> Result<HostRef, ScriptError> {
    args.expect_arity(op, 1..=1)?;
    args.bind(0, "host")
}

/// `host_create(address, [peer_count], [channel_limit], [incoming], [outgoing])`
struct CreateArgs {
    address: Option<String>,
    peer_count: usize,
    channel_limit: usize,
    incoming_bandwidth: u32,
    outgoing_bandwidth: u32,
}

impl CreateArgs {
    fn bind(cx: &Context, args: &Args) -> Result<Self, ScriptError> {
        args.expect_arity("host_create", 1..=5)?;
        let config = cx.config();
        Ok(Self {
            address: args.bind(0, "address")?,
            peer_count: args.bind_or(1, "peer_count", config.peer_count)?,
            channel_limit: args.bind_or(2, "channel_limit", config.channel_limit)?,
            incoming_bandwidth: args.bind_or(3, "incoming", config.incoming_bandwidth)?,
            outgoing_bandwidth: args.bind_or(4, "outgoing", config.outgoing_bandwidth)?,
        })
    }
}

/// Creates a host bound to `address`, or a client-only host on an ephemeral
/// port when the address is `null`.
///
/// Address errors raise. An engine failure (usually the port is taken) does
/// not: the diagnostic `CREATE_FAILED` is emitted and `null` returned.
pub fn host_create(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let CreateArgs {
        address,
        peer_count,
        channel_limit,
        incoming_bandwidth,
        outgoing_bandwidth,
    } = CreateArgs::bind(cx, args)?;

    let address = address.as_deref().map(parse_address).transpose()?;

    let created = Host::with_config(
        address,
        peer_count,
        channel_limit,
        (incoming_bandwidth, outgoing_bandwidth),
        cx.config().host,
    );

    match created {
        Ok(host) => {
            log::debug!("created host on {}", host.local_addr());
            Ok(Value::Host(cx.insert_host(host)))
        }
        Err(err) => {
            log::debug!("host_create: {}", err);
            cx.diagnose(CREATE_FAILED);
            Ok(Value::Null)
        }
    }
}

/// Same contract as `peer:send`, for every connected peer.
pub fn broadcast(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let SendArgs {
        target,
        data,
        channel,
        flag,
    } = SendArgs::<HostRef>::bind(cx, args, "broadcast")?;

    let packet = build_packet(&data, flag)?;
    cx.host_mut(target)?.broadcast(channel, packet);
    Ok(Value::Null)
}

/// Pops an already-dispatched event without touching the socket.
pub fn check_events(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let handle = receiver(args, "check_events")?;
    let event = cx
        .host_mut(handle)?
        .check_events()
        .map_err(ScriptError::EventCheckFailure)?;
    Ok(translate(handle, event))
}

/// `connect(address, [channel_count], [data])`
struct ConnectArgs {
    host: HostRef,
    address: String,
    channel_count: usize,
    data: u32,
}

impl ConnectArgs {
    fn bind(cx: &Context, args: &Args) -> Result<Self, ScriptError> {
        args.expect_arity("connect", 2..=4)?;
        let host = args.bind(0, "host")?;
        let address = args.bind(1, "address")?;

        let config = cx.config();
        let (channel_count, data) = match args.len() {
            2 => (config.connect_channel_count, config.default_data),
            3 => (args.bind(2, "channel_count")?, config.default_data),
            _ => (args.bind(2, "channel_count")?, args.bind(3, "data")?),
        };
        Ok(Self {
            host,
            address,
            channel_count,
            data,
        })
    }
}

/// Starts connecting to `address` and returns the new peer. Raises when the
/// peer table is full.
pub fn connect(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let ConnectArgs {
        host,
        address,
        channel_count,
        data,
    } = ConnectArgs::bind(cx, args)?;

    let address = parse_address(&address)?;
    let slot = cx
        .host_mut(host)?
        .connect(address, channel_count, data)
        .map_err(ScriptError::PeerCreationFailure)?;

    Ok(Value::Peer(PeerRef { host, slot }))
}

/// One non-blocking round of flush, receive and dispatch. Returns at most
/// one event.
pub fn service(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let handle = receiver(args, "service")?;
    let event = cx
        .host_mut(handle)?
        .service(Duration::ZERO)
        .map_err(ScriptError::ServiceFailure)?;
    Ok(translate(handle, event))
}

pub fn bandwidth_limit(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    args.expect_arity("bandwidth_limit", 3..=3)?;
    let handle: HostRef = args.bind(0, "host")?;
    let incoming: u32 = args.bind(1, "incoming")?;
    let outgoing: u32 = args.bind(2, "outgoing")?;

    cx.host_mut(handle)?.bandwidth_limit(incoming, outgoing);
    Ok(Value::Null)
}

/// Reports success as a boolean rather than raising.
pub fn compress_with_range_coder(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let handle = receiver(args, "compress_with_range_coder")?;
    let enabled = cx.host_mut(handle)?.compress_with_range_coder();
    Ok(Value::Bool(enabled.is_ok()))
}

pub fn flush(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let handle = receiver(args, "flush")?;
    cx.host_mut(handle)?
        .flush()
        .map_err(ScriptError::ServiceFailure)?;
    Ok(Value::Null)
}

pub fn socket_address(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let handle = receiver(args, "socket_address")?;
    Ok(cx.host(handle)?.local_addr().to_string().into())
}

pub fn peer_count(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let handle = receiver(args, "peer_count")?;
    Ok(Value::Integer(cx.host(handle)?.peer_count() as i64))
}

/// Closes the socket. The handle and every peer handle of this host go stale.
pub fn destroy(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let handle = receiver(args, "destroy")?;
    let host = cx.remove_host(handle)?;
    log::debug!("destroyed host on {}", host.local_addr());
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(cx: &mut Context, values: Vec<Value>) -> Value {
        host_create(cx, &Args::new(values)).unwrap()
    }

    #[test]
    fn test_factory_defaults() {
        let mut cx = Context::default();
        let host = create(&mut cx, vec![Value::from("127.0.0.1:0")]);
        let handle = host.as_host().unwrap();

        let count = peer_count(&mut cx, &Args::new(vec![host.clone()])).unwrap();
        assert_eq!(count, Value::Integer(64));
        assert_eq!(cx.host(handle).unwrap().channel_limit(), 1);
    }

    #[test]
    fn test_factory_null_address_is_client_only() {
        let mut cx = Context::default();

        assert!(create(&mut cx, vec![Value::Null]).as_host().is_some());
        assert!(create(&mut cx, vec![Value::Null, Value::Integer(2)])
            .as_host()
            .is_some());
        assert_eq!(cx.host_count(), 2);
    }

    #[test]
    fn test_factory_arity() {
        let mut cx = Context::default();

        let err = host_create(&mut cx, &Args::new(vec![])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "wrong number of parameters to host_create: got 0, expected 1 to 5"
        );

        let err = host_create(&mut cx, &Args::new(vec![Value::Null; 6])).unwrap_err();
        assert!(err.is_arity_mismatch());
        assert_eq!(cx.host_count(), 0);
    }

    #[test]
    fn test_factory_address_errors_raise() {
        let mut cx = Context::default();
        let err = host_create(&mut cx, &Args::new(vec![Value::from("nope")])).unwrap_err();
        assert!(matches!(err, ScriptError::MalformedAddress(_)));
    }

    #[test]
    fn test_port_in_use_returns_null_with_diagnostic() {
        let mut cx = Context::default();
        let first = create(&mut cx, vec![Value::from("127.0.0.1:0")]);
        let bound = socket_address(&mut cx, &Args::new(vec![first])).unwrap();

        let second = create(&mut cx, vec![bound]);
        assert_eq!(second, Value::Null);
        assert_eq!(cx.diagnostics(), [CREATE_FAILED.to_string()]);
    }

    #[test]
    fn test_connect_returns_connecting_peer() {
        let mut cx = Context::default();
        let host = create(&mut cx, vec![Value::Null]);

        let peer = connect(
            &mut cx,
            &Args::new(vec![host.clone(), Value::from("127.0.0.1:9")]),
        )
        .unwrap();
        let peer = peer.as_peer().unwrap();
        assert_eq!(cx.peer(peer).unwrap().state().as_str(), "connecting");
    }

    #[test]
    fn test_connect_full_table_raises() {
        let mut cx = Context::default();
        let host = create(&mut cx, vec![Value::Null, Value::Integer(1)]);
        let args = Args::new(vec![host, Value::from("127.0.0.1:9")]);

        connect(&mut cx, &args).unwrap();
        assert!(matches!(
            connect(&mut cx, &args),
            Err(ScriptError::PeerCreationFailure(_))
        ));
    }

    #[test]
    fn test_destroy_makes_handle_stale() {
        let mut cx = Context::default();
        let host = create(&mut cx, vec![Value::Null]);
        let args = Args::new(vec![host]);

        destroy(&mut cx, &args).unwrap();
        assert!(matches!(
            service(&mut cx, &args),
            Err(ScriptError::StaleHandle("Host"))
        ));
        assert!(matches!(
            destroy(&mut cx, &args),
            Err(ScriptError::StaleHandle("Host"))
        ));
    }

    #[test]
    fn test_flush_idle_host() {
        let mut cx = Context::default();
        let host = create(&mut cx, vec![Value::Null]);
        assert_eq!(flush(&mut cx, &Args::new(vec![host])).unwrap(), Value::Null);
    }

    #[test]
    fn test_engine_failures_map_to_script_errors() {
        let mut cx = Context::default();
        let host = create(&mut cx, vec![Value::Null]);
        let handle = host.as_host().unwrap();
        cx.host_mut(handle).unwrap().fail();
        let args = Args::new(vec![host]);

        assert!(matches!(
            check_events(&mut cx, &args),
            Err(ScriptError::EventCheckFailure(_))
        ));
        assert!(matches!(
            service(&mut cx, &args),
            Err(ScriptError::ServiceFailure(_))
        ));
        assert!(matches!(
            flush(&mut cx, &args),
            Err(ScriptError::ServiceFailure(_))
        ));
        assert_eq!(
            compress_with_range_coder(&mut cx, &args).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_compress_reports_bool() {
        let mut cx = Context::default();
        let host = create(&mut cx, vec![Value::Null]);
        let enabled = compress_with_range_coder(&mut cx, &Args::new(vec![host])).unwrap();
        assert_eq!(enabled, Value::Bool(true));
    }
}
