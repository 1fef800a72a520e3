//! Native methods of the `Peer` class. Slot 0 of every call is the peer.

use udplink::PACKET_LOSS_SCALE;

use crate::bind::{Args, FromValue};
use crate::context::Context;
use crate::error::ScriptError;
use crate::packet::build_packet;
use crate::value::{PeerRef, Value};

pub const CLASS_NAME: &str = "Peer";

enum DisconnectMode {
    Graceful,
    Later,
    Now,
}

impl DisconnectMode {
    fn op(&self) -> &'static str {
        match self {
            DisconnectMode::Graceful => "disconnect",
            DisconnectMode::Later => "disconnect_later",
            DisconnectMode::Now => "disconnect_now",
        }
    }
}

/// `peer:disconnect([data])` and its two variants.
struct DisconnectArgs {
    peer: PeerRef,
    data: u32,
}

impl DisconnectArgs {
    fn bind(cx: &Context, args: &Args, op: &'static str) -> Result<Self, ScriptError> {
        args.expect_arity(op, 1..=2)?;
        let peer = args.bind(0, "peer")?;
        let data = match args.len() {
            1 => cx.config().default_data,
            _ => args.bind(1, "data")?,
        };
        Ok(Self { peer, data })
    }
}

/// `peer:send(data, [channel], [flag])`, also used by `host:broadcast`.
pub(crate) struct SendArgs<T> {
    pub target: T,
    pub data: Vec<u8>,
    pub channel: u8,
    pub flag: i64,
}

impl<T: FromValue> SendArgs<T> {
    pub(crate) fn bind(cx: &Context, args: &Args, op: &'static str) -> Result<Self, ScriptError> {
        args.expect_arity(op, 2..=4)?;
        let target = args.bind(0, "self")?;
        let data = args.bind(1, "data")?;

        let config = cx.config();
        let (channel, flag) = match args.len() {
            2 => (config.default_channel, config.default_flag),
            3 => (args.bind(2, "channel")?, config.default_flag),
            _ => (args.bind(2, "channel")?, args.bind(3, "flag")?),
        };
        Ok(Self {
            target,
            data,
            channel,
            flag,
        })
    }
}

fn receiver(args: &Args, op: &'static str) -> Result<PeerRef, ScriptError> {
    args.expect_arity(op, 1..=1)?;
    args.bind(0, "peer")
}

fn disconnect_with(
    cx: &mut Context,
    args: &Args,
    mode: DisconnectMode,
) -> Result<Value, ScriptError> {
    let DisconnectArgs { peer, data } = DisconnectArgs::bind(cx, args, mode.op())?;

    match mode {
        DisconnectMode::Graceful => cx.peer_mut(peer)?.disconnect(data),
        DisconnectMode::Later => cx.peer_mut(peer)?.disconnect_later(data),
        DisconnectMode::Now => {
            cx.peer(peer)?;
            let host = cx.host_mut(peer.host)?;
            if let Err(err) = host.disconnect_now(peer.slot, data) {
                log::debug!("disconnect_now on peer {}: {}", peer.slot, err);
            }
        }
    }
    Ok(Value::Null)
}

/// Requests a graceful disconnect. A `disconnect` event follows.
pub fn disconnect(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    disconnect_with(cx, args, DisconnectMode::Graceful)
}

/// Disconnects once queued outgoing traffic has been sent.
pub fn disconnect_later(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    disconnect_with(cx, args, DisconnectMode::Later)
}

/// Disconnects immediately. No local `disconnect` event is raised.
pub fn disconnect_now(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    disconnect_with(cx, args, DisconnectMode::Now)
}

/// 1-based position of the peer in its host's peer table.
pub fn index(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let peer = receiver(args, "index")?;
    let host = cx.host(peer.host)?;

    host.peers()
        .iter()
        .position(|candidate| candidate.id() == peer.slot)
        .map(|position| Value::Integer(position as i64 + 1))
        .ok_or(ScriptError::IndexNotFound)
}

/// Queues `data` to the peer. Packet build errors raise; once the packet is
/// handed over, the engine's verdict is only logged.
pub fn send(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let SendArgs {
        target,
        data,
        channel,
        flag,
    } = SendArgs::<PeerRef>::bind(cx, args, "send")?;

    let packet = build_packet(&data, flag)?;
    if let Err(err) = cx.peer_mut(target)?.send(channel, packet) {
        log::debug!("send to peer {} dropped: {}", target.slot, err);
    }
    Ok(Value::Null)
}

pub fn incoming_bandwidth(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let peer = receiver(args, "incoming_bandwidth")?;
    Ok(cx.peer(peer)?.incoming_bandwidth().into())
}

pub fn outgoing_bandwidth(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let peer = receiver(args, "outgoing_bandwidth")?;
    Ok(cx.peer(peer)?.outgoing_bandwidth().into())
}

/// Mean packet loss as a fraction in `0.0..=1.0`.
pub fn packet_loss(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let peer = receiver(args, "packet_loss")?;
    let loss = cx.peer(peer)?.packet_loss();
    Ok(Value::Float(loss as f64 / PACKET_LOSS_SCALE as f64))
}

pub fn round_trip_time(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let peer = receiver(args, "round_trip_time")?;
    Ok(cx.peer(peer)?.round_trip_time().into())
}

pub fn ping(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let peer = receiver(args, "ping")?;
    cx.peer_mut(peer)?.ping();
    Ok(Value::Null)
}

pub fn ping_interval(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    args.expect_arity("ping_interval", 2..=2)?;
    let peer: PeerRef = args.bind(0, "peer")?;
    let interval_ms: u32 = args.bind(1, "interval")?;

    cx.peer_mut(peer)?.ping_interval(interval_ms);
    Ok(Value::Null)
}

/// Forcefully drops the connection without notifying the remote.
pub fn reset(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let peer = receiver(args, "reset")?;
    cx.peer_mut(peer)?.reset();
    Ok(Value::Null)
}

pub fn throttle_configure(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    args.expect_arity("throttle_configure", 4..=4)?;
    let peer: PeerRef = args.bind(0, "peer")?;
    let interval: u32 = args.bind(1, "interval")?;
    let acceleration: u32 = args.bind(2, "acceleration")?;
    let deceleration: u32 = args.bind(3, "deceleration")?;

    cx.peer_mut(peer)?
        .throttle_configure(interval, acceleration, deceleration);
    Ok(Value::Null)
}

pub fn timeout(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    args.expect_arity("timeout", 4..=4)?;
    let peer: PeerRef = args.bind(0, "peer")?;
    let limit: u32 = args.bind(1, "limit")?;
    let minimum: u32 = args.bind(2, "minimum")?;
    let maximum: u32 = args.bind(3, "maximum")?;

    cx.peer_mut(peer)?.timeout(limit, minimum, maximum);
    Ok(Value::Null)
}

/// Connection state name, e.g. `"connected"`.
pub fn state(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let peer = receiver(args, "state")?;
    Ok(cx.peer(peer)?.state().as_str().into())
}

/// `"ip:port"` of the remote end, or `null` for an idle slot.
pub fn address(cx: &mut Context, args: &Args) -> Result<Value, ScriptError> {
    let peer = receiver(args, "address")?;
    Ok(cx.peer(peer)?.address().map(|addr| addr.to_string()).into())
}
