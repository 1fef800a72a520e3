use udplink::{Event, EventType};

use crate::value::{HostRef, PeerRef, Table, Value};

pub const EVENT_TYPE_NONE: i64 = EventType::None as i64;
pub const EVENT_TYPE_CONNECT: i64 = EventType::Connect as i64;
pub const EVENT_TYPE_DISCONNECT: i64 = EventType::Disconnect as i64;
pub const EVENT_TYPE_RECEIVE: i64 = EventType::Receive as i64;

/// Turns a polled engine event into the table scripts see, or `null` when
/// nothing was pending. A received packet is consumed here.
pub fn translate(host: HostRef, event: Option<Event>) -> Value {
    match event {
        Some(event) => Value::Table(event_table(host, event)),
        None => Value::Null,
    }
}

fn event_table(host: HostRef, event: Event) -> Table {
    let mut table = Table::new();
    table.insert("type".into(), Value::Integer(event.kind() as i64));
    table.insert(
        "peer".into(),
        Value::Peer(PeerRef {
            host,
            slot: event.peer(),
        }),
    );

    match event {
        Event::Connect { data, .. } | Event::Disconnect { data, .. } => {
            table.insert("data".into(), data.into());
        }
        Event::Receive {
            channel, packet, ..
        } => {
            table.insert("channel".into(), Value::Integer(channel as i64));
            table.insert("data".into(), Value::String(packet.into_data()));
        }
    }

    table
}
