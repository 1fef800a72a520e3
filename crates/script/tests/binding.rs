use std::thread;
use std::time::{Duration, Instant};

use udplink_script::{Args, BindingConfig, Context, Namespace, ScriptError, Value};

struct Script {
    udp: Namespace,
    cx: Context,
}

impl Script {
    fn new() -> Self {
        let config = BindingConfig::default();
        Self {
            udp: Namespace::register(&config),
            cx: Context::new(config),
        }
    }

    fn host_create(&mut self, args: Vec<Value>) -> Value {
        self.udp
            .call(&mut self.cx, "host_create", Args::new(args))
            .unwrap()
    }

    fn invoke(&mut self, receiver: &Value, method: &str, rest: Vec<Value>) -> Result<Value, ScriptError> {
        self.udp.invoke(&mut self.cx, receiver, method, rest)
    }

    fn constant(&self, name: &str) -> Value {
        self.udp.constant(name).cloned().unwrap()
    }

    /// Services `host` until it yields an event, flushing `other` so its
    /// queued traffic goes out.
    fn wait_for_event(&mut self, host: &Value, other: &Value, timeout_ms: u64) -> Option<Value> {
        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(timeout_ms) {
            self.invoke(other, "flush", vec![]).unwrap();
            let event = self.invoke(host, "service", vec![]).unwrap();
            if !event.is_null() {
                return Some(event);
            }
            thread::sleep(Duration::from_millis(1));
        }
        None
    }

    /// Returns `(server, client, server-side peer, client-side peer)`.
    fn connected_pair(&mut self, channels: i64) -> (Value, Value, Value, Value) {
        let server = self.host_create(vec![
            Value::from("127.0.0.1:0"),
            Value::Integer(8),
            Value::Integer(channels),
        ]);
        let client = self.host_create(vec![Value::Null]);
        let address = self.invoke(&server, "socket_address", vec![]).unwrap();

        let client_peer = self
            .invoke(&client, "connect", vec![address, Value::Integer(channels), Value::Integer(11)])
            .unwrap();

        let accepted = self.wait_for_event(&server, &client, 500).expect("no connect on server");
        assert_eq!(accepted.get("type"), Some(&self.constant("EVENT_TYPE_CONNECT")));
        assert_eq!(accepted.get("data"), Some(&Value::Integer(11)));
        let server_peer = accepted.get("peer").cloned().unwrap();

        let verified = self.wait_for_event(&client, &server, 500).expect("no connect on client");
        assert_eq!(verified.get("peer"), Some(&client_peer));
        assert_eq!(verified.get("data"), Some(&Value::Integer(0)));

        (server, client, server_peer, client_peer)
    }
}

#[test]
fn test_unsequenced_hello_on_channel_two() {
    let mut script = Script::new();
    let (server, client, server_peer, client_peer) = script.connected_pair(3);

    let flag = script.constant("PACKET_FLAG_UNSEQUENCED");
    script
        .invoke(&client_peer, "send", vec![Value::from("hello"), Value::Integer(2), flag])
        .unwrap();

    let event = script.wait_for_event(&server, &client, 500).expect("no receive");
    assert_eq!(event.get("type"), Some(&script.constant("EVENT_TYPE_RECEIVE")));
    assert_eq!(event.get("channel"), Some(&Value::Integer(2)));
    assert_eq!(event.get("data"), Some(&Value::from("hello")));
    assert_eq!(event.get("peer"), Some(&server_peer));

    assert!(script.wait_for_event(&server, &client, 50).is_none());
}

#[test]
fn test_broadcast_with_defaults() {
    let mut script = Script::new();
    let (server, client, _, _) = script.connected_pair(1);

    script
        .invoke(&server, "broadcast", vec![Value::String(vec![0, 159, 146, 150])])
        .unwrap();

    let event = script.wait_for_event(&client, &server, 500).expect("no receive");
    assert_eq!(event.get("channel"), Some(&Value::Integer(0)));
    assert_eq!(event.get("data"), Some(&Value::String(vec![0, 159, 146, 150])));
}

#[test]
fn test_index_is_one_based_and_stable() {
    let mut script = Script::new();
    let (_, _, server_peer, client_peer) = script.connected_pair(1);

    for _ in 0..3 {
        assert_eq!(
            script.invoke(&server_peer, "index", vec![]).unwrap(),
            Value::Integer(1)
        );
        assert_eq!(
            script.invoke(&client_peer, "index", vec![]).unwrap(),
            Value::Integer(1)
        );
    }
}

#[test]
fn test_graceful_disconnect_events() {
    let mut script = Script::new();
    let (server, client, _, client_peer) = script.connected_pair(1);

    script
        .invoke(&client_peer, "disconnect", vec![Value::Integer(5)])
        .unwrap();

    let remote = script.wait_for_event(&server, &client, 500).expect("no disconnect on server");
    assert_eq!(remote.get("type"), Some(&script.constant("EVENT_TYPE_DISCONNECT")));
    assert_eq!(remote.get("data"), Some(&Value::Integer(5)));

    let local = script.wait_for_event(&client, &server, 500).expect("no disconnect on client");
    assert_eq!(local.get("type"), Some(&script.constant("EVENT_TYPE_DISCONNECT")));
    assert_eq!(
        script.invoke(&client_peer, "state", vec![]).unwrap(),
        Value::from("disconnected")
    );
}

#[test]
fn test_peer_accessors() {
    let mut script = Script::new();
    let (server, _, server_peer, client_peer) = script.connected_pair(1);

    let rtt = script.invoke(&client_peer, "round_trip_time", vec![]).unwrap();
    assert!(matches!(rtt, Value::Integer(ms) if ms >= 0));

    let loss = script.invoke(&client_peer, "packet_loss", vec![]).unwrap();
    assert!(matches!(loss, Value::Float(fraction) if (0.0..=1.0).contains(&fraction)));

    for method in ["incoming_bandwidth", "outgoing_bandwidth"] {
        assert_eq!(
            script.invoke(&server_peer, method, vec![]).unwrap(),
            Value::Integer(0)
        );
    }

    let server_address = script.invoke(&server, "socket_address", vec![]).unwrap();
    assert_eq!(
        script.invoke(&client_peer, "address", vec![]).unwrap(),
        server_address
    );

    for (method, args) in [
        ("ping", vec![]),
        ("ping_interval", vec![Value::Integer(250)]),
        ("timeout", vec![Value::Integer(0); 3]),
        ("throttle_configure", vec![Value::Integer(1000), Value::Integer(2), Value::Integer(2)]),
    ] {
        assert_eq!(script.invoke(&client_peer, method, args).unwrap(), Value::Null);
    }

    script.invoke(&client_peer, "reset", vec![]).unwrap();
    assert_eq!(
        script.invoke(&client_peer, "address", vec![]).unwrap(),
        Value::Null
    );
}

#[test]
fn test_arity_mismatch_performs_no_engine_call() {
    let mut script = Script::new();
    let host = script.host_create(vec![Value::Null]);

    let err = script
        .invoke(&host, "connect", vec![])
        .unwrap_err();
    assert!(err.is_arity_mismatch());
    assert!(script.invoke(&host, "service", vec![Value::Null]).unwrap_err().is_arity_mismatch());

    // no slot was taken by the rejected connect
    let peer = script
        .invoke(&host, "connect", vec![Value::from("127.0.0.1:9")])
        .unwrap();
    assert_eq!(script.invoke(&peer, "index", vec![]).unwrap(), Value::Integer(1));
}

#[test]
fn test_idle_polling_never_blocks() {
    let mut script = Script::new();
    let host = script.host_create(vec![Value::from("127.0.0.1:0")]);

    let start = Instant::now();
    for _ in 0..100 {
        assert_eq!(script.invoke(&host, "service", vec![]).unwrap(), Value::Null);
        assert_eq!(script.invoke(&host, "check_events", vec![]).unwrap(), Value::Null);
    }
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_construction_forbidden() {
    let mut script = Script::new();
    for class in ["Host", "Peer"] {
        assert!(matches!(
            script.udp.construct(&mut script.cx, class, Args::default()),
            Err(ScriptError::ConstructionForbidden(_))
        ));
    }
}

#[test]
fn test_port_in_use_yields_null() {
    let mut script = Script::new();
    let first = script.host_create(vec![Value::from("127.0.0.1:0")]);
    let address = script.invoke(&first, "socket_address", vec![]).unwrap();

    assert_eq!(script.host_create(vec![address]), Value::Null);
    assert_eq!(
        script.cx.take_diagnostics(),
        vec!["Failed to create host (port already in use?)".to_string()]
    );
}
