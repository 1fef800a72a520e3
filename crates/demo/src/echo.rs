use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use udplink_script::event::{EVENT_TYPE_CONNECT, EVENT_TYPE_DISCONNECT, EVENT_TYPE_RECEIVE};
use udplink_script::{Args, Context, Namespace, Value};

use crate::config::EchoConfig;

/// A script session: the registered namespace plus the VM state it runs on.
struct Session {
    udp: Namespace,
    cx: Context,
}

impl Session {
    fn new(config: &EchoConfig) -> Self {
        let binding = config.binding();
        Self {
            udp: Namespace::register(&binding),
            cx: Context::new(binding),
        }
    }

    fn host_create(&mut self, args: Vec<Value>, compress: bool) -> Result<Value> {
        let host = self.udp.call(&mut self.cx, "host_create", Args::new(args))?;
        if host.is_null() {
            bail!("{}", self.cx.take_diagnostics().join("; "));
        }

        if compress && self.invoke(&host, "compress_with_range_coder", vec![])? != Value::Bool(true) {
            log::warn!("compression could not be enabled");
        }
        Ok(host)
    }

    fn invoke(&mut self, receiver: &Value, method: &str, rest: Vec<Value>) -> Result<Value> {
        Ok(self.udp.invoke(&mut self.cx, receiver, method, rest)?)
    }
}

/// Sends every payload back to its sender on the channel it arrived on.
pub struct EchoServer {
    session: Session,
    host: Value,
    echoed: u64,
}

impl EchoServer {
    pub fn new(address: &str, config: &EchoConfig) -> Result<Self> {
        let mut session = Session::new(config);
        let host = session.host_create(
            vec![
                address.into(),
                Value::Integer(config.max_peers as i64),
                Value::Integer(config.channels as i64),
            ],
            config.compress,
        )?;

        Ok(Self {
            session,
            host,
            echoed: 0,
        })
    }

    pub fn local_addr(&mut self) -> Result<String> {
        let host = self.host.clone();
        let address = self.session.invoke(&host, "socket_address", vec![])?;
        Ok(address.to_string())
    }

    pub fn echoed(&self) -> u64 {
        self.echoed
    }

    pub fn run(&mut self, tick: Duration, duration: Option<Duration>) -> Result<()> {
        let start = Instant::now();
        while duration.is_none_or(|limit| start.elapsed() < limit) {
            self.tick_once()?;
            thread::sleep(tick);
        }
        Ok(())
    }

    /// Drains every event the host has ready.
    pub fn tick_once(&mut self) -> Result<()> {
        let host = self.host.clone();
        loop {
            let event = self.session.invoke(&host, "service", vec![])?;
            if event.is_null() {
                return Ok(());
            }
            self.handle(&event)?;
        }
    }

    fn handle(&mut self, event: &Value) -> Result<()> {
        let peer = event.get("peer").cloned().unwrap_or_default();

        match event.get("type").and_then(Value::as_integer) {
            Some(EVENT_TYPE_CONNECT) => {
                let index = self.session.invoke(&peer, "index", vec![])?;
                let address = self.session.invoke(&peer, "address", vec![])?;
                log::info!("Peer {} connected from {}", index, address);
            }
            Some(EVENT_TYPE_DISCONNECT) => {
                let index = self.session.invoke(&peer, "index", vec![])?;
                log::info!("Peer {} disconnected", index);
            }
            Some(EVENT_TYPE_RECEIVE) => {
                let data = event.get("data").cloned().unwrap_or_default();
                let channel = event.get("channel").cloned().unwrap_or_default();
                self.session.invoke(&peer, "send", vec![data, channel])?;
                self.echoed += 1;
            }
            other => log::debug!("ignored event type {:?}", other),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    Connecting,
    Echoing,
    Closing,
    Closed,
}

/// Connects, sends each message once and waits for all of them to come back.
pub struct EchoClient {
    session: Session,
    host: Value,
    peer: Value,
    state: ClientState,
    channels: usize,
    messages: Vec<String>,
    echoes: Vec<String>,
}

impl EchoClient {
    pub fn new(server: &str, config: &EchoConfig, messages: Vec<String>) -> Result<Self> {
        let mut session = Session::new(config);
        let host = session.host_create(vec![Value::Null], config.compress)?;
        let peer = session.invoke(&host, "connect", vec![server.into()])?;

        Ok(Self {
            session,
            host,
            peer,
            state: ClientState::Connecting,
            channels: config.channels.max(1),
            messages,
            echoes: Vec::new(),
        })
    }

    pub fn is_done(&self) -> bool {
        self.state == ClientState::Closed
    }

    pub fn echoes(&self) -> &[String] {
        &self.echoes
    }

    pub fn run(&mut self, tick: Duration, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        while !self.is_done() {
            if start.elapsed() >= timeout {
                bail!(
                    "timed out after {} of {} echoes",
                    self.echoes.len(),
                    self.messages.len()
                );
            }
            self.tick_once()?;
            thread::sleep(tick);
        }
        Ok(())
    }

    pub fn tick_once(&mut self) -> Result<()> {
        let host = self.host.clone();
        loop {
            let event = self.session.invoke(&host, "service", vec![])?;
            if event.is_null() {
                return Ok(());
            }
            self.handle(&event)?;
        }
    }

    fn handle(&mut self, event: &Value) -> Result<()> {
        let peer = self.peer.clone();

        match event.get("type").and_then(Value::as_integer) {
            Some(EVENT_TYPE_CONNECT) => {
                let rtt = self.session.invoke(&peer, "round_trip_time", vec![])?;
                log::info!("Connected (rtt {} ms)", rtt);

                for (channel, message) in self.messages.iter().enumerate() {
                    let channel = Value::Integer((channel % self.channels) as i64);
                    self.session
                        .invoke(&peer, "send", vec![message.as_str().into(), channel])?;
                }
                self.state = ClientState::Echoing;
                self.close_if_complete()?;
            }
            Some(EVENT_TYPE_RECEIVE) => {
                let echo = event.get("data").map(Value::to_string).unwrap_or_default();
                log::info!("Echo: {}", echo);
                self.echoes.push(echo);
                self.close_if_complete()?;
            }
            Some(EVENT_TYPE_DISCONNECT) => {
                if self.state != ClientState::Closing {
                    log::warn!("Server dropped the connection");
                }
                self.state = ClientState::Closed;
            }
            other => log::debug!("ignored event type {:?}", other),
        }
        Ok(())
    }

    fn close_if_complete(&mut self) -> Result<()> {
        if self.state == ClientState::Echoing && self.echoes.len() >= self.messages.len() {
            let peer = self.peer.clone();
            self.session.invoke(&peer, "disconnect", vec![])?;
            self.state = ClientState::Closing;
        }
        Ok(())
    }
}
