use std::collections::HashMap;

use udplink::{Host, Peer};

use crate::config::BindingConfig;
use crate::error::ScriptError;
use crate::value::{HostRef, PeerRef};

/// Script VM state seen by native functions: the hosts scripts created,
/// the binding defaults and a diagnostic channel.
///
/// Dropping the context drops every host and closes its socket.
#[derive(Default)]
pub struct Context {
    hosts: HashMap<HostRef, Host>,
    next_host: u64,
    config: BindingConfig,
    diagnostics: Vec<String>,
}

impl Context {
    pub fn new(config: BindingConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    /// Non-fatal messages emitted by native functions, oldest first.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<String> {
        std::mem::take(&mut self.diagnostics)
    }

    pub(crate) fn diagnose(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}", message);
        self.diagnostics.push(message);
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub(crate) fn insert_host(&mut self, host: Host) -> HostRef {
        let handle = HostRef(self.next_host);
        self.next_host += 1;
        self.hosts.insert(handle, host);
        handle
    }

    pub(crate) fn remove_host(&mut self, handle: HostRef) -> Result<Host, ScriptError> {
        self.hosts
            .remove(&handle)
            .ok_or(ScriptError::StaleHandle("Host"))
    }

    pub fn host(&self, handle: HostRef) -> Result<&Host, ScriptError> {
        self.hosts
            .get(&handle)
            .ok_or(ScriptError::StaleHandle("Host"))
    }

    pub fn host_mut(&mut self, handle: HostRef) -> Result<&mut Host, ScriptError> {
        self.hosts
            .get_mut(&handle)
            .ok_or(ScriptError::StaleHandle("Host"))
    }

    pub fn peer(&self, handle: PeerRef) -> Result<&Peer, ScriptError> {
        self.host(handle.host)?
            .peer(handle.slot)
            .ok_or(ScriptError::StaleHandle("Peer"))
    }

    pub fn peer_mut(&mut self, handle: PeerRef) -> Result<&mut Peer, ScriptError> {
        self.host_mut(handle.host)?
            .peer_mut(handle.slot)
            .ok_or(ScriptError::StaleHandle("Peer"))
    }
}
