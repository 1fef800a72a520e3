use udplink_script::BindingConfig;

#[derive(Debug, Clone)]
pub struct EchoConfig {
    pub tick_rate: u32,
    pub max_peers: usize,
    pub channels: usize,
    pub compress: bool,
    /// Reliability flag echoed payloads are sent with.
    pub flag: i64,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            max_peers: 32,
            channels: 2,
            compress: false,
            flag: 1,
        }
    }
}

impl EchoConfig {
    pub fn tick_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn binding(&self) -> BindingConfig {
        BindingConfig {
            peer_count: self.max_peers,
            channel_limit: self.channels,
            connect_channel_count: self.channels,
            default_flag: self.flag,
            ..Default::default()
        }
    }
}
