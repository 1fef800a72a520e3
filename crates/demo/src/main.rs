mod config;
mod echo;

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use config::EchoConfig;
use echo::{EchoClient, EchoServer};

const DEFAULT_PORT: u16 = 6789;

#[derive(Parser)]
#[command(name = "udplink-echo")]
#[command(about = "Echo server and client over udplink script bindings")]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    #[arg(short, long, default_value_t = 60)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = 2, help = "Channels per connection")]
    channels: usize,

    #[arg(long, help = "Compress datagram bodies")]
    compress: bool,

    #[arg(long, default_value_t = 1, help = "Packet flag: 0 unreliable, 1 reliable, 2 unsequenced")]
    flag: i64,
}

#[derive(Subcommand)]
enum Mode {
    /// Echo every payload back to its sender
    Server {
        #[arg(short, long, default_value = "*")]
        bind: String,

        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        #[arg(short, long, default_value_t = 32)]
        max_peers: usize,

        #[arg(long, help = "Stop after this many seconds")]
        duration: Option<u64>,
    },
    /// Send messages and wait for their echoes
    Client {
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        #[arg(long, default_value_t = 5)]
        timeout: u64,

        #[arg(default_value = "hello")]
        messages: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = EchoConfig {
        tick_rate: args.tick_rate,
        channels: args.channels,
        compress: args.compress,
        flag: args.flag,
        ..Default::default()
    };

    match args.mode {
        Mode::Server {
            bind,
            port,
            max_peers,
            duration,
        } => {
            let config = EchoConfig { max_peers, ..config };
            let mut server = EchoServer::new(&format!("{}:{}", bind, port), &config)?;

            log::info!("Echo server started on {}", server.local_addr()?);
            server.run(config.tick_duration(), duration.map(Duration::from_secs))?;
            log::info!("Echo server shutting down after {} echoes", server.echoed());
        }
        Mode::Client {
            host,
            port,
            timeout,
            messages,
        } => {
            let mut client = EchoClient::new(&format!("{}:{}", host, port), &config, messages)?;
            client.run(config.tick_duration(), Duration::from_secs(timeout))?;
            log::info!("Received {} echoes", client.echoes().len());
        }
    }

    Ok(())
}
