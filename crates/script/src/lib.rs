//! Script bindings for the `udplink` engine.
//!
//! Native functions take the explicit VM state (`Context`) and the call's
//! arguments, check arity, bind each slot to a typed parameter and forward
//! to the engine. Engine events come back as plain tables.
//!
//! ```no_run
//! use udplink_script::{Args, BindingConfig, Context, Namespace, Value};
//!
//! let config = BindingConfig::default();
//! let udp = Namespace::register(&config);
//! let mut cx = Context::new(config);
//!
//! let host = udp.call(&mut cx, "host_create", Args::new(vec!["*:6789".into()]))?;
//! let event = udp.invoke(&mut cx, &host, "service", vec![])?;
//! if !event.is_null() {
//!     println!("event type {}", event.get("type").unwrap_or(&Value::Null));
//! }
//! # Ok::<(), udplink_script::ScriptError>(())
//! ```

pub mod address;
pub mod bind;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod host;
pub mod packet;
pub mod peer;
pub mod registry;
pub mod value;

pub use address::parse_address;
pub use bind::{Args, FromValue};
pub use config::BindingConfig;
pub use context::Context;
pub use error::ScriptError;
pub use event::translate;
pub use packet::build_packet;
pub use registry::{Class, Namespace, NativeFn};
pub use value::{HostRef, PeerRef, Table, Value};
