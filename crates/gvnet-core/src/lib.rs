//! # gvnet-core — channel contract
//!
//! Everything the reactor and the transport implementations agree on:
//!
//! - [`Channel`]: the capability interface every channel variant implements
//! - [`ChannelCore`]: tx/rx FIFOs, active flag, blocking mode, registration
//! - [`Transport`] / [`Acceptor`]: the minimum needed from an OS handle
//! - [`Timeout`]: non-blocking, blocking, bounded blocking
//! - [`ChannelError`]: the four-way error taxonomy
//! - [`Injector`]: the one cross-thread entry point into a running reactor
//!
//! Concrete channels live in `gvnet-module`, the dispatcher in
//! `gvnet-reactor`.

pub mod buffer;
pub mod channel;
pub mod config;
pub mod env;
pub mod error;
pub mod registry;
pub mod timeout;
pub mod transport;

pub use buffer::ByteFifo;
pub use channel::{Accepted, Channel, ChannelCore, ReadOpts};
pub use config::{ChannelConfig, ConfigError};
pub use error::{ChannelError, Result};
pub use registry::{InjectQueue, Injector, Registration, RegistrationToken};
pub use timeout::Timeout;
pub use transport::{Acceptor, Transport};
