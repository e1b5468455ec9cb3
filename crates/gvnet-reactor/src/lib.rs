//! # gvnet-reactor — readiness-poll dispatcher
//!
//! One [`Reactor`] owns a set of channels and drives them from a single
//! thread: expire idle channels, admit injected ones, `poll(2)` every
//! descriptor, flush writers, then feed readers and listeners. A channel
//! that fails is closed and evicted on its own; the loop keeps serving the
//! rest.
//!
//! Other threads hand channels over through an [`Injector`] and ask the
//! loop to finish through a [`StopHandle`].
//!
//! [`Injector`]: gvnet_core::Injector

pub mod config;
pub mod error;
pub mod hooks;
pub mod poller;
pub mod reactor;
pub mod stats;

pub use config::ReactorConfig;
pub use error::{ReactorError, Result};
pub use hooks::{CloseReason, NoHooks, ReactorHooks};
pub use poller::PollSet;
pub use reactor::{ChannelId, Reactor, StopHandle};
pub use stats::ReactorStats;
