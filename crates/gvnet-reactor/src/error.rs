//! Reactor errors.

use gvnet_core::{ChannelError, ConfigError};
use nix::errno::Errno;
use thiserror::Error;

use crate::reactor::ChannelId;

#[derive(Debug, Error)]
pub enum ReactorError {
    /// The readiness poll failed and no single channel could be blamed.
    #[error("readiness poll failed: {0}")]
    Poll(#[source] Errno),

    /// Registering or releasing a channel failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no channel {0} in this reactor")]
    UnknownChannel(ChannelId),
}

pub type Result<T> = std::result::Result<T, ReactorError>;
