//! # gvnet-module — channel implementations
//!
//! Concrete [`Channel`](gvnet_core::Channel) variants:
//!
//! | Type                   | Transport                         | Error policy      |
//! |------------------------|-----------------------------------|-------------------|
//! | `StreamChannel<T>`     | any [`Transport`](gvnet_core::Transport) | [`PlainPolicy`]   |
//! | `ServerChannel<A>`     | any [`Acceptor`](gvnet_core::Acceptor)   | [`PlainPolicy`]   |
//! | `SecureStreamChannel`  | [`TlsTransport`] (rustls)         | [`SecurePolicy`]  |
//! | `SecureServerChannel`  | `TcpListener` + rustls server cfg | [`SecurePolicy`]  |
//! | `ExpiringChannel<C>`   | wraps any channel                 | inherited         |
//!
//! The secure variants are the plain ones with a different error policy, so
//! switching a deployment to TLS is a type alias change.

pub mod expiring;
pub mod policy;
pub mod secure;
pub mod server;
pub mod stream;
pub mod tls;

#[cfg(test)]
pub(crate) mod testing;

pub use expiring::ExpiringChannel;
pub use policy::{ErrorClass, ErrorPolicy, IoOp, PlainPolicy};
pub use secure::{SecurePolicy, SecureServerChannel, SecureStreamChannel};
pub use server::ServerChannel;
pub use stream::StreamChannel;
pub use tls::TlsTransport;
