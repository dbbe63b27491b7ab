//! Remote broker-copy provider: wire types, gateway trait, HTTP client.

mod client;
mod gateway;
mod types;

pub use client::ProviderClient;
pub use gateway::{CopyGateway, CopyLink, RemoteAccount, RemoteError, RemoteErrorKind};
pub use types::*;
