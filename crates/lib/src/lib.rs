//! sixtun core library: frame codec, session table and the translating gateway
//! that relays encapsulated datagrams between constrained nodes and remote servers.

pub mod config;
pub mod error;
pub mod frame;
pub mod gateway;
pub mod init;
pub mod session;

pub use error::GatewayError;
