//! Encapsulated frame codec: fixed-offset header carrying node/peer addressing plus payload.
//!
//! Layout (network byte order): node address (16), node port (2), peer address (16),
//! peer port (2), then the application payload. The codec is direction-agnostic; swapping
//! node/peer roles for a reply is the pipeline's decision.

use std::fmt;
use std::net::Ipv6Addr;

/// Width of an address field on the wire.
pub const ADDRESS_LEN: usize = 16;

/// Fixed header length: two addresses and two ports.
pub const HEADER_SIZE: usize = ADDRESS_LEN + 2 + ADDRESS_LEN + 2;

const NODE_ADDR: usize = 0;
const NODE_PORT: usize = NODE_ADDR + ADDRESS_LEN;
const PEER_ADDR: usize = NODE_PORT + 2;
const PEER_PORT: usize = PEER_ADDR + ADDRESS_LEN;

/// Opaque 16-byte address as carried in the frame header. Compared by value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub const UNSPECIFIED: Address = Address([0; ADDRESS_LEN]);

    pub fn octets(&self) -> [u8; ADDRESS_LEN] {
        self.0
    }
}

impl From<Ipv6Addr> for Address {
    fn from(addr: Ipv6Addr) -> Self {
        Address(addr.octets())
    }
}

impl From<Address> for Ipv6Addr {
    fn from(addr: Address) -> Self {
        Ipv6Addr::from(addr.0)
    }
}

// Rendered IPv6-style for logs only; the bytes are never reinterpreted.
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Ipv6Addr::from(self.0), f)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

/// Addressing carried by one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Flow {
    pub node_address: Address,
    pub node_port: u16,
    pub peer_address: Address,
    pub peer_port: u16,
}

impl Flow {
    /// Same flow seen from the other end: node and peer slots exchanged.
    pub fn reversed(&self) -> Flow {
        Flow {
            node_address: self.peer_address,
            node_port: self.peer_port,
            peer_address: self.node_address,
            peer_port: self.node_port,
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]:{} <-> [{}]:{}",
            self.node_address, self.node_port, self.peer_address, self.peer_port
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("frame truncated: {len} bytes, header needs 36")]
    Truncated { len: usize },
}

/// Split a raw frame into its addressing and payload. The payload borrows from `buf`.
pub fn decode(buf: &[u8]) -> Result<(Flow, &[u8]), DecodeError> {
    if buf.len() < HEADER_SIZE {
        return Err(DecodeError::Truncated { len: buf.len() });
    }
    let flow = Flow {
        node_address: read_address(buf, NODE_ADDR),
        node_port: read_port(buf, NODE_PORT),
        peer_address: read_address(buf, PEER_ADDR),
        peer_port: read_port(buf, PEER_PORT),
    };
    Ok((flow, &buf[HEADER_SIZE..]))
}

/// Build a frame from addressing and payload.
pub fn encode(flow: &Flow, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&flow.node_address.0);
    out.extend_from_slice(&flow.node_port.to_be_bytes());
    out.extend_from_slice(&flow.peer_address.0);
    out.extend_from_slice(&flow.peer_port.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

fn read_address(buf: &[u8], at: usize) -> Address {
    let mut a = [0u8; ADDRESS_LEN];
    a.copy_from_slice(&buf[at..at + ADDRESS_LEN]);
    Address(a)
}

fn read_port(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}
