//! Transports that carry renderer commands into the gate.

pub mod bridge;

pub use bridge::{BridgeInfo, SENDER_HEADER, app, bind_addr, body_limit, serve};
