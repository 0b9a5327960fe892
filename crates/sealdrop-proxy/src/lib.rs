//! sealdrop-proxy: turns a programmatically-fed byte source into something a
//! pull-style consumer can download.
//!
//! The ultimate sink is a generic download mechanism that issues a request
//! and streams the response body; it cannot accept push callbacks. The
//! bridge owns a registry of pending streams keyed by opaque virtual
//! address: a producer registers the stream descriptor, waits for the
//! bridge's ready acknowledgement, then points the consumer at the address.
//! The HTTP front claims the registration, fetches the remote ciphertext,
//! pipes it through the frame coalescer, and streams the plaintext out as
//! the response body.

pub mod bridge;
pub mod http;

pub use bridge::{BridgeHandle, ProxyBridge, Registration};
pub use http::{router, serve, ProxyState};
