//! Oracle Adapters - Concrete Protocol Capabilities
//!
//! `HttpOracleAdapter` reads feeds from a JSON gateway in front of any
//! protocol; it is what the binary registers for every configured protocol.

pub mod http;

pub use http::{HttpAdapterFactory, HttpOracleAdapter};
