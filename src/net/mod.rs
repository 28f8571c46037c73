//! Backend boundary: request/response types and the transport that carries them.

pub mod client;
pub mod types;

pub use client::{HttpTransport, Transport};
pub use types::{Connectivity, Method, Payload, Request, Response, WriteMethod};
