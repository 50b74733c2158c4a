//! The Redis serialization protocol, as spoken by the backend side of the proxy.

pub mod codec;
pub mod frame;

pub use codec::RespCodec;
pub use frame::Frame;
