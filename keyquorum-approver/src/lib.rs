mod forwarder;
mod http;
mod server;

pub use forwarder::*;
pub use http::*;
pub use server::*;
