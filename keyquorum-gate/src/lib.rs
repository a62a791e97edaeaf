mod envelope;
mod gate;
mod http;
mod outcome;

pub use envelope::*;
pub use gate::*;
pub use http::*;
pub use outcome::*;
