mod coordinator;
mod dispatcher;
mod http;
mod locks;
mod notifier;
mod policy;
mod store;

pub use coordinator::*;
pub use dispatcher::*;
pub use http::*;
pub use locks::*;
pub use notifier::*;
pub use policy::*;
pub use store::*;
