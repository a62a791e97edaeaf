use actix_web::ResponseError;
use log::debug;
use tokio::time::Instant;

use keyquorum_core::{actix_web, log, tokio};

mod client;
mod error;
mod messages;

pub use client::*;
pub use error::*;
pub use messages::*;

/// Request log line: `METHOD path status elapsed-ms`
pub fn log_request<T>(
    log_target: &str,
    method: &str,
    path: &str,
    ok_status: u16,
    res: &Result<T, HttpError>,
    start: Instant,
) {
    let status = match res {
        Ok(_) => ok_status,
        Err(err) => err.status_code().as_u16(),
    };
    debug!(
        target: log_target,
        "{} {} {} {}ms",
        method,
        path,
        status,
        start.elapsed().as_millis()
    );
}
