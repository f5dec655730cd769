//! Access log sink.
//!
//! Request/response style records keyed by client address and category, kept
//! on their own `access` tracing target so they can be filtered or routed
//! separately from diagnostic output (`RUST_LOG=access=info`).

use std::fmt::Display;
use std::net::IpAddr;
use tracing::{info, warn};

/// Records a handled request with its status.
pub fn write_log(ip: IpAddr, category: &str, message: &str, status: u16) {
    info!(
        target: "access",
        ip = %ip,
        category,
        status,
        "{}",
        message
    );
}

/// Records a failure attributed to a client. The client is never told.
pub fn write_err_log(ip: IpAddr, category: &str, error: impl Display) {
    warn!(
        target: "access",
        ip = %ip,
        category,
        status = 500u16,
        "{}",
        error
    );
}
