//! Free port allocation
//!
//! Ports are reserved in a process-wide set before the bind probe, so two
//! concurrent allocations can never hand out the same port. A reservation is
//! released when its [`PortReservation`] is dropped.

use std::net::TcpListener;

use dashmap::DashSet;
use once_cell::sync::Lazy;

use crate::error::{Result, WebDriverError};

static RESERVED: Lazy<DashSet<u16>> = Lazy::new(DashSet::new);

/// A port held for one service until dropped.
#[derive(Debug)]
pub struct PortReservation {
    port: u16,
}

impl PortReservation {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortReservation {
    fn drop(&mut self) {
        RESERVED.remove(&self.port);
    }
}

/// Reserve the first free port at or above `preferred`, falling back to an
/// OS-assigned port when the range above is exhausted.
pub fn allocate(host: &str, preferred: u16) -> Result<PortReservation> {
    for port in preferred.max(1)..=u16::MAX {
        if !RESERVED.insert(port) {
            continue;
        }
        if is_free(host, port) {
            tracing::debug!(port, preferred, "allocated driver port");
            return Ok(PortReservation { port });
        }
        RESERVED.remove(&port);
    }

    let listener = TcpListener::bind((host, 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    if RESERVED.insert(port) {
        return Ok(PortReservation { port });
    }
    Err(WebDriverError::Config(format!(
        "no free port available on {host} from {preferred}"
    )))
}

/// Hold a caller-chosen port so no allocation hands it out.
pub fn reserve(port: u16) -> Option<PortReservation> {
    RESERVED.insert(port).then_some(PortReservation { port })
}

fn is_free(host: &str, port: u16) -> bool {
    TcpListener::bind((host, port)).is_ok()
}
