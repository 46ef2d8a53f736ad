//! Outbound connectivity probe

use std::net::{SocketAddr, UdpSocket};

/// Reports whether an outbound network route exists
pub trait Connectivity: Send + Sync {
    /// Whether the host currently looks online
    fn is_online(&self) -> bool;
}

/// Probes for a default route by connecting a UDP socket
///
/// Connecting a UDP socket sends no packets; it only asks the OS to pick a
/// route, which fails when no interface is up.
#[derive(Debug, Clone)]
pub struct RouteProbe {
    target: SocketAddr,
}

impl Default for RouteProbe {
    fn default() -> Self {
        Self {
            target: SocketAddr::from(([8, 8, 8, 8], 53)),
        }
    }
}

impl RouteProbe {
    /// Probe the route towards `target`
    #[must_use]
    pub const fn new(target: SocketAddr) -> Self {
        Self { target }
    }
}

impl Connectivity for RouteProbe {
    fn is_online(&self) -> bool {
        let bind = if self.target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let online = UdpSocket::bind(bind)
            .and_then(|socket| socket.connect(self.target))
            .is_ok();
        if !online {
            tracing::debug!(target = %self.target, "no outbound route");
        }
        online
    }
}

/// Always reports online
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeOnline;

impl Connectivity for AssumeOnline {
    fn is_online(&self) -> bool {
        true
    }
}
