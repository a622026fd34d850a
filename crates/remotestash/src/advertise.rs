//! mDNS advertisement of a stash instance.
//!
//! Registers a `_remotestash._tcp.local.` service record carrying the
//! instance name, a locally-reachable address and port, and TXT properties
//! (`uuid` fresh per server lifetime, `temporary`). Unregisters on shutdown.

use anyhow::{Context, Result};
use mdns_sd::{ServiceDaemon, ServiceInfo};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use tracing::{debug, info};
use uuid::Uuid;

/// Well-known service type for stash instances.
pub const SERVICE_TYPE: &str = "_remotestash._tcp.local.";

/// Best-effort locally-reachable IPv4 address.
///
/// Connects a UDP socket to a non-routable address and reads back the local
/// endpoint the OS picked. No packet is sent. Falls back to loopback.
pub fn local_ipv4() -> Ipv4Addr {
    fn probe() -> std::io::Result<Ipv4Addr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("10.255.255.255:1")?;
        match socket.local_addr()? {
            SocketAddr::V4(addr) => Ok(*addr.ip()),
            SocketAddr::V6(_) => Ok(Ipv4Addr::LOCALHOST),
        }
    }
    probe().unwrap_or(Ipv4Addr::LOCALHOST)
}

/// Default instance name, derived from the owning user.
pub fn default_instance_name() -> String {
    let owner = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "local".to_string());
    format!("{owner} RemoteStash")
}

/// A registered advertisement. Call [`Advertisement::shutdown`] to withdraw
/// the record before the process exits.
pub struct Advertisement {
    daemon: ServiceDaemon,
    fullname: String,
    pub uuid: String,
}

impl Advertisement {
    /// Register a service record for this stash instance.
    pub fn register(name: &str, addr: Ipv4Addr, port: u16) -> Result<Self> {
        let daemon = ServiceDaemon::new().context("failed to start mDNS daemon")?;

        let uuid = Uuid::new_v4().to_string();
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        let host = format!("{hostname}.local.");
        let properties = HashMap::from([
            ("uuid".to_string(), uuid.clone()),
            ("temporary".to_string(), "no".to_string()),
        ]);

        let service = ServiceInfo::new(
            SERVICE_TYPE,
            name,
            &host,
            std::net::IpAddr::V4(addr),
            port,
            properties,
        )
            .context("failed to build mDNS service record")?;
        let fullname = service.get_fullname().to_string();

        daemon
            .register(service)
            .context("failed to register mDNS service")?;
        info!(%fullname, %addr, port, "advertising stash instance");

        Ok(Self {
            daemon,
            fullname,
            uuid,
        })
    }

    /// Unregister the record and release the daemon.
    pub fn shutdown(&self) {
        debug!(fullname = %self.fullname, "unregistering mDNS service");
        let _ = self.daemon.unregister(&self.fullname);
        let _ = self.daemon.shutdown();
    }
}
