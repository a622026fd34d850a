//! Browsing for advertised stash instances.
//!
//! A browse session runs against a wall-clock timeout on the tokio timer,
//! independent of any request I/O the caller performs afterwards. The first
//! matching resolved record is returned through normal control flow; the
//! browse is stopped before returning, so "found" and "timed out" are both
//! ordinary results rather than process exits.

use anyhow::{Context, Result};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

use crate::advertise::SERVICE_TYPE;

/// A resolved advertisement, read-only and ephemeral.
#[derive(Debug, Clone)]
pub struct Discovered {
    /// Full instance name (e.g. `alice RemoteStash._remotestash._tcp.local.`).
    pub name: String,
    pub hostname: String,
    pub addr: IpAddr,
    pub port: u16,
    pub uuid: Option<String>,
}

impl Discovered {
    fn from_info(info: &ServiceInfo) -> Option<Self> {
        let addresses = info.get_addresses();
        let addr = addresses
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addresses.iter().next())
            .copied()?;

        Some(Self {
            name: info.get_fullname().to_string(),
            hostname: info.get_hostname().to_string(),
            addr,
            port: info.get_port(),
            uuid: info.get_property_val_str("uuid").map(str::to_string),
        })
    }
}

/// Does an instance name pass the optional substring filter?
pub fn name_matches(fullname: &str, filter: Option<&str>) -> bool {
    filter.map_or(true, |f| fullname.contains(f))
}

/// Browse for up to `timeout`, returning the first advertisement whose
/// instance name contains `filter`. `Ok(None)` when nothing matched in time.
pub async fn find_first(filter: Option<&str>, timeout: Duration) -> Result<Option<Discovered>> {
    let daemon = ServiceDaemon::new().context("failed to start mDNS daemon")?;
    let receiver = daemon
        .browse(SERVICE_TYPE)
        .context("failed to browse for stash instances")?;

    let deadline = tokio::time::Instant::now() + timeout;
    let mut found = None;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        let event = match tokio::time::timeout(remaining, receiver.recv_async()).await {
            Err(_) => break,     // browse timeout elapsed
            Ok(Err(_)) => break, // daemon channel closed
            Ok(Ok(event)) => event,
        };
        if let ServiceEvent::ServiceResolved(info) = event {
            if !name_matches(info.get_fullname(), filter) {
                debug!(
                    name = info.get_fullname(),
                    "skipping instance, name filter does not match"
                );
                continue;
            }
            if let Some(discovered) = Discovered::from_info(&info) {
                found = Some(discovered);
                break;
            }
        }
    }

    let _ = daemon.stop_browse(SERVICE_TYPE);
    let _ = daemon.shutdown();
    Ok(found)
}

/// Browse until the timeout elapses, invoking `on_found` for every resolved
/// instance. The timeout is the normal termination condition; returns the
/// number of instances seen.
pub async fn list_all(timeout: Duration, mut on_found: impl FnMut(&Discovered)) -> Result<usize> {
    let daemon = ServiceDaemon::new().context("failed to start mDNS daemon")?;
    let receiver = daemon
        .browse(SERVICE_TYPE)
        .context("failed to browse for stash instances")?;

    let deadline = tokio::time::Instant::now() + timeout;
    let mut count = 0;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        let event = match tokio::time::timeout(remaining, receiver.recv_async()).await {
            Err(_) => break,
            Ok(Err(_)) => break,
            Ok(Ok(event)) => event,
        };
        if let ServiceEvent::ServiceResolved(info) = event {
            if let Some(discovered) = Discovered::from_info(&info) {
                count += 1;
                on_found(&discovered);
            }
        }
    }

    let _ = daemon.stop_browse(SERVICE_TYPE);
    let _ = daemon.shutdown();
    Ok(count)
}
