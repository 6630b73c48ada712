//! Primary outbound IPv4 address detection.
//!
//! Connecting a UDP socket sends no packets but makes the OS pick the
//! interface it would route through, which is the address other machines on
//! the LAN can usually reach us at.  When there is no route (offline machine,
//! sandbox), loopback is returned.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use tracing::debug;

/// Address used only to select a route; nothing is sent to it.
const ROUTE_SELECT_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 80);

/// Returns the primary outbound IPv4 address, or `127.0.0.1`.
pub fn primary_ipv4() -> Ipv4Addr {
    match route_local_addr(ROUTE_SELECT_ADDR) {
        Ok(addr) => addr,
        Err(e) => {
            debug!(error = %e, "no outbound route; falling back to loopback");
            Ipv4Addr::LOCALHOST
        }
    }
}

fn route_local_addr(target: SocketAddr) -> io::Result<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(target)?;
    match socket.local_addr()?.ip() {
        IpAddr::V4(addr) if !addr.is_unspecified() => Ok(addr),
        other => Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("unusable local address {other}"),
        )),
    }
}
