//! Configuration utilities (ports, timeouts, env vars)

use std::net::{Ipv4Addr, SocketAddr};
use std::{env, time::Duration};

/// Socket address to bind the server to.
///
/// Reads the `PORT` env var or defaults to 8080, binds to 0.0.0.0.
pub fn server_addr() -> SocketAddr {
    let port = env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8080);
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

/// How long an empty room lingers before its task reclaims it.
///
/// Reads `ROOM_GRACE_SECS`, defaults to 30 seconds.
pub fn empty_room_grace() -> Duration {
    let secs = env::var("ROOM_GRACE_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(30);
    Duration::from_secs(secs)
}
