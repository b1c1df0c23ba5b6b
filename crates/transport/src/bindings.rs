use std::net::TcpListener;

use eyre::Result;

/// Ask the OS for a currently unused local TCP port
pub fn get_random_tcp_port() -> Result<u16> {
    for _ in 0..50 {
        match TcpListener::bind("127.0.0.1:0").and_then(|listener| listener.local_addr()) {
            Ok(addr) => return Ok(addr.port()),
            Err(e) => {
                tracing::warn!(%e, "binding");
            }
        }
    }

    eyre::bail!("could not get free port");
}
