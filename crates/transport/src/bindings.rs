use std::net::TcpListener;

use eyre::{Result, WrapErr};

/// Find a free local port for a debuggee to connect back to.
pub fn get_random_tcp_port() -> Result<u16> {
    for _ in 0..50 {
        match TcpListener::bind("127.0.0.1:0") {
            Ok(listener) => {
                let addr = listener.local_addr().wrap_err("reading bound address")?;
                return Ok(addr.port());
            }
            Err(e) => {
                tracing::warn!(%e, "binding");
            }
        }
    }

    eyre::bail!("could not get free port");
}
