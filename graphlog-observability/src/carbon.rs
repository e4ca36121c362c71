//! Carbon plaintext protocol client.
//!
//! One data point per line:
//! ```text
//! <path> <value> <unix-timestamp>\n
//! ```
//!
//! The client owns one TCP connection for its whole life. There is no
//! reconnect, retry or batching: a failed write drops that point and leaves
//! the connection as it was.

use chrono::Utc;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

pub struct CarbonClient {
    address: String,
    timeout: Option<Duration>,
    stream: Option<TcpStream>,
    closed: bool,
}

impl CarbonClient {
    /// Connect to `address` (`host:port`), trying every resolved address
    /// IPv4-first. `timeout` bounds connect and each write; `None` blocks.
    pub fn connect(address: &str, timeout: Option<Duration>) -> io::Result<Self> {
        let candidates = resolve_addrs(address)?;
        let mut last_err = None;

        for sa in &candidates {
            let attempt = match timeout {
                Some(t) => TcpStream::connect_timeout(sa, t),
                None => TcpStream::connect(sa),
            };
            match attempt {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    stream.set_write_timeout(timeout)?;
                    debug!(addr = %address, resolved = %sa, "Carbon connected");
                    return Ok(Self {
                        address: address.to_string(),
                        timeout,
                        stream: Some(stream),
                        closed: false,
                    });
                }
                Err(e) => {
                    debug!(addr = %address, resolved = %sa, error = %e, "Carbon candidate failed, trying next");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address resolved for {address}"),
            )
        }))
    }

    /// A client with no connection. Every send fails with `NotConnected`.
    pub fn disconnected(address: &str, timeout: Option<Duration>) -> Self {
        Self {
            address: address.to_string(),
            timeout,
            stream: None,
            closed: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Send one point stamped with the current wall-clock second.
    pub fn send(&mut self, path: &str, value: &str) -> io::Result<()> {
        self.send_at(path, value, Utc::now().timestamp())
    }

    pub fn send_at(&mut self, path: &str, value: &str, timestamp: i64) -> io::Result<()> {
        let stream = match self.stream.as_mut() {
            Some(s) => s,
            None if self.closed => {
                return Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    format!("carbon connection to {} is closed", self.address),
                ));
            }
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    format!("not connected to carbon at {}", self.address),
                ));
            }
        };
        stream.write_all(format_line(path, value, timestamp).as_bytes())?;
        stream.flush()
    }

    /// Release the connection. Later sends fail with `NotConnected`.
    pub fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        match self.stream.take() {
            Some(mut stream) => {
                stream.flush()?;
                match stream.shutdown(Shutdown::Both) {
                    Ok(()) => Ok(()),
                    // Peer already gone.
                    Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
                    Err(e) => Err(e),
                }
            }
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for CarbonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarbonClient")
            .field("address", &self.address)
            .field("timeout", &self.timeout)
            .field("connected", &self.stream.is_some())
            .finish()
    }
}

/// One plaintext-protocol line, newline included.
pub fn format_line(path: &str, value: &str, timestamp: i64) -> String {
    format!("{path} {value} {timestamp}\n")
}

/// Resolve `host:port` into candidates, IPv4 addresses first.
fn resolve_addrs(addr: &str) -> io::Result<Vec<SocketAddr>> {
    if let Ok(sa) = addr.parse::<SocketAddr>() {
        return Ok(vec![sa]);
    }
    let all: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
    let mut v4: Vec<SocketAddr> = all.iter().copied().filter(|a| a.is_ipv4()).collect();
    let v6: Vec<SocketAddr> = all.iter().copied().filter(|a| a.is_ipv6()).collect();
    v4.extend(v6);
    Ok(v4)
}
