// SPDX-License-Identifier: MIT
//! One-shot reachability check for the OTLP collector.
//!
//! Export is only configured when something accepts TCP connections at the
//! collector address. The check is a bare connect with a short timeout; no
//! bytes are exchanged and nothing is retried.
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use url::Url;

/// Timeout used by [`is_collector_available`].
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Reduce an endpoint to the `host[:port]` form a TCP dial needs.
///
/// `http://` and `https://` URLs are reduced to their authority. Anything else,
/// including URLs that fail to parse, is returned unchanged.
pub fn normalize_endpoint(endpoint: &str) -> String {
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return endpoint.to_string();
    }
    match Url::parse(endpoint) {
        Ok(url) => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => endpoint.to_string(),
        },
        Err(_) => endpoint.to_string(),
    }
}

/// Whether a collector accepts connections at `endpoint`, within [`PROBE_TIMEOUT`].
pub fn is_collector_available(endpoint: &str) -> bool {
    is_collector_available_within(endpoint, PROBE_TIMEOUT)
}

/// Like [`is_collector_available`] with an explicit timeout.
///
/// Name resolution counts against the timeout. When the endpoint resolves to
/// several addresses they are tried in order, all within the same deadline.
pub fn is_collector_available_within(endpoint: &str, timeout: Duration) -> bool {
    available_with(endpoint, timeout, resolve)
}

fn available_with<F>(endpoint: &str, timeout: Duration, resolver: F) -> bool
where
    F: FnOnce(&str) -> io::Result<Vec<SocketAddr>> + Send + 'static,
{
    let deadline = Instant::now() + timeout;

    // The resolver thread is left behind if it outlives the deadline.
    let (tx, rx) = mpsc::channel();
    let endpoint_owned = endpoint.to_string();
    thread::spawn(move || {
        let _ = tx.send(resolver(&endpoint_owned));
    });
    let addrs = match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(Ok(addrs)) => addrs,
        Ok(Err(_)) | Err(_) => return false,
    };

    for addr in addrs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        if TcpStream::connect_timeout(&addr, remaining).is_ok() {
            return true;
        }
    }
    false
}

fn resolve(endpoint: &str) -> io::Result<Vec<SocketAddr>> {
    let address = normalize_endpoint(endpoint);
    match address.to_socket_addrs() {
        Ok(addrs) => Ok(addrs.collect()),
        // URL without an explicit port: dial the scheme's default one.
        Err(err) => match Url::parse(endpoint)
            .ok()
            .and_then(|url| url.port_or_known_default())
        {
            Some(port) => {
                let host = address.trim_start_matches('[').trim_end_matches(']');
                Ok((host, port).to_socket_addrs()?.collect())
            }
            None => Err(err),
        },
    }
}
