//! Client transport settings
//!
//! `TransportOpts` is the serializable, all-optional form found in config
//! files. Building it produces a `Transport`: every option that is present
//! overrides the matching default, everything else is left alone.

use crate::net::ip::same_family;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use socket2::{SockRef, TcpKeepalive};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::time::timeout;

/// Default cap on the size of a response head
pub const DEFAULT_MAX_RESPONSE_HEADER_BYTES: u64 = 64 * 1024;

/// Default socket buffer size for reads and writes
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Settings used when opening a TCP connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialer {
    /// Upper bound on the time spent connecting to one address
    pub timeout: Duration,

    /// Idle time before TCP keep-alive starts, also used as the interval
    /// between keep-alive packets; zero leaves keep-alive off
    pub keep_alive: Duration,

    /// Local address to bind before connecting
    pub local_addr: Option<SocketAddr>,
}

impl Default for Dialer {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            keep_alive: Duration::from_secs(30),
            local_addr: None,
        }
    }
}

/// Connection settings for the HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transport {
    pub dialer: Dialer,
    pub tls_handshake_timeout: Duration,
    pub idle_conn_timeout: Duration,
    /// Time allowed between sending a request and receiving the full
    /// response head. `None` waits indefinitely.
    pub response_header_timeout: Option<Duration>,
    pub expect_continue_timeout: Duration,
    pub max_response_header_bytes: u64,
    pub max_idle_conns: usize,
    pub max_idle_conns_per_host: usize,
    /// Zero means no limit
    pub max_conns_per_host: usize,
    pub write_buffer_size: usize,
    pub read_buffer_size: usize,
    pub force_attempt_http2: bool,
    /// Carried for pooling consumers; [`RangeClient`](crate::http::RangeClient)
    /// never reuses connections and always sends `Connection: close`
    pub disable_keep_alives: bool,
    pub disable_compression: bool,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            dialer: Dialer::default(),
            tls_handshake_timeout: Duration::from_secs(10),
            idle_conn_timeout: Duration::from_secs(90),
            response_header_timeout: None,
            expect_continue_timeout: Duration::from_secs(1),
            max_response_header_bytes: DEFAULT_MAX_RESPONSE_HEADER_BYTES,
            max_idle_conns: 100,
            max_idle_conns_per_host: 2,
            max_conns_per_host: 0,
            write_buffer_size: DEFAULT_BUFFER_SIZE,
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            force_attempt_http2: true,
            disable_keep_alives: false,
            disable_compression: false,
        }
    }
}

/// Optional overrides for a [`Transport`], as read from configuration.
///
/// Durations are written as `"10s"`, `"1m"`, `"500ms"` and only take effect
/// when non-zero. Integer and boolean fields take effect whenever they are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportOpts {
    #[serde(with = "humantime_serde")]
    pub dial_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub dial_keepalive: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub tls_handshake_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub idle_conn_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub response_header_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub expect_continue_timeout: Option<Duration>,
    pub max_response_header_bytes: Option<u64>,
    pub max_idle_conns: Option<usize>,
    pub max_idle_conns_per_host: Option<usize>,
    pub max_conns_per_host: Option<usize>,
    pub write_buffer_size: Option<usize>,
    pub read_buffer_size: Option<usize>,
    pub force_attempt_http2: Option<bool>,
    pub disable_keep_alives: Option<bool>,
    pub disable_compression: Option<bool>,
    /// `ip`, `ip:port` or `[ipv6]:port`
    pub local_addr: Option<String>,
}

impl TransportOpts {
    /// Builds a transport from the defaults.
    pub fn build(&self) -> Result<Transport> {
        self.build_on(Transport::default())
    }

    /// Applies these options on top of `base`.
    pub fn build_on(&self, mut base: Transport) -> Result<Transport> {
        let t = &mut base;

        if let Some(d) = nonzero(self.dial_timeout) {
            t.dialer.timeout = d;
        }
        if let Some(d) = nonzero(self.dial_keepalive) {
            t.dialer.keep_alive = d;
        }
        if let Some(addr) = self.local_addr.as_deref().filter(|a| !a.is_empty()) {
            t.dialer.local_addr = Some(parse_local_addr(addr)?);
        }

        if let Some(d) = nonzero(self.tls_handshake_timeout) {
            t.tls_handshake_timeout = d;
        }
        if let Some(v) = self.disable_keep_alives {
            t.disable_keep_alives = v;
        }
        if let Some(v) = self.disable_compression {
            t.disable_compression = v;
        }
        if let Some(v) = self.max_idle_conns {
            t.max_idle_conns = v;
        }
        if let Some(v) = self.max_idle_conns_per_host {
            t.max_idle_conns_per_host = v;
        }
        if let Some(v) = self.max_conns_per_host {
            t.max_conns_per_host = v;
        }
        if let Some(d) = nonzero(self.idle_conn_timeout) {
            t.idle_conn_timeout = d;
        }
        if let Some(d) = nonzero(self.response_header_timeout) {
            t.response_header_timeout = Some(d);
        }
        if let Some(d) = nonzero(self.expect_continue_timeout) {
            t.expect_continue_timeout = d;
        }
        if let Some(v) = self.max_response_header_bytes {
            t.max_response_header_bytes = v;
        }
        if let Some(v) = self.write_buffer_size {
            t.write_buffer_size = v;
        }
        if let Some(v) = self.read_buffer_size {
            t.read_buffer_size = v;
        }
        if let Some(v) = self.force_attempt_http2 {
            t.force_attempt_http2 = v;
        }

        tracing::debug!(transport = ?base, "Transport built");
        Ok(base)
    }
}

fn nonzero(d: Option<Duration>) -> Option<Duration> {
    d.filter(|d| !d.is_zero())
}

/// Parses a local bind address. The port is optional and defaults to 0.
pub fn parse_local_addr(addr: &str) -> Result<SocketAddr> {
    let (host, port) = match split_host_port(addr) {
        Some((host, port)) => (host, port),
        None => (addr, ""),
    };

    let ip: IpAddr = host
        .parse()
        .with_context(|| format!("invalid local_addr: {}", addr))?;

    let port = if port.is_empty() {
        0
    } else {
        port.parse::<u16>()
            .with_context(|| format!("invalid port in local_addr: {}", addr))?
    };

    Ok(SocketAddr::new(ip, port))
}

fn split_host_port(addr: &str) -> Option<(&str, &str)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        return Some((host, tail.strip_prefix(':')?));
    }

    let (host, port) = addr.rsplit_once(':')?;
    // A bare IPv6 literal has no port
    if host.contains(':') {
        return None;
    }
    Some((host, port))
}

impl Transport {
    /// Opens a TCP connection to `host:port`.
    ///
    /// Resolved addresses are tried in order. With a local address
    /// configured, only destinations of the same address family are tried.
    pub async fn connect(&self, host: &str, port: u16) -> Result<TcpStream> {
        let local = self.dialer.local_addr;

        let addrs: Vec<SocketAddr> = lookup_host((host, port))
            .await
            .with_context(|| format!("Failed to resolve {}:{}", host, port))?
            .filter(|addr| local.is_none_or(|l| same_family(&l.ip(), &addr.ip())))
            .collect();

        let mut last_error = None;

        for addr in addrs {
            match self.dial(addr).await {
                Ok(stream) => {
                    tracing::trace!(%addr, "Connected");
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "Dial attempt failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => anyhow::bail!(
                "No usable address for {}:{} (local address {:?})",
                host,
                port,
                local
            ),
        }
    }

    async fn dial(&self, addr: SocketAddr) -> Result<TcpStream> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };

        if !self.dialer.keep_alive.is_zero() {
            let keepalive = TcpKeepalive::new()
                .with_time(self.dialer.keep_alive)
                .with_interval(self.dialer.keep_alive);
            SockRef::from(&socket).set_tcp_keepalive(&keepalive)?;
        }
        if self.write_buffer_size > 0 {
            socket.set_send_buffer_size(clamp_u32(self.write_buffer_size))?;
        }
        if self.read_buffer_size > 0 {
            socket.set_recv_buffer_size(clamp_u32(self.read_buffer_size))?;
        }
        if let Some(local) = self.dialer.local_addr {
            let local = SocketAddr::new(local.ip().to_canonical(), local.port());
            socket
                .bind(local)
                .with_context(|| format!("Failed to bind local address {}", local))?;
        }

        timeout(self.dialer.timeout, socket.connect(addr))
            .await
            .context("Connection timeout")?
            .with_context(|| format!("Failed to connect to {}", addr))
    }
}

fn clamp_u32(v: usize) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}
