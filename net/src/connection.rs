//! Network connection configuration of an application entity.
//!
//! A [`Connection`] describes one transport endpoint:
//! the host name and port it listens on, if any,
//! the protocol it speaks, TLS settings,
//! and the association parameters offered through it.
use std::fmt;
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use snafu::{ensure, OptionExt, ResultExt};
use tracing::debug;

use crate::error::{
    ConnectSnafu, ConnectTimeoutSnafu, NotListeningSnafu, ResolveAddressSnafu, Result,
    SocketOptionsSnafu, TlsUnavailableSnafu,
};
use crate::pdu::{DEFAULT_MAX_OPS, DEFAULT_MAX_PDU};

/// The protocol spoken through a connection.
#[derive(Debug, Copy, Clone, Default, Eq, Hash, PartialEq)]
pub enum Protocol {
    #[default]
    Dicom,
    Hl7,
    Syslog,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Dicom => f.write_str("DICOM"),
            Protocol::Hl7 => f.write_str("HL7"),
            Protocol::Syslog => f.write_str("Syslog"),
        }
    }
}

/// Timeouts applied to sockets opened through a connection.
#[derive(Debug, Copy, Clone, Default, Eq, Hash, PartialEq)]
pub struct SocketOptions {
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub connection_timeout: Option<Duration>,
}

/// A network connection of an application entity.
///
/// # Example
///
/// ```
/// # use dicom_net::connection::Connection;
/// let conn = Connection::new("127.0.0.1")
///     .with_port(11112)
///     .with_max_ops_invoked(0)
///     .with_receive_pdu_length(32_768);
/// assert!(conn.is_listening());
/// assert_eq!(conn.to_string(), "Connection[dicom://127.0.0.1:11112]");
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Connection {
    common_name: Option<String>,
    hostname: String,
    port: Option<u16>,
    protocol: Protocol,
    tls_cipher_suites: Vec<String>,
    max_ops_invoked: u32,
    max_ops_performed: u32,
    receive_pdu_length: u32,
    send_pdu_length: u32,
    socket_options: SocketOptions,
    tcp_no_delay: bool,
}

impl Connection {
    /// Create a DICOM connection on the given host,
    /// not listening on any port.
    pub fn new(hostname: impl Into<String>) -> Self {
        Connection {
            common_name: None,
            hostname: hostname.into(),
            port: None,
            protocol: Protocol::Dicom,
            tls_cipher_suites: Vec::new(),
            max_ops_invoked: DEFAULT_MAX_OPS,
            max_ops_performed: DEFAULT_MAX_OPS,
            receive_pdu_length: DEFAULT_MAX_PDU,
            send_pdu_length: DEFAULT_MAX_PDU,
            socket_options: SocketOptions::default(),
            tcp_no_delay: true,
        }
    }

    pub fn with_common_name(mut self, common_name: impl Into<String>) -> Self {
        self.common_name = Some(common_name.into());
        self
    }

    /// Set the port this connection listens on.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Add a TLS cipher suite,
    /// which makes this a TLS connection.
    pub fn with_tls_cipher_suite(mut self, cipher_suite: impl Into<String>) -> Self {
        let cipher_suite = cipher_suite.into();
        if !self.tls_cipher_suites.contains(&cipher_suite) {
            self.tls_cipher_suites.push(cipher_suite);
        }
        self
    }

    /// Set the maximum number of outstanding operations
    /// invoked through this connection (`0` means unlimited).
    pub fn with_max_ops_invoked(mut self, max_ops_invoked: u32) -> Self {
        self.max_ops_invoked = max_ops_invoked;
        self
    }

    /// Set the maximum number of outstanding operations
    /// performed through this connection (`0` means unlimited).
    pub fn with_max_ops_performed(mut self, max_ops_performed: u32) -> Self {
        self.max_ops_performed = max_ops_performed;
        self
    }

    /// Set the maximum PDU length this side is willing to receive.
    pub fn with_receive_pdu_length(mut self, length: u32) -> Self {
        self.receive_pdu_length = length;
        self
    }

    /// Set the maximum PDU length this side is willing to send.
    pub fn with_send_pdu_length(mut self, length: u32) -> Self {
        self.send_pdu_length = length;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.socket_options.read_timeout = Some(timeout);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.socket_options.write_timeout = Some(timeout);
        self
    }

    /// Set the timeout for establishing the transport to the remote node.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.socket_options.connection_timeout = Some(timeout);
        self
    }

    pub fn with_tcp_no_delay(mut self, tcp_no_delay: bool) -> Self {
        self.tcp_no_delay = tcp_no_delay;
        self
    }

    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn tls_cipher_suites(&self) -> &[String] {
        &self.tls_cipher_suites
    }

    pub fn is_tls(&self) -> bool {
        !self.tls_cipher_suites.is_empty()
    }

    /// Whether this connection accepts inbound transports.
    pub fn is_listening(&self) -> bool {
        self.port.is_some()
    }

    pub fn max_ops_invoked(&self) -> u32 {
        self.max_ops_invoked
    }

    pub fn max_ops_performed(&self) -> u32 {
        self.max_ops_performed
    }

    pub fn receive_pdu_length(&self) -> u32 {
        self.receive_pdu_length
    }

    pub fn send_pdu_length(&self) -> u32 {
        self.send_pdu_length
    }

    pub fn socket_options(&self) -> &SocketOptions {
        &self.socket_options
    }

    pub fn tcp_no_delay(&self) -> bool {
        self.tcp_no_delay
    }

    /// Check whether a transport can be established
    /// from this connection to the given remote connection.
    ///
    /// Both must speak the same protocol,
    /// either both or neither use TLS
    /// (sharing at least one cipher suite),
    /// and be of the same address family
    /// when both host names are IP address literals.
    /// The remote connection must be listening.
    pub fn is_compatible(&self, remote: &Connection) -> bool {
        if self.protocol != remote.protocol || !remote.is_listening() {
            return false;
        }
        if self.is_tls() != remote.is_tls() {
            return false;
        }
        if self.is_tls()
            && !self
                .tls_cipher_suites
                .iter()
                .any(|cs| remote.tls_cipher_suites.contains(cs))
        {
            return false;
        }
        match (
            self.hostname.parse::<IpAddr>(),
            remote.hostname.parse::<IpAddr>(),
        ) {
            (Ok(local), Ok(remote)) => local.is_ipv4() == remote.is_ipv4(),
            _ => true,
        }
    }

    fn remote_socket_addrs(remote: &Connection) -> Result<Vec<SocketAddr>> {
        let port = remote.port.context(NotListeningSnafu {
            remote: remote.to_string(),
        })?;
        ensure!(
            !remote.is_tls(),
            TlsUnavailableSnafu {
                remote: remote.to_string()
            }
        );
        let addrs = (remote.hostname.as_str(), port)
            .to_socket_addrs()
            .context(ResolveAddressSnafu {
                remote: remote.to_string(),
            })?;
        Ok(addrs.collect())
    }

    /// Open a TCP transport to the given remote connection,
    /// applying the socket options of this connection.
    pub fn open(&self, remote: &Connection) -> Result<TcpStream> {
        let addrs = Self::remote_socket_addrs(remote)?;
        debug!("{}: connecting to {}", self, remote);

        let mut last_err = None;
        let mut socket = None;
        for addr in &addrs {
            let attempt = match self.socket_options.connection_timeout {
                Some(timeout) => TcpStream::connect_timeout(addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(s) => {
                    socket = Some(s);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }
        let socket = match (socket, last_err) {
            (Some(socket), _) => socket,
            (None, Some(e)) if e.kind() == std::io::ErrorKind::TimedOut => {
                return ConnectTimeoutSnafu {
                    remote: remote.to_string(),
                }
                .fail();
            }
            (None, e) => {
                let e = e.unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved")
                });
                return Err(e).context(ConnectSnafu {
                    remote: remote.to_string(),
                });
            }
        };

        socket
            .set_read_timeout(self.socket_options.read_timeout)
            .context(SocketOptionsSnafu)?;
        socket
            .set_write_timeout(self.socket_options.write_timeout)
            .context(SocketOptionsSnafu)?;
        socket
            .set_nodelay(self.tcp_no_delay)
            .context(SocketOptionsSnafu)?;
        Ok(socket)
    }

    /// Open a TCP transport to the given remote connection asynchronously.
    #[cfg(feature = "async")]
    pub async fn open_async(&self, remote: &Connection) -> Result<tokio::net::TcpStream> {
        let addrs = Self::remote_socket_addrs(remote)?;
        debug!("{}: connecting to {}", self, remote);

        let connect = tokio::net::TcpStream::connect(addrs.as_slice());
        let socket = match self.socket_options.connection_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect)
                .await
                .ok()
                .context(ConnectTimeoutSnafu {
                    remote: remote.to_string(),
                })?,
            None => connect.await,
        }
        .context(ConnectSnafu {
            remote: remote.to_string(),
        })?;

        socket
            .set_nodelay(self.tcp_no_delay)
            .context(SocketOptionsSnafu)?;
        Ok(socket)
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Connection[")?;
        if let Some(cn) = &self.common_name {
            write!(f, "{}: ", cn)?;
        }
        let scheme = match (self.protocol, self.is_tls()) {
            (Protocol::Dicom, false) => "dicom",
            (Protocol::Dicom, true) => "dicom-tls",
            (Protocol::Hl7, false) => "hl7",
            (Protocol::Hl7, true) => "hl7-tls",
            (Protocol::Syslog, false) => "syslog",
            (Protocol::Syslog, true) => "syslog-tls",
        };
        write!(f, "{}://{}", scheme, self.hostname)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        f.write_str("]")
    }
}
