//! Packet channel over a connected stream socket.

use std::future::Future;
use std::io;
use std::time::Duration;

use obsrpc_core::protocol::{Packet, HEADER_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::{Endpoint, TransportError};

/// Default ceiling for a single inbound payload (16 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<S: AsyncRead + AsyncWrite + Send + Unpin> Stream for S {}

#[derive(Debug, Clone, Copy)]
pub struct ChannelOptions {
    /// `None` waits for the OS to give up.
    pub connect_timeout: Option<Duration>,
    /// Applies to each header or payload transfer separately.
    pub io_timeout: Option<Duration>,
    /// Largest `length` accepted from a peer.
    pub max_payload: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            io_timeout: None,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

async fn within<T, F>(limit: Option<Duration>, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .map_err(|_| TransportError::TimedOut)?
            .map_err(TransportError::from),
        None => fut.await.map_err(TransportError::from),
    }
}

#[cfg(not(unix))]
fn unsupported() -> TransportError {
    TransportError::Io("unix sockets are not supported on this platform".into())
}

/// One connected peer. Exclusively owned; at most one packet in flight.
pub struct Channel {
    io: Box<dyn Stream>,
    peer: String,
    opts: ChannelOptions,
}

impl Channel {
    pub async fn connect(endpoint: &Endpoint, opts: ChannelOptions) -> Result<Self, TransportError> {
        let io: Box<dyn Stream> = match endpoint {
            Endpoint::Tcp { host, port } => {
                let stream =
                    within(opts.connect_timeout, TcpStream::connect((host.as_str(), *port))).await?;
                stream.set_nodelay(true)?;
                Box::new(stream)
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream =
                    within(opts.connect_timeout, tokio::net::UnixStream::connect(path)).await?;
                Box::new(stream)
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => return Err(unsupported()),
        };
        tracing::debug!(peer = %endpoint, "connected");
        Ok(Self {
            io,
            peer: endpoint.to_string(),
            opts,
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn options(&self) -> ChannelOptions {
        self.opts
    }

    /// Receive one packet into `packet`, growing its envelope when the
    /// announced payload does not fit. `io_timeout` bounds the whole read.
    ///
    /// On `TooLarge` the header has been consumed but the payload has not, so
    /// the stream is no longer framed and should be closed after replying.
    pub async fn read_packet(&mut self, packet: &mut Packet) -> Result<(), TransportError> {
        let mut header = [0u8; HEADER_SIZE];
        within(self.opts.io_timeout, self.io.read_exact(&mut header)).await?;
        self.read_rest(header, packet).await
    }

    /// Server side of [`Channel::read_packet`]: an idle peer may wait any
    /// time before its next request. `io_timeout` starts at the first byte.
    pub async fn read_request(&mut self, packet: &mut Packet) -> Result<(), TransportError> {
        let mut header = [0u8; HEADER_SIZE];
        self.io.read_exact(&mut header[..1]).await?;
        within(self.opts.io_timeout, self.io.read_exact(&mut header[1..])).await?;
        self.read_rest(header, packet).await
    }

    async fn read_rest(&mut self, header: [u8; HEADER_SIZE], packet: &mut Packet) -> Result<(), TransportError> {
        packet
            .decode_header(&header)
            .map_err(|e| TransportError::Io(e.to_string()))?;

        let len = packet.length() as usize;
        if len == 0 {
            return Ok(());
        }
        if len > self.opts.max_payload {
            return Err(TransportError::TooLarge(len));
        }
        packet.reallocate(len).map_err(|_| TransportError::TooLarge(len))?;
        let dst = &mut packet.buffer_mut()[..len];
        within(self.opts.io_timeout, self.io.read_exact(dst)).await?;
        Ok(())
    }

    /// Send header plus `length` trailing bytes.
    pub async fn write_packet(&mut self, packet: &Packet) -> Result<(), TransportError> {
        let limit = self.opts.io_timeout;
        let frame = packet.to_bytes();
        let io = &mut self.io;
        within(limit, async move {
            io.write_all(&frame).await?;
            io.flush().await
        })
        .await
    }
}

enum Inner {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: tokio::net::UnixListener,
        path: std::path::PathBuf,
    },
}

/// Make room for a Unix listener at `path`. Only a socket nobody answers on
/// is removed; a live socket or any other kind of file is left alone.
#[cfg(unix)]
fn clear_stale_socket(path: &std::path::Path) -> Result<(), TransportError> {
    use std::os::unix::fs::FileTypeExt;

    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if !meta.file_type().is_socket() {
        return Err(TransportError::InvalidAddress(format!(
            "{}: exists and is not a socket",
            path.display()
        )));
    }
    if std::os::unix::net::UnixStream::connect(path).is_ok() {
        return Err(TransportError::InvalidAddress(format!(
            "{}: socket is in use",
            path.display()
        )));
    }
    std::fs::remove_file(path)?;
    tracing::debug!(path = %path.display(), "removed stale socket");
    Ok(())
}

/// Accepting side. A Unix listener removes its socket file when dropped.
pub struct Listener {
    inner: Inner,
    opts: ChannelOptions,
}

impl Listener {
    pub async fn bind(endpoint: &Endpoint, opts: ChannelOptions) -> Result<Self, TransportError> {
        let inner = match endpoint {
            Endpoint::Tcp { host, port } => Inner::Tcp(TcpListener::bind((host.as_str(), *port)).await?),
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                clear_stale_socket(path)?;
                Inner::Unix {
                    listener: tokio::net::UnixListener::bind(path)?,
                    path: path.clone(),
                }
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => return Err(unsupported()),
        };
        Ok(Self { inner, opts })
    }

    pub async fn accept(&self) -> Result<Channel, TransportError> {
        let (io, peer): (Box<dyn Stream>, String) = match &self.inner {
            Inner::Tcp(l) => {
                let (stream, addr) = l.accept().await?;
                stream.set_nodelay(true)?;
                (Box::new(stream) as Box<dyn Stream>, addr.to_string())
            }
            #[cfg(unix)]
            Inner::Unix { listener, path } => {
                let (stream, _) = listener.accept().await?;
                (Box::new(stream) as Box<dyn Stream>, format!("unix:{}", path.display()))
            }
        };
        Ok(Channel {
            io,
            peer,
            opts: self.opts,
        })
    }

    /// The address peers should dial, with an ephemeral port resolved.
    pub fn local_endpoint(&self) -> Result<Endpoint, TransportError> {
        match &self.inner {
            Inner::Tcp(l) => {
                let addr = l.local_addr()?;
                Ok(Endpoint::Tcp {
                    host: addr.ip().to_string(),
                    port: addr.port(),
                })
            }
            #[cfg(unix)]
            Inner::Unix { path, .. } => Ok(Endpoint::Unix(path.clone())),
        }
    }
}

impl Listener {
    #[cfg(unix)]
    fn remove_socket_file(&self) {
        if let Inner::Unix { path, .. } = &self.inner {
            let _ = std::fs::remove_file(path);
        }
    }

    #[cfg(not(unix))]
    fn remove_socket_file(&self) {}
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.remove_socket_file();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn loopback(opts: ChannelOptions) -> (Channel, Channel) {
        let ep = Endpoint::parse("127.0.0.1:0", 0).unwrap();
        let listener = Listener::bind(&ep, opts).await.unwrap();
        let target = listener.local_endpoint().unwrap();
        let (client, server) = tokio::join!(Channel::connect(&target, opts), listener.accept());
        (client.unwrap(), server.unwrap())
    }

    #[tokio::test]
    async fn packet_crosses_the_wire() {
        let (mut a, mut b) = loopback(ChannelOptions::default()).await;
        let mut out = Packet::new();
        out.set_protocol(6);
        out.set_command(3);
        out.set_df0(221.5);
        out.set_buffer(&[0xAB; 2000]).unwrap();
        a.write_packet(&out).await.unwrap();

        let mut got = Packet::with_capacity(16);
        b.read_packet(&mut got).await.unwrap();
        assert_eq!(got.command(), 3);
        assert_eq!(got.df0(), 221.5);
        assert_eq!(got.buffer(), &[0xAB; 2000][..]);
        assert!(got.capacity() >= 2000);
    }

    #[tokio::test]
    async fn eof_is_closed() {
        let (a, mut b) = loopback(ChannelOptions::default()).await;
        drop(a);
        let mut p = Packet::new();
        assert_eq!(b.read_packet(&mut p).await.unwrap_err(), TransportError::Closed);
    }

    #[tokio::test]
    async fn oversize_payload_is_refused() {
        let opts = ChannelOptions {
            max_payload: 1024,
            ..ChannelOptions::default()
        };
        let (mut a, mut b) = loopback(opts).await;
        let mut out = Packet::new();
        out.set_buffer(&[1; 4096]).unwrap();
        a.write_packet(&out).await.unwrap();
        let mut p = Packet::new();
        assert_eq!(b.read_packet(&mut p).await.unwrap_err(), TransportError::TooLarge(4096));
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let opts = ChannelOptions {
            io_timeout: Some(Duration::from_millis(50)),
            ..ChannelOptions::default()
        };
        let (_a, mut b) = loopback(opts).await;
        let mut p = Packet::new();
        assert_eq!(b.read_packet(&mut p).await.unwrap_err(), TransportError::TimedOut);
    }

    #[tokio::test]
    async fn nobody_listening_is_refused() {
        let ep = Endpoint::parse("127.0.0.1:0", 0).unwrap();
        let target = {
            let l = Listener::bind(&ep, ChannelOptions::default()).await.unwrap();
            l.local_endpoint().unwrap()
        };
        let err = Channel::connect(&target, ChannelOptions::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err, TransportError::ConnectionRefused);
    }

    #[tokio::test]
    async fn idle_peer_may_wait_past_io_timeout_between_requests() {
        let opts = ChannelOptions {
            io_timeout: Some(Duration::from_millis(50)),
            ..ChannelOptions::default()
        };
        let (mut a, mut b) = loopback(opts).await;
        let reader = tokio::spawn(async move {
            let mut p = Packet::new();
            b.read_request(&mut p).await.map(|()| p.command())
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        let mut out = Packet::new();
        out.set_command(4);
        a.write_packet(&out).await.unwrap();
        assert_eq!(reader.await.unwrap(), Ok(4));
    }

    #[cfg(unix)]
    fn temp_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("obsrpc-chan-{tag}-{}", std::process::id()))
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_listener_replaces_stale_socket() {
        let path = temp_path("stale.sock");
        let _ = std::fs::remove_file(&path);
        // std listeners leave their socket file behind when dropped
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let ep = Endpoint::Unix(path.clone());
        let listener = Listener::bind(&ep, ChannelOptions::default()).await.unwrap();
        let (c, s) = tokio::join!(Channel::connect(&ep, ChannelOptions::default()), listener.accept());
        assert!(c.is_ok() && s.is_ok());
        drop(listener);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_listener_refuses_regular_file() {
        let path = temp_path("config.yaml");
        std::fs::write(&path, b"version: 1\n").unwrap();
        let err = Listener::bind(&Endpoint::Unix(path.clone()), ChannelOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::InvalidAddress(_)));
        assert_eq!(std::fs::read(&path).unwrap(), b"version: 1\n");
        std::fs::remove_file(&path).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_listener_leaves_live_socket_alone() {
        let path = temp_path("live.sock");
        let _ = std::fs::remove_file(&path);
        let ep = Endpoint::Unix(path.clone());
        let first = Listener::bind(&ep, ChannelOptions::default()).await.unwrap();

        let err = Listener::bind(&ep, ChannelOptions::default()).await.err().unwrap();
        assert!(matches!(err, TransportError::InvalidAddress(_)));

        let (c, s) = tokio::join!(Channel::connect(&ep, ChannelOptions::default()), first.accept());
        assert!(c.is_ok() && s.is_ok());
    }
}
