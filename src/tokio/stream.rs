use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, BufReader, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(feature = "tls")]
use tokio_native_tls::TlsStream;

/// The byte streams the async connection knows how to drive.
///
/// Reads go through a buffer so the 4-byte packet headers do not each cost
/// a syscall.
pub enum Stream {
    Tcp(BufReader<TcpStream>),
    #[cfg(feature = "tls")]
    Tls(BufReader<TlsStream<TcpStream>>),
    #[cfg(unix)]
    Unix(BufReader<UnixStream>),
}

impl Stream {
    pub fn tcp(stream: TcpStream) -> Self {
        Self::Tcp(BufReader::new(stream))
    }

    #[cfg(unix)]
    pub fn unix(stream: UnixStream) -> Self {
        Self::Unix(BufReader::new(stream))
    }

    /// Wrap the TCP stream in TLS. The read buffer is discarded; the
    /// upgrade happens right after a complete message and before the server
    /// says anything else.
    #[cfg(feature = "tls")]
    pub async fn upgrade_to_tls(self, host: &str) -> io::Result<Self> {
        let tcp = match self {
            Self::Tcp(reader) => reader.into_inner(),
            Self::Tls(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "already using TLS",
                ));
            }
            #[cfg(unix)]
            Self::Unix(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "TLS is not supported over unix sockets",
                ));
            }
        };

        let connector = native_tls::TlsConnector::new().map_err(io::Error::other)?;
        let connector = tokio_native_tls::TlsConnector::from(connector);
        let tls = connector
            .connect(host, tcp)
            .await
            .map_err(|e| io::Error::other(e.to_string()))?;
        Ok(Self::Tls(BufReader::new(tls)))
    }

    pub fn is_tls(&self) -> bool {
        match self {
            #[cfg(feature = "tls")]
            Self::Tls(_) => true,
            _ => false,
        }
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(reader) => Pin::new(reader).poll_read(cx, buf),
            #[cfg(feature = "tls")]
            Self::Tls(reader) => Pin::new(reader).poll_read(cx, buf),
            #[cfg(unix)]
            Self::Unix(reader) => Pin::new(reader).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(reader) => Pin::new(reader.get_mut()).poll_write(cx, buf),
            #[cfg(feature = "tls")]
            Self::Tls(reader) => Pin::new(reader.get_mut()).poll_write(cx, buf),
            #[cfg(unix)]
            Self::Unix(reader) => Pin::new(reader.get_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(reader) => Pin::new(reader.get_mut()).poll_flush(cx),
            #[cfg(feature = "tls")]
            Self::Tls(reader) => Pin::new(reader.get_mut()).poll_flush(cx),
            #[cfg(unix)]
            Self::Unix(reader) => Pin::new(reader.get_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(reader) => Pin::new(reader.get_mut()).poll_shutdown(cx),
            #[cfg(feature = "tls")]
            Self::Tls(reader) => Pin::new(reader.get_mut()).poll_shutdown(cx),
            #[cfg(unix)]
            Self::Unix(reader) => Pin::new(reader.get_mut()).poll_shutdown(cx),
        }
    }
}
