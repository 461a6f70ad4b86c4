use std::io::{self, BufReader, Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

#[cfg(feature = "tls")]
use native_tls::TlsStream;

/// The byte streams the blocking connection knows how to drive.
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

    /// Wrap the TCP stream in TLS. Any bytes still sitting in the read
    /// buffer would be lost, which is fine: the upgrade happens right after
    /// a complete message and before the server says anything else.
    #[cfg(feature = "tls")]
    pub fn upgrade_to_tls(self, host: &str) -> io::Result<Self> {
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
        let tls = connector
            .connect(host, tcp)
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

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(reader) => reader.read(buf),
            #[cfg(feature = "tls")]
            Self::Tls(reader) => reader.read(buf),
            #[cfg(unix)]
            Self::Unix(reader) => reader.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(reader) => reader.get_mut().write(buf),
            #[cfg(feature = "tls")]
            Self::Tls(reader) => reader.get_mut().write(buf),
            #[cfg(unix)]
            Self::Unix(reader) => reader.get_mut().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(reader) => reader.get_mut().flush(),
            #[cfg(feature = "tls")]
            Self::Tls(reader) => reader.get_mut().flush(),
            #[cfg(unix)]
            Self::Unix(reader) => reader.get_mut().flush(),
        }
    }
}
