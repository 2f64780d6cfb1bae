use std::io;
#[cfg(unix)]
use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use crate::transport::address::Address;
use crate::transport::inproc::{self, InprocListener};

/// Any bidirectional byte stream a transport can hand out.
pub(crate) trait RawStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> RawStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub(crate) type BoxedStream = Box<dyn RawStream>;

/// A bound listener for one of the supported transports.
#[derive(Debug)]
pub(crate) enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Ipc(UnixListener, PathBuf),
    Inproc(InprocListener),
}

impl Listener {
    /// Binds `address`. Returns the listener and the address it actually
    /// resolved to (a TCP port of 0 becomes the assigned port).
    pub(crate) async fn bind(address: &Address) -> io::Result<(Self, Address)> {
        match address {
            Address::Tcp { host, port } => {
                let listener = TcpListener::bind(Address::tcp_target(host, *port)).await?;
                let local = listener.local_addr()?;
                let resolved = Address::Tcp {
                    host: if host == "*" {
                        host.clone()
                    } else if local.is_ipv6() {
                        format!("[{}]", local.ip())
                    } else {
                        local.ip().to_string()
                    },
                    port: local.port(),
                };
                Ok((Listener::Tcp(listener), resolved))
            }
            #[cfg(unix)]
            Address::Ipc(path) => {
                let listener = UnixListener::bind(path)?;
                Ok((Listener::Ipc(listener, path.clone()), address.clone()))
            }
            #[cfg(not(unix))]
            Address::Ipc(_) => Err(ipc_unsupported()),
            Address::Inproc(name) => {
                let listener = InprocListener::bind(name)?;
                Ok((Listener::Inproc(listener), address.clone()))
            }
        }
    }

    /// Waits for the next peer. The returned label is only used for logging.
    pub(crate) async fn accept(&mut self) -> io::Result<(BoxedStream, String)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                stream.set_nodelay(true)?;
                Ok((Box::new(stream), addr.to_string()))
            }
            #[cfg(unix)]
            Listener::Ipc(listener, path) => {
                let (stream, _) = listener.accept().await?;
                Ok((Box::new(stream), path.display().to_string()))
            }
            Listener::Inproc(listener) => {
                let stream = listener.accept().await?;
                Ok((Box::new(stream), "inproc".to_string()))
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Listener::Ipc(_, path) = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Opens a stream to a listening endpoint.
pub(crate) async fn dial(address: &Address) -> io::Result<BoxedStream> {
    match address {
        Address::Tcp { host, port } => {
            let stream = TcpStream::connect(Address::tcp_target(host, *port)).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream))
        }
        #[cfg(unix)]
        Address::Ipc(path) => Ok(Box::new(UnixStream::connect(path).await?)),
        #[cfg(not(unix))]
        Address::Ipc(_) => Err(ipc_unsupported()),
        Address::Inproc(name) => Ok(Box::new(inproc::connect(name).await?)),
    }
}

#[cfg(not(unix))]
fn ipc_unsupported() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "ipc:// addresses need Unix domain sockets",
    )
}
