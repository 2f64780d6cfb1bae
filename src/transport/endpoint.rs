//! Channel endpoints.
//!
//! [`PubEndpoint`] listens and broadcasts every message to all attached peers.
//! [`SubEndpoint`] dials one publisher and receives with a timeout. Both pick
//! the transport from the address scheme; callers never special-case it.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, trace, Instrument};

use crate::core::error::{Error, Result};
use crate::transport::address::Address;
use crate::transport::connection::{Broadcast, PeerConnection, PeerId, PeerTable};
use crate::transport::frame;
use crate::transport::listener::{self, BoxedStream, Listener};

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Tuning shared by both endpoint roles.
#[derive(Debug, Clone)]
pub struct EndpointOptions {
    /// Frames queued per peer before further broadcasts are dropped for it.
    pub peer_queue_capacity: usize,
    /// Upper bound on a single write from a subscriber endpoint.
    pub send_timeout: Duration,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self {
            peer_queue_capacity: 1024,
            send_timeout: Duration::from_secs(5),
        }
    }
}

fn parse_address(raw: &str) -> std::result::Result<Address, io::Error> {
    raw.parse::<Address>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

// ───────────────────────────────────────────────────────────
// Publisher role
// ───────────────────────────────────────────────────────────

/// Listening endpoint with zero or more attached peers.
#[derive(Debug)]
pub struct PubEndpoint {
    address: Address,
    peers: Arc<PeerTable>,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    closed: AtomicBool,
}

impl PubEndpoint {
    pub async fn listen(address: &str) -> Result<Self> {
        Self::listen_with(address, EndpointOptions::default()).await
    }

    pub async fn listen_with(address: &str, options: EndpointOptions) -> Result<Self> {
        let bind_error = |source| Error::Bind {
            address: address.to_string(),
            source,
        };
        let parsed = parse_address(address).map_err(bind_error)?;
        let (listener, resolved) = Listener::bind(&parsed).await.map_err(bind_error)?;
        info!(target: "fanout::endpoint", address = %resolved, "listening");

        let peers = Arc::new(PeerTable::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let span = tracing::info_span!("accept", address = %resolved);
        let accept_task = tokio::spawn(
            accept_loop(listener, peers.clone(), shutdown_rx, options).instrument(span),
        );

        Ok(Self {
            address: resolved,
            peers,
            shutdown,
            accept_task,
            closed: AtomicBool::new(false),
        })
    }

    /// The bound address, with any wildcard port resolved.
    pub fn local_address(&self) -> &Address {
        &self.address
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Waits until at least `peers` subscribers are attached.
    pub async fn wait_for_peers(&self, peers: usize, within: Duration) -> Result<usize> {
        let mut count = self.peers.watch_count();
        let attached = match timeout(within, count.wait_for(|n| *n >= peers)).await {
            Ok(Ok(n)) => Ok(*n),
            Ok(Err(_)) => Err(Error::ConnectionClosed {
                address: self.address.to_string(),
            }),
            Err(_) => Err(Error::Timeout(within)),
        };
        attached
    }

    /// Best-effort broadcast of one message to every attached peer.
    ///
    /// Never waits: reaching zero peers is a success, and a peer whose queue is
    /// full simply misses this message.
    pub fn send(&self, message: &[u8]) -> Result<Broadcast> {
        if self.is_closed() {
            return Err(Error::Send {
                address: self.address.to_string(),
                reason: "endpoint is closed".to_string(),
            });
        }
        let framed = frame::to_frame(message)?;
        let outcome = self.peers.broadcast(&framed);
        trace!(
            target: "fanout::endpoint",
            delivered = outcome.delivered,
            dropped = outcome.dropped,
            "broadcast"
        );
        Ok(outcome)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops accepting and releases the listener. Every peer connection
    /// writes out what was already queued for it, then hangs up; use
    /// [`PubEndpoint::shutdown`] to wait for that.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.accept_task.abort();
        self.shutdown.send_replace(true);
        debug!(target: "fanout::endpoint", address = %self.address, "closed");
    }

    /// Closes the endpoint and waits until every peer has been flushed and
    /// detached. Fails with `Timeout` when some peer is still draining after
    /// `within`.
    pub async fn shutdown(&self, within: Duration) -> Result<()> {
        self.close();
        let mut count = self.peers.watch_count();
        let drained = match timeout(within, count.wait_for(|n| *n == 0)).await {
            Ok(_) => Ok(()),
            Err(_) => Err(Error::Timeout(within)),
        };
        drained
    }
}

impl Drop for PubEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

async fn accept_loop(
    mut listener: Listener,
    peers: Arc<PeerTable>,
    mut shutdown: watch::Receiver<bool>,
    options: EndpointOptions,
) {
    let next_peer_id = AtomicU64::new(1);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, label)) => {
                        let id: PeerId = next_peer_id.fetch_add(1, Ordering::Relaxed);
                        let (tx, rx) = mpsc::channel(options.peer_queue_capacity);
                        peers.insert(id, tx);
                        debug!("accepted peer {} from {}", id, label);

                        let connection = PeerConnection::new(
                            id,
                            label,
                            stream,
                            rx,
                            shutdown.clone(),
                            options.send_timeout,
                        );
                        tokio::spawn(connection.run(peers.clone()));
                    }
                    Err(err) => match classify_accept_error(&err) {
                        AcceptFailure::Stop => {
                            error!("accept error: {}", err);
                            break;
                        }
                        AcceptFailure::Retry => debug!("accept error: {}", err),
                        AcceptFailure::Backoff => {
                            error!("accept error: {}; retrying in {:?}", err, ACCEPT_BACKOFF);
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    },
                }
            }
            _ = shutdown.changed() => {
                break;
            }
        }
    }
    trace!("accept loop stopped");
}

/// Pause after an accept error that is likely to repeat (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// The listener is gone.
    Stop,
    /// Only the one pending connection failed.
    Retry,
    Backoff,
}

fn classify_accept_error(err: &io::Error) -> AcceptFailure {
    match err.kind() {
        io::ErrorKind::NotConnected => AcceptFailure::Stop,
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted => AcceptFailure::Retry,
        _ => AcceptFailure::Backoff,
    }
}

// ───────────────────────────────────────────────────────────
// Subscriber role
// ───────────────────────────────────────────────────────────

/// Dialing endpoint with a single upstream.
pub struct SubEndpoint {
    remote: Address,
    stream: Option<BoxedStream>,
    read_buf: BytesMut,
    prefixes: Vec<Bytes>,
    options: EndpointOptions,
}

impl std::fmt::Debug for SubEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubEndpoint")
            .field("remote", &self.remote)
            .field("connected", &self.stream.is_some())
            .field("prefixes", &self.prefixes)
            .finish()
    }
}

impl SubEndpoint {
    pub async fn dial(address: &str) -> Result<Self> {
        Self::dial_with(address, EndpointOptions::default()).await
    }

    pub async fn dial_with(address: &str, options: EndpointOptions) -> Result<Self> {
        let connect_error = |source| Error::Connect {
            address: address.to_string(),
            source,
        };
        let remote = parse_address(address).map_err(connect_error)?;
        let stream = listener::dial(&remote).await.map_err(connect_error)?;
        info!(target: "fanout::endpoint", address = %remote, "connected");

        Ok(Self {
            remote,
            stream: Some(stream),
            read_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            prefixes: Vec::new(),
            options,
        })
    }

    pub fn remote_address(&self) -> &Address {
        &self.remote
    }

    /// Hint: only messages starting with one of the registered prefixes are
    /// handed out. Without any prefix nothing is; the empty prefix lets
    /// everything through. Matching is by byte prefix, so `A` also lets `AB|..`
    /// through; the subscription filter makes the final decision.
    pub fn set_receive_filter(&mut self, topic: &str) {
        let prefix = Bytes::copy_from_slice(topic.as_bytes());
        if !self.prefixes.contains(&prefix) {
            self.prefixes.push(prefix);
        }
    }

    fn passes_filter(&self, message: &[u8]) -> bool {
        self.prefixes.iter().any(|p| message.starts_with(p))
    }

    /// Waits up to `within` for the next message that passes the receive filter.
    ///
    /// Cancel-safe: bytes read before the deadline stay buffered for the next call.
    pub async fn receive_with_timeout(&mut self, within: Duration) -> Result<Bytes> {
        let deadline = Instant::now() + within;
        loop {
            let message = match tokio::time::timeout_at(deadline, self.next_frame()).await {
                Ok(result) => result?,
                Err(_) => return Err(Error::Timeout(within)),
            };
            if self.passes_filter(&message) {
                return Ok(message);
            }
            trace!(target: "fanout::endpoint", len = message.len(), "filtered out by receive filter");
        }
    }

    async fn next_frame(&mut self) -> Result<Bytes> {
        loop {
            match frame::try_decode_frame(&mut self.read_buf) {
                Ok(Some(message)) => return Ok(message),
                Ok(None) => {}
                Err(err) => {
                    // The stream is out of sync; nothing after this point can be trusted.
                    debug!(target: "fanout::endpoint", "bad frame from {}: {}", self.remote, err);
                    self.stream = None;
                    self.read_buf.clear();
                    return Err(err.into());
                }
            }
            let stream = self.stream.as_mut().ok_or_else(|| Error::ConnectionClosed {
                address: self.remote.to_string(),
            })?;
            match stream.read_buf(&mut self.read_buf).await {
                Ok(0) => {
                    self.stream = None;
                    return Err(Error::ConnectionClosed {
                        address: self.remote.to_string(),
                    });
                }
                Ok(_) => {}
                Err(err) => {
                    debug!(target: "fanout::endpoint", "read error from {}: {}", self.remote, err);
                    self.stream = None;
                    return Err(Error::ConnectionClosed {
                        address: self.remote.to_string(),
                    });
                }
            }
        }
    }

    /// Writes one message upstream. The publisher ignores it; kept so both
    /// roles expose the same operations.
    pub async fn send(&mut self, message: &[u8]) -> Result<()> {
        let framed = frame::to_frame(message)?;
        let address = self.remote.to_string();
        let stream = self.stream.as_mut().ok_or_else(|| Error::Send {
            address: address.clone(),
            reason: "endpoint is closed".to_string(),
        })?;

        let write = async {
            stream.write_all(&framed).await?;
            stream.flush().await
        };
        match timeout(self.options.send_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(Error::Send {
                address,
                reason: err.to_string(),
            }),
            Err(_) => Err(Error::Send {
                address,
                reason: format!("write timed out after {:?}", self.options.send_timeout),
            }),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Drops the connection. Buffered but unread messages are discarded.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            self.read_buf.clear();
            debug!(target: "fanout::endpoint", address = %self.remote, "closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_errors_are_classified() {
        let kind = |k: io::ErrorKind| classify_accept_error(&io::Error::from(k));
        assert_eq!(kind(io::ErrorKind::NotConnected), AcceptFailure::Stop);
        assert_eq!(kind(io::ErrorKind::ConnectionAborted), AcceptFailure::Retry);
        assert_eq!(kind(io::ErrorKind::ConnectionReset), AcceptFailure::Retry);
        assert_eq!(kind(io::ErrorKind::Other), AcceptFailure::Backoff);
        assert!(ACCEPT_BACKOFF > Duration::ZERO);
    }

    #[cfg(unix)]
    #[test]
    fn running_out_of_descriptors_backs_off() {
        // EMFILE
        let err = io::Error::from_raw_os_error(24);
        assert_eq!(classify_accept_error(&err), AcceptFailure::Backoff);
    }
}
