use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, trace, warn, Instrument};

use crate::transport::listener::BoxedStream;

pub type PeerId = u64;

const READ_BUFFER_SIZE: usize = 4 * 1024;
const WRITE_BUFFER_SIZE: usize = 64 * 1024;
/// Frames coalesced into a single flush.
const MAX_WRITE_BATCH: usize = 64;

/// Outbound queues of every peer attached to a publishing endpoint.
#[derive(Debug)]
pub(crate) struct PeerTable {
    peers: DashMap<PeerId, mpsc::Sender<Bytes>>,
    count: watch::Sender<usize>,
}

/// Result of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Broadcast {
    /// Peers whose queue accepted the frame.
    pub delivered: usize,
    /// Peers that were skipped because their queue was full.
    pub dropped: usize,
}

impl PeerTable {
    pub(crate) fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            peers: DashMap::new(),
            count,
        }
    }

    pub(crate) fn insert(&self, id: PeerId, outbound: mpsc::Sender<Bytes>) {
        self.peers.insert(id, outbound);
        self.count.send_replace(self.peers.len());
    }

    pub(crate) fn remove(&self, id: PeerId) {
        if self.peers.remove(&id).is_some() {
            self.count.send_replace(self.peers.len());
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.peers.len()
    }

    pub(crate) fn watch_count(&self) -> watch::Receiver<usize> {
        self.count.subscribe()
    }

    /// Queues `frame` for every peer without waiting. A full queue loses the
    /// frame for that peer only; a closed queue detaches the peer.
    pub(crate) fn broadcast(&self, frame: &Bytes) -> Broadcast {
        let mut outcome = Broadcast::default();
        let mut gone = Vec::new();

        for entry in self.peers.iter() {
            match entry.value().try_send(frame.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    outcome.dropped += 1;
                    warn!(target: "fanout::peer", peer = *entry.key(), "outbound queue full; message dropped");
                }
                Err(TrySendError::Closed(_)) => gone.push(*entry.key()),
            }
        }

        // Removing while iterating would deadlock on the shard lock.
        for id in gone {
            self.remove(id);
        }
        outcome
    }
}

/// One accepted peer: drains its outbound queue onto the stream and watches
/// the read side so a disconnect is noticed even when nothing is being sent.
pub(crate) struct PeerConnection {
    id: PeerId,
    label: String,
    stream: BufWriter<BoxedStream>,
    outbound: mpsc::Receiver<Bytes>,
    read_buf: BytesMut,
    shutdown: watch::Receiver<bool>,
    /// Upper bound on flushing queued frames once shutdown is signalled.
    drain_timeout: Duration,
}

impl PeerConnection {
    pub(crate) fn new(
        id: PeerId,
        label: String,
        stream: BoxedStream,
        outbound: mpsc::Receiver<Bytes>,
        shutdown: watch::Receiver<bool>,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            id,
            label,
            stream: BufWriter::with_capacity(WRITE_BUFFER_SIZE, stream),
            outbound,
            read_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            shutdown,
            drain_timeout,
        }
    }

    pub(crate) async fn run(mut self, table: Arc<PeerTable>) {
        let span = tracing::debug_span!("peer", peer_id = self.id, remote = %self.label);
        async move {
            if let Err(err) = self.run_inner().await {
                debug!("peer {} error: {}", self.id, err);
            }
            table.remove(self.id);
            trace!("peer {} detached", self.id);
        }
        .instrument(span)
        .await
    }

    async fn run_inner(&mut self) -> io::Result<()> {
        loop {
            tokio::select! {
                biased;

                next = self.outbound.recv() => {
                    match next {
                        Some(frame) => self.write_batch(frame).await?,
                        None => {
                            let _ = self.stream.shutdown().await;
                            return Ok(());
                        }
                    }
                }
                read_result = self.stream.read_buf(&mut self.read_buf) => {
                    if read_result? == 0 {
                        return Ok(());
                    }
                    // Subscribers have nothing to say in this protocol.
                    self.read_buf.clear();
                }
                _ = self.shutdown.changed() => {
                    // Frames queued before the endpoint closed still go out.
                    match timeout(self.drain_timeout, self.drain()).await {
                        Ok(result) => {
                            result?;
                        }
                        Err(_) => warn!("peer {} not drained within {:?}", self.id, self.drain_timeout),
                    }
                    let _ = self.stream.shutdown().await;
                    return Ok(());
                }
            }
        }
    }

    async fn drain(&mut self) -> io::Result<usize> {
        let mut drained = 0;
        while let Ok(frame) = self.outbound.try_recv() {
            self.stream.write_all(&frame).await?;
            drained += 1;
        }
        self.stream.flush().await?;
        trace!("peer {} drained {} frames", self.id, drained);
        Ok(drained)
    }

    async fn write_batch(&mut self, first: Bytes) -> io::Result<()> {
        self.stream.write_all(&first).await?;
        let mut batched = 1;
        while batched < MAX_WRITE_BATCH {
            match self.outbound.try_recv() {
                Ok(next) => {
                    self.stream.write_all(&next).await?;
                    batched += 1;
                }
                Err(_) => break,
            }
        }
        self.stream.flush().await
    }
}
