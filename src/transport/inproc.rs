//! In-process transport.
//!
//! Listeners register a name in a process-wide table; dialing creates an
//! in-memory duplex stream and hands the far end to the listener. Everything
//! above this module sees an ordinary byte stream.

use std::io;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tracing::debug;

const DUPLEX_BUFFER_SIZE: usize = 64 * 1024;
const ACCEPT_BACKLOG: usize = 128;

static LISTENERS: Lazy<DashMap<String, mpsc::Sender<DuplexStream>>> = Lazy::new(DashMap::new);

#[derive(Debug)]
pub(crate) struct InprocListener {
    name: String,
    registration: mpsc::Sender<DuplexStream>,
    incoming: mpsc::Receiver<DuplexStream>,
}

impl InprocListener {
    pub(crate) fn bind(name: &str) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel(ACCEPT_BACKLOG);
        match LISTENERS.entry(name.to_string()) {
            Entry::Occupied(mut existing) => {
                if !existing.get().is_closed() {
                    return Err(io::Error::new(
                        io::ErrorKind::AddrInUse,
                        format!("inproc name {name:?} is already bound"),
                    ));
                }
                existing.insert(tx.clone());
            }
            Entry::Vacant(slot) => {
                slot.insert(tx.clone());
            }
        }
        debug!(target: "fanout::inproc", name, "bound");
        Ok(Self {
            name: name.to_string(),
            registration: tx,
            incoming: rx,
        })
    }

    pub(crate) async fn accept(&mut self) -> io::Result<DuplexStream> {
        self.incoming
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "inproc listener closed"))
    }
}

impl Drop for InprocListener {
    fn drop(&mut self) {
        LISTENERS.remove_if(&self.name, |_, tx| tx.same_channel(&self.registration));
    }
}

pub(crate) async fn connect(name: &str) -> io::Result<DuplexStream> {
    // Clone out of the map so no shard lock is held across the await.
    let listener = LISTENERS
        .get(name)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| refused(name))?;

    let (local, remote) = tokio::io::duplex(DUPLEX_BUFFER_SIZE);
    listener.send(remote).await.map_err(|_| refused(name))?;
    Ok(local)
}

fn refused(name: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::ConnectionRefused,
        format!("no inproc listener named {name:?}"),
    )
}
