use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A viewer could not take the next write. Fatal to that viewer only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ViewerWriteError {
    /// The viewer's queue is full; it is not keeping up.
    #[error("viewer queue full")]
    Full,
    /// The viewer has gone away.
    #[error("viewer disconnected")]
    Closed,
}

/// Write end of one viewer connection.
///
/// Writes never block: bytes go into a bounded queue drained by the
/// connection. The `done` token is the connection's lifetime signal and is
/// also cancelled when the broadcaster drops the viewer.
#[derive(Debug, Clone)]
pub struct ViewerSink {
    id: Uuid,
    tx: mpsc::Sender<Bytes>,
    done: CancellationToken,
}

impl ViewerSink {
    pub fn new(tx: mpsc::Sender<Bytes>, done: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
            done,
        }
    }

    /// Sink plus the receiving end of its queue, holding up to `buffer` writes.
    pub fn channel(buffer: usize, done: CancellationToken) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx, done), rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn try_write(&self, bytes: Bytes) -> Result<(), ViewerWriteError> {
        self.tx.try_send(bytes).map_err(|e| match e {
            TrySendError::Full(_) => ViewerWriteError::Full,
            TrySendError::Closed(_) => ViewerWriteError::Closed,
        })
    }

    /// Signal the connection that no more bytes will arrive.
    pub fn detach(&self) {
        self.done.cancel();
    }

    /// Resolves when the connection is cancelled, the receiver is dropped, or
    /// the viewer has been detached.
    pub async fn finished(&self) {
        tokio::select! {
            _ = self.done.cancelled() => {}
            _ = self.tx.closed() => {}
        }
    }
}
