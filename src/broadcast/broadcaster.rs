use super::{BroadcastError, Pacer, SourceState, ViewerSink, ViewerWriteError};
use crate::config::BroadcastConfig;
use bytes::Bytes;
use channelcast_common::ChannelId;
use channelcast_media::{extract_init_segment, FragmentDemuxer, InitSegment};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use uuid::Uuid;

/// Live stream for one channel.
///
/// Cheap to clone; all clones share one session and one pump. The pump
/// thread exits once every handle is dropped or [`shutdown`](Self::shutdown)
/// is called.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("channel", &self.inner.channel)
            .finish_non_exhaustive()
    }
}

struct Inner {
    channel: ChannelId,
    session: Mutex<Session>,
    pacer: Pacer,
    reopen_backoff: Duration,
    probe_bytes: usize,
    stopped: AtomicBool,
}

/// Everything the pump and viewers share, guarded by one lock.
struct Session {
    source: SourceState,
    init: InitSegment,
    /// Bumped on every switch; a pump pass only fans out while it matches.
    generation: u64,
    viewers: HashMap<Uuid, ViewerSink>,
}

impl Broadcaster {
    /// Prime a broadcaster on `path` and start its pump.
    ///
    /// Fails if the configuration is invalid or the init segment cannot be
    /// extracted from `path`; the channel then has no broadcaster.
    pub async fn start(
        channel: ChannelId,
        path: impl AsRef<Path>,
        config: &BroadcastConfig,
    ) -> Result<Self, BroadcastError> {
        let pacer = Pacer::new(
            config.bytes_per_sec(),
            Duration::from_millis(config.pacing_tick_ms),
        )?;
        let path = path.as_ref().to_path_buf();
        let init = read_init_segment(&path, config.switch_probe_bytes).await?;

        let inner = Arc::new(Inner {
            channel,
            session: Mutex::new(Session {
                source: SourceState::Playing(path.clone()),
                init,
                generation: 0,
                viewers: HashMap::new(),
            }),
            pacer,
            reopen_backoff: Duration::from_millis(config.reopen_backoff_ms),
            probe_bytes: config.switch_probe_bytes,
            stopped: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        thread::Builder::new()
            .name(format!("broadcast-{channel}"))
            .spawn(move || pump(weak))
            .map_err(|e| BroadcastError::Io {
                path: path.clone(),
                source: e,
            })?;

        tracing::info!(channel = %channel, path = ?path, "Broadcaster started");
        Ok(Self { inner })
    }

    pub fn channel(&self) -> ChannelId {
        self.inner.channel
    }

    /// Current source, or [`SourceState::Fatal`] after a demux fault.
    pub fn source(&self) -> SourceState {
        self.inner.session.lock().source.clone()
    }

    /// The init segment handed to newly attached viewers.
    pub fn init_segment(&self) -> InitSegment {
        self.inner.session.lock().init.clone()
    }

    pub fn viewer_count(&self) -> usize {
        self.inner.session.lock().viewers.len()
    }

    /// Stream to `sink` until it disconnects.
    ///
    /// The cached init segment is written first, then every fragment the pump
    /// emits from that point on. Returns when the sink's lifetime signal
    /// fires, its receiver is dropped, or the pump detaches it.
    pub async fn attach_viewer(&self, sink: ViewerSink) -> Result<(), ViewerWriteError> {
        let id = sink.id();
        let waiter = sink.clone();

        {
            let mut session = self.inner.session.lock();
            if self.inner.is_stopped() {
                return Err(ViewerWriteError::Closed);
            }
            sink.try_write(session.init.bytes())?;
            session.viewers.insert(id, sink);
            tracing::info!(
                channel = %self.inner.channel,
                viewer = %id,
                viewers = session.viewers.len(),
                "Viewer attached"
            );
        }

        waiter.finished().await;

        let remaining = {
            let mut session = self.inner.session.lock();
            session.viewers.remove(&id);
            session.viewers.len()
        };
        tracing::info!(
            channel = %self.inner.channel,
            viewer = %id,
            viewers = remaining,
            "Viewer detached"
        );
        Ok(())
    }

    /// Point the pump at a new file.
    ///
    /// The new init segment is cached for viewers that attach afterwards;
    /// attached viewers are not sent it. The pump drops the fragment it is
    /// holding from the old file and reopens on the new one.
    pub async fn switch_source(&self, path: impl AsRef<Path>) -> Result<(), BroadcastError> {
        let path = path.as_ref().to_path_buf();
        let init = read_init_segment(&path, self.inner.probe_bytes).await?;
        let init_len = init.len();

        {
            let mut session = self.inner.session.lock();
            session.init = init;
            session.source = SourceState::Playing(path.clone());
            session.generation += 1;
        }

        tracing::info!(
            channel = %self.inner.channel,
            path = ?path,
            bytes = init_len,
            "Switched source"
        );
        Ok(())
    }

    /// Stop the pump and drop every viewer.
    pub fn shutdown(&self) {
        self.inner.stopped.store(true, Ordering::Relaxed);
        let mut session = self.inner.session.lock();
        for viewer in session.viewers.values() {
            viewer.detach();
        }
        session.viewers.clear();
        tracing::info!(channel = %self.inner.channel, "Broadcaster stopped");
    }
}

impl Inner {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Write `bytes` to every viewer, detaching the ones that fail.
    ///
    /// Returns `None` without writing if the source was switched since the
    /// pass reading `bytes` started.
    fn fan_out(&self, bytes: &Bytes, generation: u64) -> Option<usize> {
        let mut session = self.session.lock();
        if session.generation != generation {
            return None;
        }
        session.viewers.retain(|id, viewer| match viewer.try_write(bytes.clone()) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(channel = %self.channel, viewer = %id, error = %e, "Dropping viewer");
                viewer.detach();
                false
            }
        });
        Some(session.viewers.len())
    }

    /// Mark the source fatal, unless it was switched while `path` was read.
    fn mark_fatal(&self, path: &Path, generation: u64, error: &channelcast_media::Error) {
        let mut session = self.session.lock();
        if session.generation == generation && session.source.path().is_some() {
            session.source = SourceState::Fatal;
            tracing::error!(
                channel = %self.channel,
                path = ?path,
                error = %error,
                io = error.is_io(),
                "Source stalled"
            );
        } else {
            tracing::warn!(
                channel = %self.channel,
                path = ?path,
                error = %error,
                "Demux fault on replaced source"
            );
        }
    }
}

enum PassEnd {
    /// Reached end of file after emitting this many fragments.
    Eof(usize),
    /// The source was switched mid-pass.
    Switched,
    Fault(channelcast_media::Error),
    Stopped,
}

/// Pump loop: open the current source, stream it to the end, repeat.
fn pump(weak: Weak<Inner>) {
    loop {
        let Some(inner) = weak.upgrade() else { return };
        if inner.is_stopped() {
            return;
        }

        let backoff = inner.reopen_backoff;
        let (path, skip, generation) = {
            let session = inner.session.lock();
            (
                session.source.path().cloned(),
                session.init.len(),
                session.generation,
            )
        };

        let Some(path) = path else {
            drop(inner);
            thread::sleep(backoff);
            continue;
        };

        let mut demuxer = match File::open(&path) {
            Ok(file) => FragmentDemuxer::new(BufReader::new(file)),
            Err(e) => {
                tracing::warn!(channel = %inner.channel, path = ?path, error = %e, "Failed to open source");
                drop(inner);
                thread::sleep(backoff);
                continue;
            }
        };
        let channel = inner.channel;
        drop(inner);

        let end = match demuxer.seek_to(skip as u64) {
            Ok(()) => stream_pass(&weak, &mut demuxer, generation),
            Err(e) => PassEnd::Fault(e),
        };

        match end {
            PassEnd::Stopped => return,
            PassEnd::Eof(0) => {
                tracing::warn!(channel = %channel, path = ?path, "Source has no fragments");
                thread::sleep(backoff);
            }
            PassEnd::Eof(count) => {
                tracing::debug!(channel = %channel, path = ?path, fragments = count, "End of source, reopening");
            }
            PassEnd::Switched => {
                tracing::debug!(channel = %channel, path = ?path, "Source replaced mid-pass");
            }
            PassEnd::Fault(e) => {
                if let Some(inner) = weak.upgrade() {
                    inner.mark_fatal(&path, generation, &e);
                }
            }
        }
    }
}

fn stream_pass(
    weak: &Weak<Inner>,
    demuxer: &mut FragmentDemuxer<BufReader<File>>,
    generation: u64,
) -> PassEnd {
    let mut count = 0usize;
    loop {
        let fragment = match demuxer.next_fragment() {
            Ok(Some(fragment)) => fragment,
            Ok(None) => return PassEnd::Eof(count),
            Err(e) => return PassEnd::Fault(e),
        };

        let Some(inner) = weak.upgrade() else {
            return PassEnd::Stopped;
        };
        if inner.is_stopped() {
            return PassEnd::Stopped;
        }

        let Some(viewers) = inner.fan_out(&fragment.bytes(), generation) else {
            return PassEnd::Switched;
        };
        let delay = inner.pacer.delay_for(fragment.len());
        tracing::trace!(
            channel = %inner.channel,
            bytes = fragment.len(),
            viewers = viewers,
            "Fragment sent"
        );
        drop(inner);

        count += 1;
        thread::sleep(delay);
    }
}

/// Read up to `probe_bytes` from `path` and extract its init segment.
async fn read_init_segment(path: &Path, probe_bytes: usize) -> Result<InitSegment, BroadcastError> {
    let io_err = |source| BroadcastError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = tokio::fs::File::open(path).await.map_err(io_err)?;
    let mut prefix = Vec::with_capacity(probe_bytes.min(1024 * 1024));
    file.take(probe_bytes as u64)
        .read_to_end(&mut prefix)
        .await
        .map_err(io_err)?;

    extract_init_segment(&prefix).map_err(|source| BroadcastError::Demux {
        path: path.to_path_buf(),
        source,
    })
}
