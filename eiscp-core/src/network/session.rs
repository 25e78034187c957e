//! One live link to a receiver.
//!
//! A link runs two background tasks:
//! - the **reader** decodes inbound batches and is the only writer of the
//!   session's [`StateStore`];
//! - the **writer** drains an `mpsc` queue of pre-encoded frames onto the
//!   socket, so callers never share a write buffer.
//!
//! When either task hits a terminal error it reports
//! [`EiscpError::ConnectionLost`] on the session's event channel and stops.
//! Reconnecting is up to whoever owns the session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{BytesCodec, FramedRead, FramedWrite};
use tracing::{debug, info, trace, warn};

use crate::codec::{self, EiscpCodec};
use crate::config::SessionConfig;
use crate::error::EiscpError;
use crate::navigation::Remote;
use crate::network::ConnectionInfo;
use crate::observer::{ObserverId, ObserverRegistry, StateObserver};
use crate::state::{DeviceState, StateStore, TagHandler};

/// Terminal notifications from a link's background tasks.
#[derive(Debug)]
pub enum SessionEvent {
    Terminated(EiscpError),
}

pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;

struct Link {
    frames: mpsc::Sender<Bytes>,
    state: watch::Receiver<DeviceState>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    peer: Option<ConnectionInfo>,
    since: Instant,
}

/// Client side of an eISCP connection.
///
/// Observers registered on the session survive reconnects; the device state
/// does not. Every `connect`/`attach` starts from an empty [`DeviceState`].
pub struct Session {
    config: SessionConfig,
    observers: Arc<ObserverRegistry>,
    link: Option<Link>,
    last_frame: Mutex<Option<Bytes>>,
    /// Extra tag handlers installed into every new link's store.
    handlers: Vec<(&'static str, TagHandler)>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            observers: Arc::new(ObserverRegistry::new()),
            link: None,
            last_frame: Mutex::new(None),
            handlers: Vec::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn observers(&self) -> &Arc<ObserverRegistry> {
        &self.observers
    }

    pub fn subscribe(&self, observer: impl StateObserver + 'static) -> ObserverId {
        self.observers.register(observer)
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.observers.unregister(id)
    }

    /// Handle `tag` with `handler`, replacing the built-in one if any.
    ///
    /// Takes effect from the next `connect`/`attach`.
    pub fn register_handler(&mut self, tag: &'static str, handler: TagHandler) {
        self.handlers.retain(|(existing, _)| *existing != tag);
        self.handlers.push((tag, handler));
    }

    // ── Connection management ────────────────────────────────────

    /// Open a TCP connection and start the link tasks.
    pub async fn connect(&mut self, info: &ConnectionInfo) -> Result<SessionEvents, EiscpError> {
        let stream = TcpStream::connect(info.to_string()).await?;
        stream.set_nodelay(true)?;
        info!(peer = %info, "connected");
        Ok(self.start(stream, Some(info.clone())))
    }

    /// Run the session over an already-open stream.
    pub fn attach<S>(&mut self, stream: S) -> SessionEvents
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.start(stream, None)
    }

    fn start<S>(&mut self, stream: S, peer: Option<ConnectionInfo>) -> SessionEvents
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        if self.link.is_some() {
            debug!("replacing existing link");
            self.disconnect();
        }

        let (read_half, write_half) = tokio::io::split(stream);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (frame_tx, frame_rx) = mpsc::channel(self.config.write_queue.max(1));

        let mut store = StateStore::new(Arc::clone(&self.observers));
        for (tag, handler) in &self.handlers {
            store.register_handler(*tag, *handler);
        }
        let state = store.subscribe();

        let reader = tokio::spawn(read_loop(read_half, store, event_tx.clone()));
        let writer = tokio::spawn(write_loop(write_half, frame_rx, event_tx));

        self.link = Some(Link {
            frames: frame_tx,
            state,
            reader,
            writer,
            peer,
            since: Instant::now(),
        });
        event_rx
    }

    /// Stop both link tasks and drop the socket. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            link.reader.abort();
            link.writer.abort();
            match &link.peer {
                Some(peer) => info!(%peer, "disconnected"),
                None => info!("disconnected"),
            }
        }
    }

    /// `true` while a link exists and its reader is still running.
    pub fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(|link| !link.reader.is_finished())
    }

    pub fn peer(&self) -> Option<&ConnectionInfo> {
        self.link.as_ref().and_then(|link| link.peer.as_ref())
    }

    pub fn connected_for(&self) -> Option<Duration> {
        self.link.as_ref().map(|link| link.since.elapsed())
    }

    // ── Traffic ──────────────────────────────────────────────────

    fn link(&self) -> Result<&Link, EiscpError> {
        self.link.as_ref().ok_or(EiscpError::NotConnected)
    }

    fn last_frame_slot(&self) -> MutexGuard<'_, Option<Bytes>> {
        self.last_frame.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Frame and queue one opcode.
    pub async fn send_raw(&self, opcode: &str) -> Result<(), EiscpError> {
        let link = self.link()?;
        if link.reader.is_finished() {
            return Err(EiscpError::ConnectionLost("read loop terminated".into()));
        }
        let frame = codec::encode(opcode);
        link.frames
            .send(frame.clone())
            .await
            .map_err(|_| EiscpError::ConnectionLost("write loop terminated".into()))?;
        debug!(opcode, "sent");
        *self.last_frame_slot() = Some(frame);
        Ok(())
    }

    /// The last frame handed to the writer.
    pub fn last_frame(&self) -> Option<Bytes> {
        self.last_frame_slot().clone()
    }

    pub fn snapshot(&self) -> Result<DeviceState, EiscpError> {
        Ok(self.link()?.state.borrow().clone())
    }

    pub fn state_receiver(&self) -> Result<watch::Receiver<DeviceState>, EiscpError> {
        Ok(self.link()?.state.clone())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .field("peer", &self.peer())
            .finish()
    }
}

#[async_trait]
impl Remote for Session {
    async fn send_raw(&self, opcode: &str) -> Result<(), EiscpError> {
        Session::send_raw(self, opcode).await
    }

    fn snapshot(&self) -> Result<DeviceState, EiscpError> {
        Session::snapshot(self)
    }
}

// ── Background tasks ─────────────────────────────────────────────

async fn read_loop<R>(
    reader: R,
    mut store: StateStore,
    events: mpsc::UnboundedSender<SessionEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut batches = FramedRead::new(reader, EiscpCodec);
    let reason = loop {
        match batches.next().await {
            Some(Ok(batch)) => {
                for message in batch {
                    trace!(%message, "recv");
                    store.update(&message);
                }
            }
            Some(Err(e)) => break e.to_string(),
            None => break "closed by peer".to_string(),
        }
    };
    warn!(%reason, "read loop terminated");
    let _ = events.send(SessionEvent::Terminated(EiscpError::ConnectionLost(reason)));
}

async fn write_loop<W>(
    writer: W,
    mut frames: mpsc::Receiver<Bytes>,
    events: mpsc::UnboundedSender<SessionEvent>,
) where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, BytesCodec::new());
    while let Some(frame) = frames.recv().await {
        if let Err(e) = sink.send(frame).await {
            warn!(error = %e, "write failed");
            let _ = events.send(SessionEvent::Terminated(EiscpError::ConnectionLost(
                e.to_string(),
            )));
            return;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_notification;
    use crate::state::Update;
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use tokio::io::{AsyncReadExt, ReadBuf};

    /// Reads never complete; every write fails.
    struct BrokenWrites;

    impl AsyncRead for BrokenWrites {
        fn poll_read(self: Pin<&mut Self>, _: &mut Context<'_>, _: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for BrokenWrites {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn not_connected_before_connect() {
        let session = Session::new(SessionConfig::default());
        assert!(!session.is_connected());
        assert!(matches!(
            session.send_raw("PWR01").await,
            Err(EiscpError::NotConnected)
        ));
        assert!(matches!(session.snapshot(), Err(EiscpError::NotConnected)));
        assert!(session.last_frame().is_none());
    }

    #[tokio::test]
    async fn segmented_reads_update_state() {
        let volume = encode_notification("MVL1A");
        let mut batch = encode_notification("NATArtist").to_vec();
        batch.extend_from_slice(&encode_notification("NTM00:01/03:00"));

        let mock = tokio_test::io::Builder::new()
            .read(&volume[..7])
            .read(&volume[7..])
            .read(&batch)
            .build();

        let mut session = Session::new(SessionConfig::default());
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        session.subscribe(move |_: &DeviceState| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut events = session.attach(mock);
        let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap();
        assert!(matches!(
            event,
            Some(SessionEvent::Terminated(EiscpError::ConnectionLost(_)))
        ));

        let state = session.snapshot().unwrap();
        assert_eq!(state.volume.as_deref(), Some("1A"));
        assert_eq!(state.artist.as_deref(), Some("Artist"));
        assert_eq!(state.time.as_deref(), Some("00:01/03:00"));
        // the time update is silent
        assert_eq!(notified.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn send_raw_writes_frame() {
        let (client, mut device) = tokio::io::duplex(1024);
        let mut session = Session::new(SessionConfig::default());
        let _events = session.attach(client);

        session.send_raw("MVLUP").await.unwrap();

        let expected = codec::encode("MVLUP");
        let mut buf = vec![0u8; expected.len()];
        tokio::time::timeout(WAIT, device.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(buf, expected.to_vec());
        assert_eq!(session.last_frame(), Some(expected));
    }

    #[tokio::test]
    async fn disconnect_cancels_blocked_reader() {
        let (client, mut device) = tokio::io::duplex(1024);
        let mut session = Session::new(SessionConfig::default());
        let mut events = session.attach(client);
        assert!(session.is_connected());

        session.disconnect();
        session.disconnect();
        assert!(!session.is_connected());
        assert!(matches!(
            session.send_raw("PWR00").await,
            Err(EiscpError::NotConnected)
        ));

        // both halves dropped: the device sees EOF and no loss is reported
        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(WAIT, device.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
        assert!(tokio::time::timeout(WAIT, events.recv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reattach_starts_with_fresh_state() {
        let mock = tokio_test::io::Builder::new()
            .read(&encode_notification("MVL30"))
            .build();
        let mut session = Session::new(SessionConfig::default());
        let mut events = session.attach(mock);
        tokio::time::timeout(WAIT, events.recv()).await.unwrap();
        assert_eq!(session.snapshot().unwrap().volume.as_deref(), Some("30"));

        let (client, _device) = tokio::io::duplex(64);
        let _events = session.attach(client);
        assert_eq!(session.snapshot().unwrap(), DeviceState::default());
    }

    #[tokio::test]
    async fn dead_writer_reports_connection_lost() {
        let mut session = Session::new(SessionConfig::default());
        let mut events = session.attach(BrokenWrites);

        session.send_raw("PWR01").await.unwrap();
        let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap();
        assert!(matches!(
            event,
            Some(SessionEvent::Terminated(EiscpError::ConnectionLost(_)))
        ));
        tokio::time::sleep(Duration::from_millis(10)).await;

        // the reader is still parked on its read
        assert!(session.is_connected());
        assert!(matches!(
            session.send_raw("PWR00").await,
            Err(EiscpError::ConnectionLost(_))
        ));
        session.disconnect();
    }

    #[tokio::test]
    async fn registered_handlers_apply_to_new_links() {
        fn input(state: &mut DeviceState, params: &str) -> Update {
            state.speaker_layout = Some(format!("input {params}"));
            Update::Notify
        }

        let mock = tokio_test::io::Builder::new()
            .read(&encode_notification("SLI2B"))
            .build();
        let mut session = Session::new(SessionConfig::default());
        session.register_handler("SLI", input);

        let mut events = session.attach(mock);
        tokio::time::timeout(WAIT, events.recv()).await.unwrap();
        assert_eq!(
            session.snapshot().unwrap().speaker_layout.as_deref(),
            Some("input 2B")
        );
    }
}
