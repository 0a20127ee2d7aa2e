use std::{io, sync::Arc};

use bytes::BytesMut;
use futures_util::SinkExt;
use parking_lot::Mutex;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream},
    net::{TcpStream, ToSocketAddrs},
    select,
    sync::mpsc::UnboundedReceiver,
    task::JoinSet,
};
use tokio_util::{
    codec::{Decoder, FramedWrite},
    sync::CancellationToken,
};
use tracing::{Instrument, debug, debug_span, trace, warn};
use uuid::Uuid;

use crate::{
    ChannelState, Config, Error, Event, EventCodec, LocalBus, Result,
    channel_state::StateCell,
    internal::{Op, Strand},
};

/// A bidirectional byte stream a [`Channel`] can run on.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// Ask the transport to flush small writes immediately.
    fn set_low_latency(&self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for TcpStream {
    fn set_low_latency(&self) -> io::Result<()> {
        self.set_nodelay(true)
    }
}

impl Transport for DuplexStream {}

/// One framed connection to a peer.
///
/// Inbound frames are decoded and delivered to the channel's [`LocalBus`];
/// outbound events are framed and written by [`send`](Channel::send). Local
/// dispatch and writes share a single serialization point, so a handler never
/// runs concurrently with a write on the same channel.
///
/// `Channel` is a cheap handle; clones drive the same connection.
///
/// ```rust,no_run
/// use wirebus::{Channel, Config, Event, Uid};
///
/// # async fn run() -> wirebus::Result<()> {
/// let channel = Channel::connect("127.0.0.1:7000", Config::default()).await?;
/// channel.bus().bind(Uid::new(5), |event| println!("{event}"));
/// channel.send(Event::new(Uid::new(5)).with_property("x", 1));
/// channel.closed().await;
/// channel.join().await
/// # }
/// ```
#[derive(Clone)]
pub struct Channel {
    shared: Arc<Shared>,
}

struct Shared {
    id: Uuid,
    config: Arc<Config>,
    codec: EventCodec,
    bus: LocalBus,
    state: StateCell,
    strand: Strand,
    ops: Mutex<Option<UnboundedReceiver<Op>>>,
    cancel: CancellationToken,
    tasks: Mutex<JoinSet<Result<()>>>,
}

impl Shared {
    fn close(&self) {
        if self.state.close() {
            debug!(channel = %self.id, "channel closed");
        }
        self.cancel.cancel();
    }
}

impl Channel {
    pub fn new(config: Config) -> Self {
        let codec = EventCodec::from_config(&config);
        Self::with_codec(config, codec)
    }

    /// Creates an idle channel framing with `codec`, e.g. one carrying a
    /// [`Compressor`](crate::Compressor).
    pub fn with_codec(config: Config, codec: EventCodec) -> Self {
        let (strand, ops) = Strand::new();
        let shared = Shared {
            id: Uuid::new_v4(),
            config: Arc::new(config),
            codec,
            bus: LocalBus::attached(strand.clone()),
            state: StateCell::default(),
            strand,
            ops: Mutex::new(Some(ops)),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(JoinSet::new()),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Connects to `addr` over TCP and starts a channel on the stream.
    pub async fn connect(addr: impl ToSocketAddrs, config: Config) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let channel = Channel::new(config);
        channel.start(stream)?;
        Ok(channel)
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state.load()
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// The bus inbound events are delivered to. Handlers may be bound before
    /// the channel starts.
    pub fn bus(&self) -> &LocalBus {
        &self.shared.bus
    }

    /// Attaches `transport` and spawns the read loop and the serialization
    /// point on the current Tokio runtime.
    ///
    /// Starting a closed channel does nothing.
    pub fn start<T: Transport>(&self, transport: T) -> Result<()> {
        let shared = &self.shared;
        if shared.state.load().is_closed() {
            debug!(channel = %shared.id, "not starting a closed channel");
            return Ok(());
        }
        let ops = shared.ops.lock().take().ok_or(Error::ChannelAlreadyStarted)?;

        if shared.config.nodelay {
            if let Err(e) = transport.set_low_latency() {
                warn!(channel = %shared.id, error = %e, "couldn't enable low-latency mode");
            }
        }

        let (reader, writer) = tokio::io::split(transport);
        shared.state.transition(ChannelState::Reading);

        let span = debug_span!("channel", id = %shared.id);
        let mut tasks = shared.tasks.lock();
        tasks.spawn(read_loop(shared.clone(), reader).instrument(span.clone()));
        tasks.spawn(strand_loop(shared.clone(), ops, writer).instrument(span));
        debug!(channel = %shared.id, "channel started");
        Ok(())
    }

    /// Queues `event` for writing. Never blocks; ignored once the channel is
    /// closed. Events sent before [`start`](Channel::start) are written as
    /// soon as the channel runs.
    pub fn send(&self, event: Event) {
        if self.state().is_closed() {
            trace!(channel = %self.shared.id, uid = %event.uid, "dropping send on closed channel");
            return;
        }
        if !self.shared.strand.post(Op::Write(event)) {
            trace!(channel = %self.shared.id, "serialization point is gone");
        }
    }

    /// Closes the channel. Calling it again has no effect.
    pub fn stop(&self) {
        self.shared.close();
    }

    /// Resolves once the channel is closed, by [`stop`](Channel::stop), the
    /// peer, or an error.
    pub async fn closed(&self) {
        self.shared.cancel.cancelled().await;
    }

    /// Waits for the channel's tasks to finish.
    ///
    /// Returns the error that closed the channel, if any. A channel closed by
    /// [`stop`](Channel::stop) or by the peer hanging up joins with `Ok`.
    pub async fn join(&self) -> Result<()> {
        let mut tasks = std::mem::take(&mut *self.shared.tasks.lock());
        let mut outcome = Ok(());
        while let Some(res) = tasks.join_next().await {
            let res = res.map_err(Error::from).and_then(|r| r);
            if outcome.is_ok() {
                outcome = res;
            }
        }
        outcome
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("bus", &self.shared.bus)
            .finish()
    }
}

async fn read_loop<R>(shared: Arc<Shared>, mut reader: R) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let read_size = shared.config.read_buffer_size.max(1);
    let mut codec = shared.codec.clone();
    let mut buf = BytesMut::with_capacity(read_size);

    let result = loop {
        shared.state.transition(ChannelState::Reading);
        if buf.len() == buf.capacity() {
            buf.reserve(read_size);
        }

        let read = select! {
            _ = shared.cancel.cancelled() => break Ok(()),
            read = reader.read_buf(&mut buf) => read,
        };
        match read {
            Ok(0) => {
                debug!(buffered = buf.len(), "peer closed the stream");
                break Ok(());
            }
            Ok(n) => trace!(bytes = n, buffered = buf.len(), "read"),
            Err(e) => {
                warn!(error = %e, "read failed");
                break Err(e.into());
            }
        }

        shared.state.transition(ChannelState::Dispatching);
        if let Err(e) = deliver_frames(&mut codec, &mut buf, &shared.bus) {
            warn!(error = %e, "closing channel on invalid frame");
            break Err(e);
        }
    };

    shared.close();
    result
}

// Every complete frame in the buffer reaches the bus before the next read.
fn deliver_frames(codec: &mut EventCodec, buf: &mut BytesMut, bus: &LocalBus) -> Result<()> {
    while let Some(event) = codec.decode(buf)? {
        trace!(uid = %event.uid, length = event.length(), "received event");
        bus.deliver(event);
    }
    Ok(())
}

async fn strand_loop<W>(shared: Arc<Shared>, mut ops: UnboundedReceiver<Op>, writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, shared.codec.clone());

    let result = loop {
        let op = select! {
            biased;
            _ = shared.cancel.cancelled() => break Ok(()),
            op = ops.recv() => op,
        };
        match op {
            Some(Op::Dispatch) => {
                shared.bus.dispatch();
            }
            Some(Op::Write(event)) => {
                let uid = event.uid;
                if let Err(e) = sink.send(event).await {
                    warn!(error = %e, %uid, "write failed");
                    break Err(e);
                }
                trace!(%uid, "sent event");
            }
            None => break Ok(()),
        }
    };

    shared.close();

    // events already received still reach their handlers
    ops.close();
    while let Ok(op) = ops.try_recv() {
        if let Op::Dispatch = op {
            shared.bus.dispatch();
        }
    }

    if let Err(e) = sink.into_inner().shutdown().await {
        debug!(error = %e, "writer shutdown failed");
    }
    result
}
