//! Asynchronous client for the remote renderer.
//!
//! Outbound calls are synchronous: they enqueue onto one unbounded channel
//! drained by a writer task, so the export loop never waits on the network
//! and messages leave in the order they were submitted. A reader task parses
//! inbound lines and dispatches them to observers and the image store.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use scenesync_common::clock::FrameClock;
use scenesync_common::config::RendererConfig;
use scenesync_common::error::{SyncError, SyncResult};
use scenesync_scene_model::EntityPayload;

use crate::codec::{decode_line, encode_line};
use crate::image::{ImageStore, RenderImage};
use crate::message::{
    first_line, ChannelType, ClientMessage, RendererLogLevel, RendererMode, ServerMessage,
};
use crate::observer::RenderObserver;

/// Tunables for a [`RenderClient`].
#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    /// Bound for [`RenderClient::wait_for_commit`].
    pub ack_timeout: Duration,

    /// Ask the renderer to show its own frame buffer.
    pub show_vfb: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from(&RendererConfig::default())
    }
}

impl From<&RendererConfig> for ClientOptions {
    fn from(config: &RendererConfig) -> Self {
        Self {
            ack_timeout: Duration::from_millis(config.ack_timeout_ms),
            show_vfb: config.show_vfb,
        }
    }
}

enum Outbound {
    Message(ClientMessage),
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy, Default)]
struct AckState {
    acked: u64,
    closed: bool,
}

/// State touched by the reader task.
struct Shared {
    images: ImageStore,
    observers: RwLock<Vec<Arc<dyn RenderObserver>>>,
    connected: AtomicBool,
    aborted: AtomicBool,
    fix_images: AtomicBool,
    progress: AtomicU32,
    progress_message: Mutex<String>,
    last_rendered_frame: Mutex<Option<f64>>,
    acks: watch::Sender<AckState>,
}

impl Shared {
    fn new() -> Self {
        let (acks, _) = watch::channel(AckState::default());
        Self {
            images: ImageStore::new(),
            observers: RwLock::new(vec![]),
            connected: AtomicBool::new(true),
            aborted: AtomicBool::new(false),
            fix_images: AtomicBool::new(false),
            progress: AtomicU32::new(0f32.to_bits()),
            progress_message: Mutex::new(String::new()),
            last_rendered_frame: Mutex::new(None),
            acks,
        }
    }

    fn observers(&self) -> Vec<Arc<dyn RenderObserver>> {
        self.observers
            .read()
            .map(|list| list.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn mark_closed(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::info!("Renderer link closed");
        }
        self.acks.send_modify(|state| state.closed = true);
    }

    fn dispatch(&self, message: ServerMessage) {
        match message {
            ServerMessage::Log { level, message } => {
                let level = RendererLogLevel::from_code(level);
                let text = first_line(&message);
                match level {
                    RendererLogLevel::Error => tracing::error!(target: "renderer", "{text}"),
                    RendererLogLevel::Warning => tracing::warn!(target: "renderer", "{text}"),
                    RendererLogLevel::Info => tracing::info!(target: "renderer", "{text}"),
                    RendererLogLevel::Debug => tracing::debug!(target: "renderer", "{text}"),
                }
                for observer in self.observers() {
                    observer.on_log(level, text);
                }
            }
            ServerMessage::Progress { fraction } => {
                self.progress.store(fraction.to_bits(), Ordering::Relaxed);
                for observer in self.observers() {
                    observer.on_progress(fraction);
                }
            }
            ServerMessage::ProgressMessage { text } => {
                for observer in self.observers() {
                    observer.on_progress_message(&text);
                }
                *lock(&self.progress_message) = text;
            }
            ServerMessage::Image {
                channel,
                ready,
                update,
            } => {
                let fix = self.fix_images.load(Ordering::Relaxed) && !update.bucket;
                if let Err(e) = self.images.apply(channel, &update, fix) {
                    tracing::warn!(?channel, error = %e, "Dropping image update");
                    return;
                }
                let observers = self.observers();
                for observer in &observers {
                    observer.on_image_updated(channel);
                }
                if ready {
                    tracing::debug!(?channel, "Image ready");
                    if let Some(image) = self.images.snapshot(channel) {
                        for observer in &observers {
                            observer.on_image_ready(channel, &image);
                        }
                    }
                }
            }
            ServerMessage::Aborted => {
                tracing::warn!("Renderer aborted");
                self.aborted.store(true, Ordering::SeqCst);
                for observer in self.observers() {
                    observer.on_aborted();
                }
            }
            ServerMessage::Continue {
                last_rendered_frame,
            } => {
                self.aborted.store(false, Ordering::SeqCst);
                *lock(&self.last_rendered_frame) = Some(last_rendered_frame);
                for observer in self.observers() {
                    observer.on_continue(last_rendered_frame);
                }
            }
            ServerMessage::Ack { seq } => {
                self.acks
                    .send_modify(|state| state.acked = state.acked.max(seq));
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Values already sent, so repeated calls do not resend them.
#[derive(Debug, Default)]
struct CachedValues {
    current_frame: Option<FrameClock>,
    camera: Option<String>,
    show_vfb: Option<bool>,
    mode: Option<RendererMode>,
}

#[derive(Debug)]
struct Outgoing {
    cache: CachedValues,
    /// Entities changed since the last commit. Starts set so the first commit is sent.
    dirty: bool,
    last_seq: u64,
    exported: u64,
    started: bool,
}

impl Default for Outgoing {
    fn default() -> Self {
        Self {
            cache: CachedValues::default(),
            dirty: true,
            last_seq: 0,
            exported: 0,
            started: false,
        }
    }
}

/// Connection to a remote renderer.
pub struct RenderClient {
    outbound: mpsc::UnboundedSender<Outbound>,
    shared: Arc<Shared>,
    state: Mutex<Outgoing>,
    options: ClientOptions,
    reader: JoinHandle<()>,
}

impl RenderClient {
    /// Connect over TCP to the configured endpoint.
    pub async fn connect(config: &RendererConfig) -> SyncResult<Self> {
        let endpoint = config.endpoint();
        tracing::info!(%endpoint, "Connecting to renderer");

        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&endpoint))
            .await
            .map_err(|_| {
                SyncError::timeout(format!(
                    "no connection to {endpoint} after {}ms",
                    config.connect_timeout_ms
                ))
            })?
            .map_err(|e| SyncError::connection(format!("{endpoint}: {e}")))?;
        stream.set_nodelay(true)?;

        tracing::info!(%endpoint, "Connected to renderer");
        Ok(Self::from_stream(stream, ClientOptions::from(config)))
    }

    /// Run the protocol over any byte stream. Must be called inside a tokio runtime.
    pub fn from_stream<S>(stream: S, options: ClientOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let shared = Arc::new(Shared::new());
        let (outbound, queue) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(BufWriter::new(write_half), queue, shared.clone()));
        let reader = tokio::spawn(read_loop(read_half, shared.clone()));

        Self {
            outbound,
            shared,
            state: Mutex::new(Outgoing::default()),
            options,
            reader,
        }
    }

    fn send(&self, message: ClientMessage) -> SyncResult<()> {
        self.outbound
            .send(Outbound::Message(message))
            .map_err(|_| SyncError::connection("renderer link closed"))
    }

    fn state(&self) -> MutexGuard<'_, Outgoing> {
        lock(&self.state)
    }

    /// Register an observer for renderer events.
    pub fn add_observer(&self, observer: Arc<dyn RenderObserver>) {
        match self.shared.observers.write() {
            Ok(mut list) => list.push(observer),
            Err(poisoned) => poisoned.into_inner().push(observer),
        }
    }

    /// Tell the renderer what kind of job follows and request the result images.
    pub fn init(&self, mode: RendererMode) -> SyncResult<()> {
        let mut state = self.state();
        tracing::info!(?mode, "Initializing renderer");
        self.shared.fix_images.store(mode.is_final(), Ordering::Relaxed);

        self.send(ClientMessage::Init { mode })?;
        self.send(ClientMessage::GetImage {
            channel: ChannelType::Beauty,
        })?;
        if mode == RendererMode::SingleFrame {
            self.send(ClientMessage::GetImage {
                channel: ChannelType::RealColor,
            })?;
        }
        self.send(ClientMessage::SetVfbShow {
            show: self.options.show_vfb,
        })?;

        state.cache.mode = Some(mode);
        state.cache.show_vfb = Some(self.options.show_vfb);
        Ok(())
    }

    /// Toggle the renderer's frame buffer window; sent only on change.
    pub fn set_show_vfb(&self, show: bool) -> SyncResult<bool> {
        let mut state = self.state();
        if state.cache.show_vfb == Some(show) {
            return Ok(false);
        }
        self.send(ClientMessage::SetVfbShow { show })?;
        state.cache.show_vfb = Some(show);
        Ok(true)
    }

    /// Create an entity or update its attributes.
    ///
    /// Render-channel plugins also request their channel's image.
    pub fn create_or_update(&self, id: &str, payload: &EntityPayload) -> SyncResult<()> {
        let mut state = self.state();
        if let Some(channel) = ChannelType::from_plugin(&payload.plugin) {
            self.send(ClientMessage::GetImage { channel })?;
        }
        self.send(ClientMessage::CreateOrUpdate {
            id: id.to_string(),
            plugin: payload.plugin.clone(),
            attributes: payload.attributes.clone(),
        })?;
        state.dirty = true;
        state.exported += 1;
        Ok(())
    }

    pub fn remove(&self, id: &str) -> SyncResult<()> {
        let mut state = self.state();
        self.send(ClientMessage::Remove { id: id.to_string() })?;
        state.dirty = true;
        Ok(())
    }

    pub fn replace(&self, old: &str, new: &str) -> SyncResult<()> {
        let mut state = self.state();
        self.send(ClientMessage::Replace {
            old: old.to_string(),
            new: new.to_string(),
        })?;
        state.dirty = true;
        Ok(())
    }

    /// Close the current batch as the time sample `clock`.
    ///
    /// Nothing is sent if no entity changed since the previous commit.
    /// Returns the commit sequence number when one was sent.
    pub fn commit(&self, clock: FrameClock) -> SyncResult<Option<u64>> {
        let mut state = self.state();
        if !state.dirty {
            tracing::trace!(clock = %clock, "Nothing to commit");
            return Ok(None);
        }
        let seq = state.last_seq + 1;
        self.send(ClientMessage::Commit { seq, clock })?;
        state.last_seq = seq;
        state.dirty = false;
        tracing::debug!(seq, clock = %clock, "Committed batch");
        Ok(Some(seq))
    }

    /// Wait until the renderer acknowledges commit `seq`.
    pub async fn wait_for_commit(&self, seq: u64) -> SyncResult<()> {
        let mut acks = self.shared.acks.subscribe();
        let waited = tokio::time::timeout(
            self.options.ack_timeout,
            acks.wait_for(|state| state.acked >= seq || state.closed),
        )
        .await;

        let state = match waited {
            Err(_) => {
                return Err(SyncError::timeout(format!(
                    "commit {seq} not acknowledged within {}ms",
                    self.options.ack_timeout.as_millis()
                )))
            }
            Ok(Err(_)) => return Err(SyncError::connection("renderer link closed")),
            Ok(Ok(state)) => *state,
        };

        if state.acked >= seq {
            Ok(())
        } else {
            Err(SyncError::connection(format!(
                "renderer link closed before commit {seq} was acknowledged"
            )))
        }
    }

    /// Move the renderer's time cursor; sent only on change.
    pub fn set_current_frame(&self, clock: FrameClock) -> SyncResult<bool> {
        let mut state = self.state();
        if state.cache.current_frame == Some(clock) {
            return Ok(false);
        }
        self.send(ClientMessage::SetCurrentFrame {
            frame: clock.to_float(),
        })?;
        state.cache.current_frame = Some(clock);
        Ok(true)
    }

    /// Switch the active camera; sent only on change.
    pub fn set_camera(&self, name: &str) -> SyncResult<bool> {
        let mut state = self.state();
        if state.cache.camera.as_deref() == Some(name) {
            return Ok(false);
        }
        self.send(ClientMessage::SetCamera {
            name: name.to_string(),
        })?;
        state.cache.camera = Some(name.to_string());
        state.dirty = true;
        Ok(true)
    }

    /// Set the output resolution; sent only on change.
    pub fn resize(&self, width: u32, height: u32) -> SyncResult<bool> {
        let _state = self.state();
        if !self.shared.images.set_render_size(width, height) {
            return Ok(false);
        }
        self.send(ClientMessage::Resize { width, height })?;
        Ok(true)
    }

    pub fn request_image(&self, channel: ChannelType) -> SyncResult<()> {
        let _state = self.state();
        self.send(ClientMessage::GetImage { channel })
    }

    /// Drop the renderer's cached animation values up to `up_to`.
    pub fn clear_frame_data(&self, up_to: f64) -> SyncResult<()> {
        let _state = self.state();
        self.send(ClientMessage::ClearFrameData { up_to })
    }

    pub fn start(&self) -> SyncResult<()> {
        let mut state = self.state();
        self.send(ClientMessage::Start)?;
        state.started = true;
        Ok(())
    }

    pub fn stop(&self) -> SyncResult<()> {
        let mut state = self.state();
        self.send(ClientMessage::Stop)?;
        state.started = false;
        Ok(())
    }

    /// Reset the renderer scene and forget every cached value.
    pub fn reset(&self) -> SyncResult<()> {
        let mut state = self.state();
        self.send(ClientMessage::Reset)?;
        self.send(ClientMessage::SetVfbShow {
            show: self.options.show_vfb,
        })?;
        state.cache = CachedValues {
            show_vfb: Some(self.options.show_vfb),
            ..CachedValues::default()
        };
        state.dirty = true;
        self.shared.images.set_render_size(0, 0);
        self.shared.images.clear();
        self.shared.aborted.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Release the renderer's resources for this job.
    pub fn free(&self) -> SyncResult<()> {
        let _state = self.state();
        self.send(ClientMessage::Free)
    }

    /// Wait until every queued message has been written out.
    pub async fn flush(&self) -> SyncResult<()> {
        let (done, flushed) = oneshot::channel();
        self.outbound
            .send(Outbound::Flush(done))
            .map_err(|_| SyncError::connection("renderer link closed"))?;
        flushed
            .await
            .map_err(|_| SyncError::connection("renderer link closed while flushing"))
    }

    /// Flush outstanding messages and stop listening to the renderer.
    pub async fn close(&self) -> SyncResult<()> {
        let flushed = self.flush().await;
        self.reader.abort();
        self.shared.mark_closed();
        flushed
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Whether the renderer reported an abort since the last continue or reset.
    pub fn is_aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::SeqCst)
    }

    /// Mode passed to the last [`init`](Self::init), cleared by `reset`.
    pub fn mode(&self) -> Option<RendererMode> {
        self.state().cache.mode
    }

    pub fn is_started(&self) -> bool {
        self.state().started
    }

    /// Entities changed since the last commit.
    pub fn is_dirty(&self) -> bool {
        self.state().dirty
    }

    pub fn progress(&self) -> f32 {
        f32::from_bits(self.shared.progress.load(Ordering::Relaxed))
    }

    pub fn progress_message(&self) -> String {
        lock(&self.shared.progress_message).clone()
    }

    pub fn last_rendered_frame(&self) -> Option<f64> {
        *lock(&self.shared.last_rendered_frame)
    }

    /// Sequence number of the last commit sent, if any.
    pub fn last_commit_seq(&self) -> Option<u64> {
        Some(self.state().last_seq).filter(|seq| *seq > 0)
    }

    /// Create-or-update messages sent since the last reset of the counter.
    pub fn exported_count(&self) -> u64 {
        self.state().exported
    }

    pub fn reset_exported_count(&self) {
        self.state().exported = 0;
    }

    /// Copy of a channel's current image.
    pub fn image(&self, channel: ChannelType) -> Option<RenderImage> {
        self.shared.images.snapshot(channel)
    }

    pub fn images(&self) -> &ImageStore {
        &self.shared.images
    }
}

impl Drop for RenderClient {
    fn drop(&mut self) {
        // The writer drains what is queued once the sender goes away.
        self.reader.abort();
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
    shared: Arc<Shared>,
) where
    W: AsyncWrite + Unpin,
{
    let mut written: u64 = 0;
    while let Some(item) = queue.recv().await {
        let result = match item {
            Outbound::Message(message) => match encode_line(&message) {
                Ok(line) => {
                    written += 1;
                    match writer.write_all(line.as_bytes()).await {
                        Ok(()) => writer.flush().await,
                        err => err,
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode message");
                    Ok(())
                }
            },
            Outbound::Flush(done) => {
                let flushed = writer.flush().await;
                let _ = done.send(());
                flushed
            }
        };

        if let Err(e) = result {
            tracing::error!(error = %e, "Failed to write to renderer");
            break;
        }
    }

    let _ = writer.shutdown().await;
    shared.mark_closed();
    tracing::debug!(messages = written, "Renderer writer stopped");
}

async fn read_loop<R>(reader: R, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match decode_line::<ServerMessage>(&line) {
                Ok(Some(message)) => shared.dispatch(message),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Ignoring renderer message"),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Renderer read failed");
                break;
            }
        }
    }
    shared.mark_closed();
}
