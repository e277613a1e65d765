//! TCP front end: one debug client at a time, speaking framed messages.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::thread;

use ldb_core::{Debugger, MessageSink, SinkError};
use ldb_wire::{TcpChannel, WireError};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// The outgoing side of the debugger: whichever client is connected.
#[derive(Debug, Default)]
pub(crate) struct ClientSlot {
    current: Mutex<Option<Arc<TcpChannel>>>,
}

impl ClientSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Claim the slot. Returns `false` if another client holds it.
    fn connect(&self, channel: Arc<TcpChannel>) -> bool {
        let mut current = self.current.lock();
        if current.is_some() {
            return false;
        }
        *current = Some(channel);
        true
    }

    /// Release the slot if `channel` still holds it.
    fn disconnect(&self, channel: &Arc<TcpChannel>) {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, channel)) {
            *current = None;
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Drop the connected client, shutting its socket down.
    pub(crate) fn close(&self) {
        if let Some(channel) = self.current.lock().take() {
            channel.shutdown();
        }
    }
}

impl MessageSink for ClientSlot {
    fn send_message(&self, payload: &[u8]) -> Result<(), SinkError> {
        // Clone out so a slow write does not block connect/disconnect.
        let channel = self.current.lock().clone().ok_or(SinkError::NotConnected)?;
        channel
            .write_message(payload)
            .map_err(|e| SinkError::Transport(e.to_string()))
    }
}

/// Session behaviour that outlives a single connection.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ServeOptions {
    /// Keep pausing on breakpoints after the client goes away.
    pub break_without_client: bool,
}

/// Accept clients until `shutdown` completes.
pub(crate) async fn serve(
    listener: TcpListener,
    debugger: Arc<Debugger>,
    slot: Arc<ClientSlot>,
    options: ServeOptions,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("debug server shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = admit(stream, &debugger, &slot, options) {
                        warn!(%peer, "could not set up client: {}", e);
                    }
                }
                Err(e) => warn!("accept failed: {}", e),
            },
        }
    }
    if slot.is_connected() {
        info!("closing client connection");
        slot.close();
    }
}

/// Hand an accepted connection to its own command thread, or refuse it when
/// a client is already connected.
fn admit(
    stream: TcpStream,
    debugger: &Arc<Debugger>,
    slot: &Arc<ClientSlot>,
    options: ServeOptions,
) -> io::Result<()> {
    let stream = stream.into_std()?;
    stream.set_nonblocking(false)?;
    let channel = Arc::new(TcpChannel::new(stream)?);
    let peer = channel.peer();

    if !slot.connect(Arc::clone(&channel)) {
        info!(?peer, "refusing connection: a client is already attached");
        channel.shutdown();
        return Ok(());
    }
    info!(?peer, "client connected");
    debugger.set_listening(true);

    let debugger = Arc::clone(debugger);
    let client_slot = Arc::clone(slot);
    let spawned = thread::Builder::new()
        .name("ldb-client".into())
        .spawn(move || serve_client(&debugger, &client_slot, &channel, options));
    if let Err(e) = spawned {
        slot.close();
        return Err(e);
    }
    Ok(())
}

/// Feed client messages to the debugger until the connection fails, then
/// release every thread the client left paused.
fn serve_client(
    debugger: &Debugger,
    slot: &ClientSlot,
    channel: &Arc<TcpChannel>,
    options: ServeOptions,
) {
    loop {
        match channel.read_string() {
            Ok(message) => {
                debug!(len = message.len(), "client message");
                debugger.handle_message(&message);
            }
            Err(e) if !e.is_fatal() => warn!("dropping client message: {}", e),
            Err(WireError::Closed) => {
                info!(peer = ?channel.peer(), "client disconnected");
                break;
            }
            Err(e) => {
                warn!(peer = ?channel.peer(), "client connection failed: {}", e);
                break;
            }
        }
    }

    slot.disconnect(channel);
    channel.shutdown();
    debugger.set_listening(options.break_without_client);
    let resumed = debugger.resume_all();
    info!(resumed, "client session ended");
}
