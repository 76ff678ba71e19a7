// Copyright 2025 wireline contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::message::WireMessage;
use crate::network::{encode_into, Connection, FrameWriter, HEADER_SIZE};
use crate::{AppError, AppResult};

/// Callback surface a session reports into.
///
/// All callbacks run on the session's own read loop, one at a time per
/// session; across sessions they run concurrently. Implementations must not
/// block.
pub trait SessionEvents<M: WireMessage>: Send + Sync + 'static {
    fn on_connected(&self, _session: &SessionSender<M>) {}

    fn on_message(&self, session: &SessionSender<M>, msg: M);

    /// Invoked exactly once per session, after its last message.
    fn on_disconnected(&self, _session_id: u64) {}

    fn on_error(&self, session_id: u64, err: &AppError) {
        error!("session {} error: {}", session_id, err);
    }
}

/// Cloneable outbound handle to one session.
///
/// Encodes messages into frames and queues them for the session's writer
/// task. Queueing is non-blocking; there is no backpressure beyond the queue
/// capacity and the OS socket buffers.
#[derive(Debug)]
pub struct SessionSender<M: WireMessage> {
    session_id: u64,
    peer_addr: Option<SocketAddr>,
    out_tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    closed: Arc<AtomicBool>,
    max_frame_size: usize,
    _marker: PhantomData<fn(M)>,
}

impl<M: WireMessage> Clone for SessionSender<M> {
    fn clone(&self) -> Self {
        SessionSender {
            session_id: self.session_id,
            peer_addr: self.peer_addr,
            out_tx: self.out_tx.clone(),
            cancel: self.cancel.clone(),
            closed: self.closed.clone(),
            max_frame_size: self.max_frame_size,
            _marker: PhantomData,
        }
    }
}

impl<M: WireMessage> SessionSender<M> {
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Serializes `msg`, wraps it in a frame and queues it for sending.
    ///
    /// Fails with `SessionClosed` once the session has disconnected and with
    /// `ChannelSendError` when the outbound queue is full.
    pub fn send_msg(&self, msg: &M) -> AppResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AppError::SessionClosed(self.session_id));
        }
        let mut payload = BytesMut::new();
        msg.encode_payload(&mut payload)?;
        if HEADER_SIZE + payload.len() > self.max_frame_size {
            return Err(AppError::FrameTooLarge(format!(
                "outbound frame of length {} exceeds limit {}",
                HEADER_SIZE + payload.len(),
                self.max_frame_size
            )));
        }
        let mut out = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        encode_into(msg.type_tag(), &payload, &mut out)?;
        self.out_tx.try_send(out.freeze()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => AppError::ChannelSendError(format!(
                "outbound queue full for session {}",
                self.session_id
            )),
            mpsc::error::TrySendError::Closed(_) => AppError::SessionClosed(self.session_id),
        })
    }

    /// Requests the session to stop; the disconnect notification still fires
    /// exactly once, from the session's own loop.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn detached(
        session_id: u64,
        queue_size: usize,
        max_frame_size: usize,
    ) -> (SessionSender<M>, mpsc::Receiver<Bytes>) {
        let (out_tx, out_rx) = mpsc::channel(queue_size);
        let sender = SessionSender {
            session_id,
            peer_addr: None,
            out_tx,
            cancel: CancellationToken::new(),
            closed: Arc::new(AtomicBool::new(false)),
            max_frame_size,
            _marker: PhantomData,
        };
        (sender, out_rx)
    }
}

/// Binds one `Connection` to one message type and drives both directions.
///
/// Lifecycle: Created (constructed) → Active (`run`) → Closed (terminal).
/// The read loop decodes frames sequentially and dispatches each complete
/// message in the same turn it arrived; a writer task drains the outbound
/// queue. There is no transition out of Closed, and `on_disconnected` fires
/// exactly once on the single exit path.
pub struct Session<M: WireMessage> {
    session_id: u64,
    connection: Connection,
    writer: FrameWriter,
    out_rx: mpsc::Receiver<Bytes>,
    sender: SessionSender<M>,
    events: Arc<dyn SessionEvents<M>>,
}

impl<M: WireMessage> Session<M> {
    pub fn new(
        session_id: u64,
        connection: Connection,
        writer: FrameWriter,
        events: Arc<dyn SessionEvents<M>>,
        outbound_queue_size: usize,
        max_frame_size: usize,
    ) -> Session<M> {
        let (out_tx, out_rx) = mpsc::channel(outbound_queue_size);
        let sender = SessionSender {
            session_id,
            peer_addr: connection.peer_addr(),
            out_tx,
            cancel: CancellationToken::new(),
            closed: Arc::new(AtomicBool::new(false)),
            max_frame_size,
            _marker: PhantomData,
        };
        Session {
            session_id,
            connection,
            writer,
            out_rx,
            sender,
            events,
        }
    }

    pub fn sender(&self) -> SessionSender<M> {
        self.sender.clone()
    }

    /// Runs the session to completion. `on_close` is the host's removal
    /// callback; it runs after the disconnect notification.
    pub async fn run(mut self, on_close: impl FnOnce(u64)) {
        let writer_task = tokio::spawn(Self::run_writer(
            self.writer,
            self.out_rx,
            self.sender.cancel.clone(),
            self.session_id,
        ));

        loop {
            let res = tokio::select! {
                res = self.connection.read_frame() => res,
                _ = self.sender.cancel.cancelled() => {
                    debug!("session {} read loop exit after close request", self.session_id);
                    break;
                }
            };
            match res {
                Ok(Some(frame)) => match M::decode(frame.type_tag, frame.payload) {
                    Ok(msg) => self.events.on_message(&self.sender, msg),
                    // frame boundaries are intact, keep the session alive
                    Err(e) => self.events.on_error(self.session_id, &e),
                },
                Ok(None) => {
                    debug!("session {} peer closed", self.session_id);
                    break;
                }
                Err(e) => {
                    self.events.on_error(self.session_id, &e);
                    break;
                }
            }
        }

        self.sender.closed.store(true, Ordering::Release);
        self.sender.cancel.cancel();
        let _ = writer_task.await;
        self.events.on_disconnected(self.session_id);
        on_close(self.session_id);
    }

    async fn run_writer(
        mut writer: FrameWriter,
        mut out_rx: mpsc::Receiver<Bytes>,
        cancel: CancellationToken,
        session_id: u64,
    ) {
        loop {
            let bytes = tokio::select! {
                _ = cancel.cancelled() => break,
                maybe = out_rx.recv() => match maybe {
                    Some(bytes) => bytes,
                    None => break,
                }
            };
            if let Err(e) = writer.write(bytes).await {
                error!("session {} write error: {}", session_id, e);
                cancel.cancel();
                break;
            }
        }
        if let Err(e) = writer.shutdown().await {
            debug!("session {} writer shutdown: {}", session_id, e);
        }
    }
}
