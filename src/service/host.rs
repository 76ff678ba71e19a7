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

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::message::WireMessage;
use crate::network::{Connection, FrameWriter};
use crate::service::NetConfig;
use crate::session::{Session, SessionEvents, SessionSender};
use crate::{AppError, AppResult};

struct HostInner<M: WireMessage> {
    config: NetConfig,
    events: Arc<dyn SessionEvents<M>>,
    sessions: DashMap<u64, SessionSender<M>>,
    next_session_id: AtomicU64,
    limit_connections: Arc<Semaphore>,
    shutdown: CancellationToken,
}

/// Server/client bootstrap owning the sockets and the live-session set.
///
/// As a server it binds, listens and accepts indefinitely, wrapping every
/// accepted socket into a session; as a client it connects and produces one
/// session per call. The session collection is a concurrent map because the
/// accept loop and callers of `send_to_all` touch it from different tasks.
pub struct SocketHost<M: WireMessage> {
    inner: Arc<HostInner<M>>,
}

impl<M: WireMessage> Clone for SocketHost<M> {
    fn clone(&self) -> Self {
        SocketHost {
            inner: self.inner.clone(),
        }
    }
}

impl<M: WireMessage> SocketHost<M> {
    pub fn new(config: NetConfig, events: Arc<dyn SessionEvents<M>>) -> SocketHost<M> {
        let limit_connections = Arc::new(Semaphore::new(config.max_connection));
        SocketHost {
            inner: Arc::new(HostInner {
                config,
                events,
                sessions: DashMap::new(),
                next_session_id: AtomicU64::new(1),
                limit_connections,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Binds the configured listen address and starts the accept loop.
    ///
    /// Returns the bound address (useful when the configured port is 0).
    /// A bind failure propagates to the caller; transient accept failures
    /// later are retried with backoff and never stop the server.
    pub async fn start_as_server(&self) -> AppResult<SocketAddr> {
        let listen_address = self.inner.config.listen_address();
        let listener = TcpListener::bind(&listen_address).await.map_err(|e| {
            AppError::IllegalState(format!(
                "failed to bind server to address {}: {}",
                listen_address, e
            ))
        })?;
        let local_addr = listener.local_addr()?;
        info!("tcp server listening on {}", local_addr);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            Self::accept_loop(inner, listener).await;
        });
        Ok(local_addr)
    }

    /// Connects to a remote server and wraps the stream in one session.
    pub async fn start_as_client(&self, addr: &str) -> AppResult<SessionSender<M>> {
        let socket = TcpStream::connect(addr)
            .await
            .map_err(|e| AppError::Connect(format!("failed to connect to {}: {}", addr, e)))?;
        let (connection, writer) = Connection::pair_from_tcp(socket, &self.inner.config);
        Ok(Self::spawn_session(&self.inner, connection, writer, None))
    }

    /// The UDP variant: binds a local socket and registers one remote
    /// endpoint; frames are carried in datagrams through the same codec.
    pub async fn connect_udp(
        &self,
        bind_addr: &str,
        remote: SocketAddr,
    ) -> AppResult<SessionSender<M>> {
        let socket = UdpSocket::bind(bind_addr).await?;
        socket
            .connect(remote)
            .await
            .map_err(|e| AppError::Connect(format!("failed to connect udp to {}: {}", remote, e)))?;
        let (connection, writer) =
            Connection::pair_from_udp(Arc::new(socket), remote, &self.inner.config);
        Ok(Self::spawn_session(&self.inner, connection, writer, None))
    }

    /// Adopts a pre-built connection/writer pair, e.g. one whose writer is a
    /// delegate routing frames through a custom transport.
    pub fn adopt(&self, connection: Connection, writer: FrameWriter) -> SessionSender<M> {
        Self::spawn_session(&self.inner, connection, writer, None)
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Snapshot of the live session handles.
    pub fn session_senders(&self) -> Vec<SessionSender<M>> {
        self.inner
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn session(&self, session_id: u64) -> Option<SessionSender<M>> {
        self.inner
            .sessions
            .get(&session_id)
            .map(|entry| entry.value().clone())
    }

    /// Broadcasts one message to every live session; returns how many sends
    /// were queued successfully.
    pub fn send_to_all(&self, msg: &M) -> usize {
        let mut sent = 0;
        for entry in self.inner.sessions.iter() {
            match entry.value().send_msg(msg) {
                Ok(()) => sent += 1,
                Err(e) => debug!("broadcast skipped session {}: {}", entry.key(), e),
            }
        }
        sent
    }

    /// Stops accepting new connections. Already-established sessions keep
    /// running; use `close_all_sessions` to cascade.
    pub fn close(&self) {
        self.inner.shutdown.cancel();
    }

    /// Requests every live session to close.
    pub fn close_all_sessions(&self) {
        for entry in self.inner.sessions.iter() {
            entry.value().close();
        }
    }

    fn spawn_session(
        inner: &Arc<HostInner<M>>,
        connection: Connection,
        writer: FrameWriter,
        permit: Option<OwnedSemaphorePermit>,
    ) -> SessionSender<M> {
        let session_id = inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        let session = Session::new(
            session_id,
            connection,
            writer,
            inner.events.clone(),
            inner.config.outbound_queue_size,
            inner.config.max_frame_size,
        );
        let sender = session.sender();
        inner.sessions.insert(session_id, sender.clone());
        inner.events.on_connected(&sender);

        let inner = inner.clone();
        tokio::spawn(async move {
            session
                .run(move |id| {
                    inner.sessions.remove(&id);
                })
                .await;
            // whether gracefully or unexpectedly closed, release the slot
            drop(permit);
        });
        sender
    }

    async fn accept_loop(inner: Arc<HostInner<M>>, listener: TcpListener) {
        loop {
            let permit = match inner.limit_connections.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let socket = tokio::select! {
                res = Self::accept(&listener) => match res {
                    Ok(socket) => socket,
                    Err(e) => {
                        error!("accept loop stopped: {}", e);
                        break;
                    }
                },
                _ = inner.shutdown.cancelled() => {
                    debug!("accept loop exit after close request");
                    break;
                }
            };

            let (connection, writer) = Connection::pair_from_tcp(socket, &inner.config);
            let sender = Self::spawn_session(&inner, connection, writer, Some(permit));
            debug!(
                "accepted session {} from {:?}",
                sender.session_id(),
                sender.peer_addr()
            );
        }
    }

    async fn accept(listener: &TcpListener) -> AppResult<TcpStream> {
        let mut backoff = 1;

        loop {
            match listener.accept().await {
                Ok((socket, _)) => return Ok(socket),
                Err(err) => {
                    if backoff > 64 {
                        return Err(AppError::Accept(format!(
                            "accept tcp server error: {}",
                            err
                        )));
                    }
                    debug!("transient accept error, retrying: {}", err);
                }
            }

            time::sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }
}
