//! Connection pairing and the per-session dispatch loop. One relay task per
//! session multiplexes both directions, so all handler invocations for one
//! session's flags are serialized; sessions proceed fully in parallel.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use log::{debug, error, info};
use tokio::io::AsyncRead;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::command::CommandExecutor;
use crate::config_loader::Config;
use crate::mapper::{Mapper, Protocol};
use crate::packet::{self, Packet};
use crate::session::Session;
use crate::transport::{self, Endpoint};

pub struct Relay {
    config: Config,
    mapper: Arc<dyn Mapper>,
    console: Arc<dyn CommandExecutor>,
}

impl Relay {
    pub fn new(config: Config, mapper: Arc<dyn Mapper>, console: Arc<dyn CommandExecutor>) -> Self {
        Self {
            config,
            mapper,
            console,
        }
    }

    pub async fn serve(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind_address)
            .await
            .with_context(|| format!("failed to bind {}", self.config.bind_address))?;
        self.serve_on(listener).await
    }

    pub async fn serve_on(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!("listening on {}", listener.local_addr()?);
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        error!("Failed to disable Nagle: {}", e);
                    }
                    let relay = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = relay.handle_client(stream, peer).await {
                            error!("session {} ended with error: {}", peer, e);
                        }
                    });
                }
                Err(e) => error!("Accept error: {}", e),
            }
        }
    }

    /// Pairs one client with a fresh backend connection and relays packets in
    /// both directions until either side goes away.
    async fn handle_client(&self, client: TcpStream, peer: SocketAddr) -> Result<()> {
        let backend = TcpStream::connect(&self.config.backend_address)
            .await
            .with_context(|| format!("backend {} unreachable", self.config.backend_address))?;
        if let Err(e) = backend.set_nodelay(true) {
            error!("Failed to disable Nagle on backend: {}", e);
        }

        let (client_read, client_write) = client.into_split();
        let (backend_read, backend_write) = backend.into_split();

        let (client_ep, client_queue) = Endpoint::new("client");
        let (backend_ep, backend_queue) = Endpoint::new("backend");
        tokio::spawn(transport::writer_task(client_queue, client_write, "proxy->client"));
        tokio::spawn(transport::writer_task(backend_queue, backend_write, "proxy->backend"));

        let (client_frames_tx, mut client_frames) = mpsc::channel(64);
        let (backend_frames_tx, mut backend_frames) = mpsc::channel(64);
        tokio::spawn(reader_task(client_read, client_frames_tx, "client->proxy"));
        tokio::spawn(reader_task(backend_read, backend_frames_tx, "backend->proxy"));

        let mut session = Session::new(
            client_ep.clone(),
            Arc::clone(&self.console),
            self.config.console.command_channel,
        );
        info!("paired {} with backend {}", peer, self.config.backend_address);

        let frontend = self.config.protocols.frontend.clone();
        let backend_proto = self.config.protocols.backend.clone();

        loop {
            tokio::select! {
                frame = client_frames.recv() => match frame {
                    Some(p) => {
                        let p = self.translate(p, &frontend, &backend_proto);
                        let p = self.dispatch_outbound(&mut session, p).await;
                        if backend_ep.send(p).is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                frame = backend_frames.recv() => match frame {
                    Some(p) => {
                        let p = self.translate(p, &backend_proto, &frontend);
                        let p = self.dispatch_inbound(&mut session, p).await;
                        if client_ep.send(p).is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        // Teardown: no flag survives the session, and any late synthetic send
        // hits a closed endpoint instead of a dead socket.
        session.clear_pending();
        info!("session {} closed", peer);
        Ok(())
    }

    /// Client -> backend interception. Unmatched packet names pass through.
    async fn dispatch_outbound(&self, session: &mut Session, p: Packet) -> Packet {
        let from = &self.config.protocols.frontend;
        let to = &self.config.protocols.backend;
        let result = match p.name.as_str() {
            "PrivateChatReq" => Some(session.on_private_chat_req(from, to, &p.head, &p.body).await),
            "PullPrivateChatReq" => Some(session.on_pull_private_chat_req(from, to, &p.body).await),
            "PullRecentChatReq" => Some(session.on_pull_recent_chat_req(from, to, &p.body).await),
            "MarkMapReq" => Some(session.on_mark_map_req(from, to, &p.head, &p.body).await),
            _ => None,
        };
        apply(p, result)
    }

    /// Backend -> client interception. Unmatched packet names pass through.
    async fn dispatch_inbound(&self, session: &mut Session, p: Packet) -> Packet {
        let from = &self.config.protocols.backend;
        let to = &self.config.protocols.frontend;
        let result = match p.name.as_str() {
            "PrivateChatRsp" => Some(session.on_private_chat_rsp(from, to, &p.body).await),
            "PullPrivateChatRsp" => Some(session.on_pull_private_chat_rsp(from, to, &p.body).await),
            "PullRecentChatRsp" => Some(session.on_pull_recent_chat_rsp(from, to, &p.body).await),
            "GetPlayerFriendListRsp" => {
                Some(session.on_get_player_friend_list_rsp(from, to, &p.body).await)
            }
            "MarkMapRsp" => Some(session.on_mark_map_rsp(from, to, &p.body).await),
            "GetPlayerTokenRsp" => {
                session.observe_player_token_rsp(&p.body);
                None
            }
            _ => None,
        };
        apply(p, result)
    }

    /// Cross-version translation for everything that flows through. A mapper
    /// failure degrades to forwarding the untranslated body.
    fn translate(&self, p: Packet, from: &Protocol, to: &Protocol) -> Packet {
        if from == to {
            return p;
        }
        match self.mapper.translate(&p.name, from, to, &p.body) {
            Ok(body) => Packet {
                body: Bytes::from(body),
                ..p
            },
            Err(e) => {
                error!("mapper failed on {}: {}", p.name, e);
                p
            }
        }
    }
}

/// Fail open: a handler decode error forwards the original bytes untouched.
fn apply(mut p: Packet, result: Option<Result<Vec<u8>>>) -> Packet {
    match result {
        None => p,
        Some(Ok(body)) => {
            p.body = Bytes::from(body);
            p
        }
        Some(Err(e)) => {
            debug!("{}: passing through unmodified: {}", p.name, e);
            p
        }
    }
}

/// Parses frames off one socket half and hands them to the session's relay
/// task. Exits on EOF, a framing error, or when the session is gone.
async fn reader_task<R: AsyncRead + Unpin>(
    mut reader: R,
    tx: mpsc::Sender<Packet>,
    tag: &'static str,
) {
    loop {
        match packet::read_frame(&mut reader).await {
            Ok(Some(p)) => {
                if tx.send(p).await.is_err() {
                    break;
                }
            }
            Ok(None) => break, // EOF
            Err(e) => {
                error!("{} - read error: {}", tag, e);
                break;
            }
        }
    }
}
