//! UDP transport and the interactive run loop
//!
//! [`RemoteClient`] turns the request/reply packets into typed async calls.
//! A background task owns the receive side of the socket: replies are routed
//! to the request waiting on their sequence number, pushes are forwarded to
//! an unbounded channel. [`Client`] drives one followed game from pushes, a
//! poll timer and terminal input.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::input::{parse_command, Command, HELP};
use crate::pipeline::{ClientSyncPipeline, GameService};
use crate::view::{status_line, BoardView};
use async_trait::async_trait;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{
    BoardSnapshot, DirectoryError, GamePlayer, Packet, PlayerMark, RemoteError, MAX_PACKET_SIZE,
};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

type PendingReplies = Arc<Mutex<HashMap<u32, oneshot::Sender<Packet>>>>;

pub struct RemoteClient {
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    next_sequence: AtomicU32,
    pending: PendingReplies,
    request_timeout: Duration,
    receiver: JoinHandle<()>,
}

impl RemoteClient {
    /// Binds a local socket towards `server_addr`
    ///
    /// Returns the client and the stream of packets the server pushes on its
    /// own initiative.
    pub async fn connect(
        server_addr: &str,
        request_timeout: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Packet>), ClientError> {
        let server_addr = tokio::net::lookup_host(server_addr)
            .await?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "server address did not resolve"))?;

        let bind_addr = if server_addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        info!("Client bound to {}, server at {}", socket.local_addr()?, server_addr);

        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let receiver = tokio::spawn(receive_loop(
            socket.clone(),
            server_addr,
            pending.clone(),
            push_tx,
        ));

        let client = RemoteClient {
            socket,
            server_addr,
            next_sequence: AtomicU32::new(1),
            pending,
            request_timeout,
            receiver,
        };
        Ok((client, push_rx))
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), ClientError> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Sends the request built by `build` and waits for its reply
    async fn request(&self, build: impl FnOnce(u32) -> Packet) -> Result<Packet, ClientError> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(sequence, tx);

        let sent = self.send_packet(&build(sequence)).await;
        let reply = match sent {
            Ok(()) => timeout(self.request_timeout, rx).await,
            Err(e) => {
                self.forget(sequence);
                return Err(e);
            }
        };

        match reply {
            Ok(Ok(Packet::Rejected { error, .. })) => Err(error.into()),
            Ok(Ok(packet)) => Ok(packet),
            Ok(Err(_)) => Err(ClientError::UnexpectedReply("receiver stopped".into())),
            Err(_) => {
                self.forget(sequence);
                Err(ClientError::Timeout(self.request_timeout))
            }
        }
    }

    fn forget(&self, sequence: u32) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&sequence);
    }

    pub async fn create_game(&self, name: &str) -> Result<String, ClientError> {
        let name = name.to_string();
        match self
            .request(|sequence| Packet::CreateGame { sequence, name })
            .await?
        {
            Packet::GameCreated { name, .. } => Ok(name),
            other => Err(unexpected(&other)),
        }
    }

    /// Names of the running games, sorted
    pub async fn list_games(&self) -> Result<Vec<String>, ClientError> {
        match self.request(|sequence| Packet::ListGames { sequence }).await? {
            Packet::GameList { names, .. } => Ok(names),
            other => Err(unexpected(&other)),
        }
    }

    /// Takes a seat in `game`; `mark` of None takes the first free one
    pub async fn join(
        &self,
        game: &str,
        player: &str,
        mark: Option<PlayerMark>,
    ) -> Result<(GamePlayer, BoardSnapshot), ClientError> {
        let (game, player) = (game.to_string(), player.to_string());
        match self
            .request(|sequence| Packet::JoinGame {
                sequence,
                game,
                player,
                mark,
            })
            .await?
        {
            Packet::Joined {
                player, snapshot, ..
            } => Ok((player, snapshot)),
            other => Err(unexpected(&other)),
        }
    }

    /// Follows `game` without a seat
    pub async fn watch(&self, game: &str) -> Result<BoardSnapshot, ClientError> {
        let game = game.to_string();
        self.snapshot_reply(|sequence| Packet::WatchGame { sequence, game })
            .await
    }

    pub async fn play(&self, game: &str, column: usize) -> Result<BoardSnapshot, ClientError> {
        let game = game.to_string();
        self.snapshot_reply(|sequence| Packet::Play {
            sequence,
            game,
            column,
        })
        .await
    }

    pub async fn fetch_snapshot(&self, game: &str) -> Result<BoardSnapshot, ClientError> {
        let game = game.to_string();
        self.snapshot_reply(|sequence| Packet::FetchSnapshot { sequence, game })
            .await
    }

    async fn snapshot_reply(&self, build: impl FnOnce(u32) -> Packet) -> Result<BoardSnapshot, ClientError> {
        match self.request(build).await? {
            Packet::Snapshot { snapshot, .. } => Ok(snapshot),
            other => Err(unexpected(&other)),
        }
    }

    /// Tells the server to drop this peer's seats and subscriptions
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.send_packet(&Packet::Disconnect).await
    }
}

impl Drop for RemoteClient {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

fn unexpected(packet: &Packet) -> ClientError {
    ClientError::UnexpectedReply(format!("{:?}", packet))
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    pending: PendingReplies,
    push_tx: mpsc::UnboundedSender<Packet>,
) {
    let mut buffer = [0u8; MAX_PACKET_SIZE];
    loop {
        let (len, addr) = match socket.recv_from(&mut buffer).await {
            Ok(received) => received,
            Err(e) => {
                error!("Error receiving packet: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
        };
        if addr != server_addr {
            debug!("Ignoring datagram from {}", addr);
            continue;
        }

        let packet = match deserialize::<Packet>(&buffer[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Failed to deserialize packet from server: {}", e);
                continue;
            }
        };

        match packet.sequence().filter(|_| packet.is_reply()) {
            Some(sequence) => {
                let waiter = pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&sequence);
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(packet);
                    }
                    None => debug!("Late reply for request {}", sequence),
                }
            }
            None => {
                if push_tx.send(packet).is_err() {
                    debug!("Push dropped, nobody is listening");
                }
            }
        }
    }
}

/// One named game seen through a [`RemoteClient`]
#[derive(Clone)]
pub struct RemoteGame {
    remote: Arc<RemoteClient>,
    game: String,
}

impl RemoteGame {
    pub fn new(remote: Arc<RemoteClient>, game: impl Into<String>) -> Self {
        Self {
            remote,
            game: game.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.game
    }

    pub fn remote(&self) -> &RemoteClient {
        &self.remote
    }
}

#[async_trait]
impl GameService for RemoteGame {
    async fn play(&self, column: usize) -> Result<BoardSnapshot, ClientError> {
        self.remote.play(&self.game, column).await
    }

    async fn fetch_snapshot(&self) -> Result<BoardSnapshot, ClientError> {
        self.remote.fetch_snapshot(&self.game).await
    }
}

/// Why [`Client::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    GameFinished,
    Quit,
    InputClosed,
}

/// Follows one game until it ends or the player leaves
pub struct Client<V: BoardView> {
    game: RemoteGame,
    pipeline: ClientSyncPipeline<V>,
    pushes: mpsc::UnboundedReceiver<Packet>,
    poll_interval: Duration,
}

impl<V: BoardView> Client<V> {
    /// Joins `game` as `player` on the first free mark
    pub async fn join(
        game: RemoteGame,
        pushes: mpsc::UnboundedReceiver<Packet>,
        player: &str,
        view: V,
        config: &ClientConfig,
    ) -> Result<Self, ClientError> {
        let (player, snapshot) = game.remote().join(game.name(), player, None).await?;
        info!("Joined {} as {} playing {}", game.name(), player.name, player.mark);

        let pipeline = ClientSyncPipeline::new(view, config.frame_delay).with_seat(player.mark);
        pipeline.on_remote_update(snapshot).await;
        pipeline
            .show_message(&format!("You are {}. {}", player.mark, HELP))
            .await;

        Ok(Self::with_pipeline(game, pushes, pipeline, config))
    }

    /// Follows `game` as a spectator
    pub async fn watch(
        game: RemoteGame,
        pushes: mpsc::UnboundedReceiver<Packet>,
        view: V,
        config: &ClientConfig,
    ) -> Result<Self, ClientError> {
        let snapshot = game.remote().watch(game.name()).await?;
        info!("Watching {}", game.name());

        let pipeline = ClientSyncPipeline::new(view, config.frame_delay);
        pipeline.on_remote_update(snapshot).await;

        Ok(Self::with_pipeline(game, pushes, pipeline, config))
    }

    fn with_pipeline(
        game: RemoteGame,
        pushes: mpsc::UnboundedReceiver<Packet>,
        pipeline: ClientSyncPipeline<V>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            game,
            pipeline,
            pushes,
            poll_interval: config.poll_interval,
        }
    }

    pub fn pipeline(&self) -> &ClientSyncPipeline<V> {
        &self.pipeline
    }

    /// Main client loop
    ///
    /// Applies pushed boards as they arrive, polls for the latest board on a
    /// timer, and plays the columns typed on `input`. A failed poll keeps the
    /// last confirmed board and is retried on the next tick.
    pub async fn run<R>(&mut self, input: R) -> Result<RunExit, ClientError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut poll = interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                push = self.pushes.recv() => match push {
                    Some(Packet::SnapshotPush { game, snapshot }) if game == self.game.name() => {
                        self.pipeline.on_remote_update(snapshot).await;
                    }
                    Some(Packet::GameFinished { game }) if game == self.game.name() => {
                        finish(&self.pipeline, &self.game).await;
                        return Ok(RunExit::GameFinished);
                    }
                    Some(other) => debug!("Ignoring push {:?}", other),
                    None => {
                        return Err(ClientError::UnexpectedReply("push stream closed".into()));
                    }
                },

                _ = poll.tick() => match self.pipeline.refresh(&self.game).await {
                    Ok(_) => {}
                    Err(ClientError::Remote(RemoteError::Directory(DirectoryError::NameNotFound(_)))) => {
                        finish(&self.pipeline, &self.game).await;
                        return Ok(RunExit::GameFinished);
                    }
                    Err(e) if e.is_transport() => {
                        warn!("Poll failed, keeping last confirmed board: {}", e);
                    }
                    Err(e) => warn!("Poll rejected: {}", e),
                },

                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(exit) = handle_line(&self.pipeline, &self.game, &line).await {
                            return Ok(exit);
                        }
                    }
                    Ok(None) => return Ok(RunExit::InputClosed),
                    Err(e) => {
                        error!("Error reading input: {}", e);
                        return Ok(RunExit::InputClosed);
                    }
                },
            }
        }
    }
}

async fn handle_line<V: BoardView>(
    pipeline: &ClientSyncPipeline<V>,
    game: &RemoteGame,
    line: &str,
) -> Option<RunExit> {
    match parse_command(line) {
        Ok(Command::Play(column)) => {
            // Failures are already shown to the player
            let _ = pipeline.on_local_user_action(game, column).await;
        }
        Ok(Command::Refresh) => {
            if let Err(e) = pipeline.refresh(game).await {
                pipeline.show_message(&e.to_string()).await;
            }
        }
        Ok(Command::Help) => pipeline.show_message(HELP).await,
        Ok(Command::Quit) => return Some(RunExit::Quit),
        Err(message) => pipeline.show_message(&message).await,
    }
    None
}

async fn finish<V: BoardView>(pipeline: &ClientSyncPipeline<V>, game: &RemoteGame) {
    let summary = pipeline
        .inspect(|snapshot, _| snapshot.map(status_line))
        .await
        .unwrap_or_else(|| "no result".to_string());
    info!("Game {} finished: {}", game.name(), summary);
    pipeline
        .show_message(&format!("Game over: {}", summary))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Answers every request from `script` in order
    async fn fake_server(script: Vec<Packet>) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];
            let mut script = script.into_iter();
            loop {
                let (len, peer) = socket.recv_from(&mut buffer).await.unwrap();
                let request: Packet = deserialize(&buffer[..len]).unwrap();
                let Some(sequence) = request.sequence() else {
                    continue;
                };
                let Some(reply) = script.next() else {
                    continue;
                };
                let reply = with_sequence(reply, sequence);
                socket
                    .send_to(&serialize(&reply).unwrap(), peer)
                    .await
                    .unwrap();
            }
        });
        addr
    }

    fn with_sequence(packet: Packet, sequence: u32) -> Packet {
        match packet {
            Packet::GameCreated { name, .. } => Packet::GameCreated { sequence, name },
            Packet::GameList { names, .. } => Packet::GameList { sequence, names },
            Packet::Snapshot { snapshot, .. } => Packet::Snapshot { sequence, snapshot },
            Packet::Rejected { error, .. } => Packet::Rejected { sequence, error },
            other => other,
        }
    }

    #[tokio::test]
    async fn test_replies_are_matched_to_requests() {
        let server = fake_server(vec![
            Packet::GameCreated {
                sequence: 0,
                name: "alpha".into(),
            },
            Packet::GameList {
                sequence: 0,
                names: vec!["alpha".into()],
            },
        ])
        .await;
        let (client, _pushes) = RemoteClient::connect(&server.to_string(), Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(client.create_game("alpha").await.unwrap(), "alpha");
        assert_eq!(client.list_games().await.unwrap(), vec!["alpha".to_string()]);
    }

    #[tokio::test]
    async fn test_rejection_becomes_typed_error() {
        let server = fake_server(vec![Packet::Rejected {
            sequence: 0,
            error: DirectoryError::NameAlreadyInUse("alpha".into()).into(),
        }])
        .await;
        let (client, _pushes) = RemoteClient::connect(&server.to_string(), Duration::from_secs(2))
            .await
            .unwrap();

        let result = client.create_game("alpha").await;
        assert!(matches!(
            result,
            Err(ClientError::Remote(RemoteError::Directory(
                DirectoryError::NameAlreadyInUse(_)
            )))
        ));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let server = fake_server(Vec::new()).await;
        let (client, _pushes) =
            RemoteClient::connect(&server.to_string(), Duration::from_millis(100))
                .await
                .unwrap();

        let result = client.fetch_snapshot("alpha").await;
        assert!(matches!(result, Err(ClientError::Timeout(_))));
        assert!(result.unwrap_err().is_transport());
        assert!(client.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_receiver_outlives_unreachable_server() {
        let gone = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = gone.local_addr().unwrap();
        drop(gone);

        let (client, _pushes) = RemoteClient::connect(&server.to_string(), Duration::from_millis(50))
            .await
            .unwrap();

        for _ in 0..3 {
            let result = client.fetch_snapshot("alpha").await;
            assert!(matches!(result, Err(ref e) if e.is_transport()));
        }
        assert!(!client.receiver.is_finished());
        assert!(client.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_reply_kind_is_reported() {
        let server = fake_server(vec![Packet::GameList {
            sequence: 0,
            names: Vec::new(),
        }])
        .await;
        let (client, _pushes) = RemoteClient::connect(&server.to_string(), Duration::from_secs(2))
            .await
            .unwrap();

        let result = client.fetch_snapshot("alpha").await;
        assert!(matches!(result, Err(ClientError::UnexpectedReply(_))));
    }
}
