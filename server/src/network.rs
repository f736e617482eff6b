//! Server network layer exposing the session directory over UDP
//!
//! One task receives datagrams, one sends them, and one checks for idle peers
//! and sessions. All request handling happens on the main loop, which also
//! turns session events into pushes for the peers following each game.

use crate::config::ServerConfig;
use crate::directory::SessionDirectory;
use crate::error::ServerError;
use crate::session::{SessionEvent, SessionObserver};
use crate::subscribers::SubscriberTable;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{FourInARow, GamePlayer, Packet, RemoteError, MAX_NAME_LEN, MAX_PACKET_SIZE};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Messages sent from network tasks and sessions to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    Session(SessionEvent),
    SubscriberTimeout { addr: SocketAddr },
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        targets: Vec<SocketAddr>,
    },
}

/// Feeds every session event into the main loop
struct LoopForwarder {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl SessionObserver for LoopForwarder {
    fn notify(&self, event: &SessionEvent) {
        if let Err(e) = self.tx.send(ServerMessage::Session(event.clone())) {
            debug!("Server loop gone, dropping session event: {}", e);
        }
    }

    fn is_live(&self) -> bool {
        !self.tx.is_closed()
    }
}

pub struct Server {
    socket: Arc<UdpSocket>,
    directory: SessionDirectory,
    subscribers: Arc<RwLock<SubscriberTable>>,
    config: ServerConfig,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    /// Validates `config` and binds the server socket to `addr`
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        let directory = SessionDirectory::new(
            config.rows,
            config.cols,
            Arc::new(FourInARow::new(config.line_length)),
        );
        directory.add_session_observer(Arc::new(LoopForwarder {
            tx: server_tx.clone(),
        }));

        Ok(Server {
            socket,
            directory,
            subscribers: Arc::new(RwLock::new(SubscriberTable::new(config.max_subscribers))),
            config,
            server_tx,
            server_rx,
            game_tx,
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn directory(&self) -> SessionDirectory {
        self.directory.clone()
    }

    /// Sender that can stop a running server with [`ServerMessage::Shutdown`]
    pub fn shutdown_sender(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let Some(mut game_rx) = self.game_rx.take() else {
            return;
        };

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, targets } => {
                        for addr in targets {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to push to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that drops silent peers and reaps idle sessions
    fn spawn_timeout_checker(&self) {
        let subscribers = Arc::clone(&self.subscribers);
        let directory = self.directory.clone();
        let server_tx = self.server_tx.clone();
        let idle_timeout = self.config.idle_timeout;
        let reap_interval = self.config.reap_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(reap_interval);

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut subscribers_guard = subscribers.write().await;
                    subscribers_guard.check_timeouts(idle_timeout)
                };

                for addr in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::SubscriberTimeout { addr }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }

                directory.reap_idle(idle_timeout);
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, targets: Vec<SocketAddr>) {
        if targets.is_empty() {
            return;
        }
        if let Err(e) = self
            .game_tx
            .send(GameMessage::BroadcastPacket { packet, targets })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Serves one request and builds its reply
    async fn handle_request(
        &self,
        sequence: u32,
        packet: Packet,
        addr: SocketAddr,
    ) -> Result<Packet, RemoteError> {
        match packet {
            Packet::CreateGame { name, .. } => {
                if name.trim().is_empty() {
                    return Err(RemoteError::Protocol("game name must not be empty".into()));
                }
                self.directory.create(&name)?;
                Ok(Packet::GameCreated { sequence, name })
            }

            Packet::ListGames { .. } => Ok(Packet::GameList {
                sequence,
                names: self.directory.list().into_iter().collect(),
            }),

            Packet::JoinGame {
                game, player, mark, ..
            } => {
                let session = self.directory.get(&game)?;
                let player = match mark {
                    Some(mark) => {
                        let player = GamePlayer::new(player, mark);
                        session.join(player.clone())?;
                        player
                    }
                    None => session.join_next_free(player)?,
                };

                self.subscribers
                    .write()
                    .await
                    .seat(addr, &game, player.mark);

                Ok(Packet::Joined {
                    sequence,
                    player,
                    snapshot: session.snapshot(),
                })
            }

            Packet::WatchGame { game, .. } => {
                let session = self.directory.get(&game)?;
                self.subscribers.write().await.watch(addr, &game);
                Ok(Packet::Snapshot {
                    sequence,
                    snapshot: session.snapshot(),
                })
            }

            Packet::Play { game, column, .. } => {
                let session = self.directory.get(&game)?;
                let mark = self
                    .subscribers
                    .read()
                    .await
                    .seat_of(addr, &game)
                    .ok_or_else(|| RemoteError::Protocol(format!("not seated in game {}", game)))?;

                let snapshot = session.play(mark, column)?;
                Ok(Packet::Snapshot { sequence, snapshot })
            }

            Packet::FetchSnapshot { game, .. } => {
                let session = self.directory.get(&game)?;
                Ok(Packet::Snapshot {
                    sequence,
                    snapshot: session.snapshot(),
                })
            }

            _ => Err(RemoteError::Protocol("not a request".into())),
        }
    }

    /// Processes incoming packets
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Disconnect = packet {
            self.subscribers.write().await.remove(&addr);
            return;
        }

        let Some(sequence) = packet.sequence().filter(|_| !packet.is_reply()) else {
            warn!("Unexpected packet type from client at {}", addr);
            return;
        };

        let admitted = self.subscribers.write().await.touch(addr);
        let reply = if !admitted {
            Err(RemoteError::Protocol("server full".into()))
        } else if packet.longest_name() > MAX_NAME_LEN {
            Err(RemoteError::Protocol(format!(
                "names are limited to {} bytes",
                MAX_NAME_LEN
            )))
        } else {
            self.handle_request(sequence, packet, addr).await
        };

        let reply = reply.unwrap_or_else(|error| {
            info!("Rejected request {} from {}: {}", sequence, addr, error);
            Packet::Rejected { sequence, error }
        });
        self.send_packet(reply, addr);
    }

    /// Turns a session event into pushes for its followers
    async fn handle_session_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::StateChanged { game, snapshot } => {
                let targets = self.subscribers.read().await.followers_of(&game);
                self.broadcast_packet(Packet::SnapshotPush { game, snapshot }, targets);
            }
            SessionEvent::Finished { game } => {
                let targets = self.subscribers.write().await.forget_game(&game);
                self.broadcast_packet(Packet::GameFinished { game }, targets);
            }
        }
    }

    /// Main server loop
    pub async fn run(&mut self) -> io::Result<()> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        info!("Server started successfully");

        while let Some(message) = self.server_rx.recv().await {
            match message {
                ServerMessage::PacketReceived { packet, addr } => {
                    self.handle_packet(packet, addr).await;
                }
                ServerMessage::Session(event) => {
                    self.handle_session_event(event).await;
                }
                ServerMessage::SubscriberTimeout { addr } => {
                    debug!("Peer {} timed out", addr);
                }
                ServerMessage::Shutdown => {
                    info!("Server shutting down");
                    self.directory.shutdown_all();
                    while let Ok(ServerMessage::Session(event)) = self.server_rx.try_recv() {
                        self.handle_session_event(event).await;
                    }
                    break;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use shared::{DirectoryError, PlayerMark, ValidationError};

    async fn start_server() -> (SocketAddr, SessionDirectory) {
        let mut server = Server::new("127.0.0.1:0", ServerConfig::default())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let directory = server.directory();
        tokio::spawn(async move { server.run().await });
        (addr, directory)
    }

    async fn peer() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    async fn recv(socket: &UdpSocket) -> Packet {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
            .await
            .expect("timed out waiting for packet")
            .unwrap();
        deserialize(&buffer[..len]).unwrap()
    }

    /// Sends `packet` and returns the reply with the same sequence, skipping pushes
    async fn request(socket: &UdpSocket, server: SocketAddr, packet: Packet) -> Packet {
        let sequence = packet.sequence();
        socket
            .send_to(&serialize(&packet).unwrap(), server)
            .await
            .unwrap();
        loop {
            let reply = recv(socket).await;
            if reply.is_reply() && reply.sequence() == sequence {
                return reply;
            }
        }
    }

    #[tokio::test]
    async fn test_create_and_list_games() {
        let (server, _) = start_server().await;
        let socket = peer().await;

        for (sequence, name) in [(1, "bravo"), (2, "alpha")] {
            let reply = request(
                &socket,
                server,
                Packet::CreateGame {
                    sequence,
                    name: name.to_string(),
                },
            )
            .await;
            assert!(matches!(reply, Packet::GameCreated { .. }));
        }

        let reply = request(&socket, server, Packet::ListGames { sequence: 3 }).await;
        assert_eq!(
            reply,
            Packet::GameList {
                sequence: 3,
                names: vec!["alpha".to_string(), "bravo".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected() {
        let (server, _) = start_server().await;
        let socket = peer().await;

        let create = |sequence| Packet::CreateGame {
            sequence,
            name: "alpha".to_string(),
        };
        request(&socket, server, create(1)).await;
        let reply = request(&socket, server, create(2)).await;

        assert_eq!(
            reply,
            Packet::Rejected {
                sequence: 2,
                error: DirectoryError::NameAlreadyInUse("alpha".to_string()).into(),
            }
        );
    }

    #[tokio::test]
    async fn test_empty_name_is_rejected() {
        let (server, directory) = start_server().await;
        let socket = peer().await;

        let reply = request(
            &socket,
            server,
            Packet::CreateGame {
                sequence: 1,
                name: "  ".to_string(),
            },
        )
        .await;
        assert!(matches!(
            reply,
            Packet::Rejected {
                error: RemoteError::Protocol(_),
                ..
            }
        ));
        assert!(directory.is_empty());
    }

    #[tokio::test]
    async fn test_overlong_names_are_rejected() {
        let (server, directory) = start_server().await;
        directory.create("alpha").unwrap();
        let socket = peer().await;
        let long = "n".repeat(MAX_NAME_LEN + 1);

        let create = request(
            &socket,
            server,
            Packet::CreateGame {
                sequence: 1,
                name: long.clone(),
            },
        )
        .await;
        let join = request(
            &socket,
            server,
            Packet::JoinGame {
                sequence: 2,
                game: "alpha".to_string(),
                player: long.clone(),
                mark: None,
            },
        )
        .await;

        for reply in [create, join] {
            assert!(matches!(
                reply,
                Packet::Rejected {
                    error: RemoteError::Protocol(_),
                    ..
                }
            ));
        }
        assert_eq!(directory.list().len(), 1);
        assert!(directory.get("alpha").unwrap().roster().is_empty());

        let at_limit = request(
            &socket,
            server,
            Packet::CreateGame {
                sequence: 3,
                name: "n".repeat(MAX_NAME_LEN),
            },
        )
        .await;
        assert!(matches!(at_limit, Packet::GameCreated { .. }));
    }

    #[tokio::test]
    async fn test_invalid_config_fails_to_start() {
        let empty = ServerConfig {
            rows: 0,
            ..ServerConfig::default()
        };
        let result = Server::new("127.0.0.1:0", empty).await;
        assert!(matches!(
            result,
            Err(ServerError::Config(ConfigError::EmptyBoard { rows: 0, .. }))
        ));

        let huge = ServerConfig {
            rows: 45,
            cols: 45,
            ..ServerConfig::default()
        };
        let result = Server::new("127.0.0.1:0", huge).await;
        assert!(matches!(
            result,
            Err(ServerError::Config(ConfigError::BoardTooLarge { .. }))
        ));
    }

    #[tokio::test]
    async fn test_play_requires_a_seat() {
        let (server, directory) = start_server().await;
        directory.create("alpha").unwrap();
        let socket = peer().await;

        let reply = request(
            &socket,
            server,
            Packet::Play {
                sequence: 1,
                game: "alpha".to_string(),
                column: 0,
            },
        )
        .await;
        assert!(matches!(
            reply,
            Packet::Rejected {
                error: RemoteError::Protocol(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_join_play_and_push() {
        let (server, _) = start_server().await;
        let alice = peer().await;
        let bob = peer().await;

        request(
            &alice,
            server,
            Packet::CreateGame {
                sequence: 1,
                name: "alpha".to_string(),
            },
        )
        .await;

        for (socket, name) in [(&alice, "alice"), (&bob, "bob")] {
            let reply = request(
                socket,
                server,
                Packet::JoinGame {
                    sequence: 2,
                    game: "alpha".to_string(),
                    player: name.to_string(),
                    mark: None,
                },
            )
            .await;
            assert!(matches!(reply, Packet::Joined { .. }));
        }

        // Bob moving first is out of turn
        let reply = request(
            &bob,
            server,
            Packet::Play {
                sequence: 3,
                game: "alpha".to_string(),
                column: 0,
            },
        )
        .await;
        assert_eq!(
            reply,
            Packet::Rejected {
                sequence: 3,
                error: ValidationError::NotYourTurn {
                    expected: PlayerMark::A,
                    actual: PlayerMark::B,
                }
                .into(),
            }
        );

        let reply = request(
            &alice,
            server,
            Packet::Play {
                sequence: 4,
                game: "alpha".to_string(),
                column: 3,
            },
        )
        .await;
        let Packet::Snapshot { snapshot, .. } = reply else {
            panic!("expected a snapshot, got {:?}", reply);
        };
        assert_eq!(snapshot.occupied_count(), 1);

        // Bob receives the pushed state for Alice's move
        loop {
            if let Packet::SnapshotPush { game, snapshot: pushed } = recv(&bob).await {
                if pushed.occupied_count() == 1 {
                    assert_eq!(game, "alpha");
                    assert_eq!(pushed, snapshot);
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_shutdown_finishes_sessions() {
        let mut server = Server::new("127.0.0.1:0", ServerConfig::default())
            .await
            .unwrap();
        let directory = server.directory();
        directory.create("alpha").unwrap();

        server.shutdown_sender().send(ServerMessage::Shutdown).unwrap();
        server.run().await.unwrap();

        assert!(directory.is_empty());
    }
}
