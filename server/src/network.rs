//! Server network layer handling UDP communications and tick loop coordination
//!
//! The receiver task decodes datagrams. Commands from logged-in addresses go
//! straight into the owning player's intake queue; logins and disconnects are
//! forwarded to the main loop, which is the only place the world is touched.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::intake::CommandSender;
use crate::transport::UdpTransport;
use crate::utils::get_timestamp;
use crate::world::World;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ClientPacket, ServerPacket, SessionId, CLIENT_VERSION};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: ClientPacket,
        addr: SocketAddr,
    },
    Shutdown,
}

/// Messages sent from the tick loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: ServerPacket,
        addr: SocketAddr,
    },
    /// Stop routing commands from this address
    ///
    /// With a session id, only a route owned by that session is closed.
    CloseRoute {
        addr: SocketAddr,
        session_id: Option<SessionId>,
    },
}

/// Where commands arriving from one address are delivered
#[derive(Debug, Clone)]
struct Route {
    session_id: SessionId,
    commands: CommandSender,
}

type Routes = Arc<RwLock<HashMap<SocketAddr, Route>>>;

/// Main server coordinating networking and the world tick
pub struct Server {
    socket: Arc<UdpSocket>,
    routes: Routes,
    world: World,
    tick_duration: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, ServerError> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let tick_duration = config.tick_duration;

        Ok(Server {
            socket,
            routes: Arc::new(RwLock::new(HashMap::new())),
            world: World::new(config),
            tick_duration,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let routes = Arc::clone(&self.routes);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        let packet = match deserialize::<ClientPacket>(&buffer[0..len]) {
                            Ok(packet) => packet,
                            Err(_) => {
                                warn!("Failed to deserialize packet from {}", addr);
                                continue;
                            }
                        };

                        if let ClientPacket::Command(command) = packet {
                            let route = routes.read().await.get(&addr).cloned();
                            match route {
                                Some(route) => {
                                    route.commands.enqueue(command, get_timestamp());
                                }
                                None => debug!("Command from unknown address {}", addr),
                            }
                            continue;
                        }

                        if let Err(e) =
                            server_tx.send(ServerMessage::PacketReceived { packet, addr })
                        {
                            error!("Failed to send packet to main loop: {}", e);
                            break;
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
        let routes = Arc::clone(&self.routes);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::CloseRoute { addr, session_id } => {
                        let mut routes = routes.write().await;
                        let owned = routes.get(&addr).is_some_and(|route| {
                            session_id.map_or(true, |id| id == route.session_id)
                        });
                        if owned {
                            routes.remove(&addr);
                            debug!("Closed route {}", addr);
                        }
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &ServerPacket,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: ServerPacket, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Handles logins and disconnects forwarded by the receiver task
    async fn handle_packet(&mut self, packet: ClientPacket, addr: SocketAddr) {
        match packet {
            ClientPacket::Login {
                client_version,
                display_name,
            } => {
                info!(
                    "Login request from {} for {} (version: {})",
                    addr, display_name, client_version
                );

                if client_version != CLIENT_VERSION {
                    let reason = ServerError::UnsupportedVersion(client_version).to_string();
                    self.send_packet(ServerPacket::LoginRejected { reason }, addr);
                    return;
                }

                // Held across the login: a command sent as soon as the
                // acceptance arrives waits here for its route.
                let routes = Arc::clone(&self.routes);
                let mut routes = routes.write().await;

                if let Some(existing) = routes.get(&addr) {
                    warn!(
                        "Ignoring login from {}, already routed to session {}",
                        addr, existing.session_id
                    );
                    self.send_packet(
                        ServerPacket::LoginRejected {
                            reason: "Already logged in from this address".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                let transport = Arc::new(UdpTransport::new(addr, self.game_tx.clone()));
                match self.world.login(&display_name, transport, get_timestamp()) {
                    Ok(session_id) => {
                        if let Some(player) = self.world.players().get(session_id) {
                            routes.insert(
                                addr,
                                Route {
                                    session_id,
                                    commands: player.command_sender(),
                                },
                            );
                        }
                    }
                    Err(e) => {
                        warn!("Rejected login for {} from {}: {}", display_name, addr, e);
                        self.send_packet(
                            ServerPacket::LoginRejected {
                                reason: e.to_string(),
                            },
                            addr,
                        );
                    }
                }
            }

            ClientPacket::Disconnect => {
                let route = self.routes.write().await.remove(&addr);
                if let Some(route) = route {
                    info!("Session {} disconnected from {}", route.session_id, addr);
                    self.world.queue_logout(route.session_id);
                }
            }

            ClientPacket::Command(_) => {
                warn!("Command from {} reached the main loop", addr);
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.spawn_network_receiver();
        self.spawn_network_sender();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    let report = self.world.tick(get_timestamp());

                    if report.tick % 100 == 0 && !self.world.players().is_empty() {
                        debug!(
                            "Tick {}: {} players, {} npcs, {} entities ticked",
                            report.tick,
                            self.world.players().len(),
                            self.world.npcs().len(),
                            report.entities_ticked
                        );
                    }
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down gracefully...");
                    break;
                }
            }
        }

        let logged_out = self.world.logout_all();
        info!("Logged out {} players", logged_out);
        Ok(())
    }

    /// Returns a handle that can stop the main loop
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Command;
    use std::net::{IpAddr, Ipv4Addr};

    fn test_config() -> ServerConfig {
        ServerConfig {
            tick_duration: Duration::from_millis(20),
            ..ServerConfig::default()
        }
    }

    async fn recv_packet(socket: &UdpSocket) -> ServerPacket {
        let mut buf = [0u8; 2048];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("timed out waiting for server")
            .unwrap();
        deserialize(&buf[..len]).unwrap()
    }

    #[test]
    fn test_server_message_creation() {
        let packet = ClientPacket::Disconnect;
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 43594);

        let msg = ServerMessage::PacketReceived { packet, addr };

        match msg {
            ServerMessage::PacketReceived { packet: p, addr: a } => {
                assert_eq!(a, addr);
                assert!(matches!(p, ClientPacket::Disconnect));
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[tokio::test]
    async fn test_login_and_welcome_over_udp() {
        let mut server = Server::new("127.0.0.1:0", test_config()).await.unwrap();
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let login = ClientPacket::Login {
            client_version: CLIENT_VERSION,
            display_name: "alice".to_string(),
        };
        client
            .send_to(&serialize(&login).unwrap(), server_addr)
            .await
            .unwrap();

        match recv_packet(&client).await {
            ServerPacket::LoginAccepted { session_id, .. } => assert_eq!(session_id, 1),
            other => panic!("Unexpected packet: {:?}", other),
        }
        match recv_packet(&client).await {
            ServerPacket::GameMessage { text } => assert_eq!(text, shared::WELCOME_MESSAGE),
            other => panic!("Unexpected packet: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wrong_version_is_rejected() {
        let mut server = Server::new("127.0.0.1:0", test_config()).await.unwrap();
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let login = ClientPacket::Login {
            client_version: CLIENT_VERSION + 1,
            display_name: "alice".to_string(),
        };
        client
            .send_to(&serialize(&login).unwrap(), server_addr)
            .await
            .unwrap();

        assert!(matches!(
            recv_packet(&client).await,
            ServerPacket::LoginRejected { .. }
        ));
    }

    #[tokio::test]
    async fn test_command_right_after_acceptance_is_queued() {
        let mut server = Server::new("127.0.0.1:0", test_config()).await.unwrap();
        let server_addr = server.local_addr().unwrap();
        server.spawn_network_receiver();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client_addr = client.local_addr().unwrap();
        let login = ClientPacket::Login {
            client_version: CLIENT_VERSION,
            display_name: "frank".to_string(),
        };
        server.handle_packet(login, client_addr).await;

        // Acceptance is queued for the sender task, which is not running here
        assert!(matches!(
            server.game_rx.try_recv(),
            Ok(GameMessage::SendPacket {
                packet: ServerPacket::LoginAccepted { session_id: 1, .. },
                ..
            })
        ));

        let heartbeat = ClientPacket::Command(Command::Heartbeat);
        client
            .send_to(&serialize(&heartbeat).unwrap(), server_addr)
            .await
            .unwrap();

        for _ in 0..200 {
            if server.world().players().get(1).unwrap().pending_commands() == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("heartbeat sent after the acceptance never reached the intake queue");
    }

    #[tokio::test]
    async fn test_second_login_from_same_address_is_rejected() {
        let mut server = Server::new("127.0.0.1:0", test_config()).await.unwrap();
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let login = |name: &str| {
            serialize(&ClientPacket::Login {
                client_version: CLIENT_VERSION,
                display_name: name.to_string(),
            })
            .unwrap()
        };

        client.send_to(&login("dave"), server_addr).await.unwrap();
        assert!(matches!(
            recv_packet(&client).await,
            ServerPacket::LoginAccepted { .. }
        ));

        client.send_to(&login("erin"), server_addr).await.unwrap();
        loop {
            match recv_packet(&client).await {
                ServerPacket::LoginRejected { reason } => {
                    assert!(reason.contains("this address"));
                    break;
                }
                ServerPacket::LoginAccepted { .. } => panic!("second login was accepted"),
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn test_logout_command_closes_connection() {
        let mut server = Server::new("127.0.0.1:0", test_config()).await.unwrap();
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let login = ClientPacket::Login {
            client_version: CLIENT_VERSION,
            display_name: "bob".to_string(),
        };
        client
            .send_to(&serialize(&login).unwrap(), server_addr)
            .await
            .unwrap();
        assert!(matches!(
            recv_packet(&client).await,
            ServerPacket::LoginAccepted { .. }
        ));

        let logout = ClientPacket::Command(Command::Logout);
        client
            .send_to(&serialize(&logout).unwrap(), server_addr)
            .await
            .unwrap();

        loop {
            if let ServerPacket::Disconnected { reason } = recv_packet(&client).await {
                assert_eq!(reason, "Logged out");
                break;
            }
        }
    }
}
