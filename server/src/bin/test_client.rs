use bincode::{deserialize, serialize};
use shared::{ClientPacket, Command, ServerPacket, CLIENT_VERSION, DEFAULT_LOCATION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

async fn send(
    socket: &UdpSocket,
    packet: &ClientPacket,
    server_addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = serialize(packet)?;
    println!("Sending: {:?}", packet);
    socket.send_to(&data, server_addr).await?;
    Ok(())
}

/// Prints every packet the server sends until `wait` passes without one
async fn drain_responses(socket: &UdpSocket, wait: Duration) -> Vec<ServerPacket> {
    let mut buf = [0u8; 2048];
    let mut received = Vec::new();

    while let Ok(Ok((len, _))) = timeout(wait, socket.recv_from(&mut buf)).await {
        match deserialize::<ServerPacket>(&buf[0..len]) {
            Ok(packet) => {
                println!("Received: {:?}", packet);
                received.push(packet);
            }
            Err(e) => println!("Failed to deserialize response: {}", e),
        }
    }
    received
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let name = std::env::args().nth(1).unwrap_or_else(|| "bot".to_string());
    let server_addr = std::env::args()
        .nth(2)
        .unwrap_or_else(|| "127.0.0.1:43594".to_string())
        .parse::<SocketAddr>()?;

    // Create local socket
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let login = ClientPacket::Login {
        client_version: CLIENT_VERSION,
        display_name: name.clone(),
    };
    send(&socket, &login, server_addr).await?;

    let responses = drain_responses(&socket, Duration::from_secs(2)).await;
    let accepted = responses
        .iter()
        .any(|packet| matches!(packet, ServerPacket::LoginAccepted { .. }));
    if !accepted {
        println!("Login was not accepted, giving up");
        return Ok(());
    }

    // Walk a small square around the spawn point
    let square = [(3, 0), (3, 3), (0, 3), (0, 0)];
    for (dx, dz) in square {
        let walk = ClientPacket::Command(Command::Walk {
            x: DEFAULT_LOCATION.x + dx,
            z: DEFAULT_LOCATION.z + dz,
        });
        send(&socket, &walk, server_addr).await?;
        drain_responses(&socket, Duration::from_millis(700)).await;
    }

    let yell = ClientPacket::Command(Command::Yell {
        message: format!("{} says hello", name),
    });
    send(&socket, &yell, server_addr).await?;
    // The second yell should hit the cooldown
    send(&socket, &yell, server_addr).await?;
    drain_responses(&socket, Duration::from_secs(1)).await;

    send(&socket, &ClientPacket::Command(Command::Heartbeat), server_addr).await?;
    sleep(Duration::from_millis(600)).await;

    send(&socket, &ClientPacket::Command(Command::Logout), server_addr).await?;
    drain_responses(&socket, Duration::from_secs(2)).await;

    println!("Test client finished");
    Ok(())
}
