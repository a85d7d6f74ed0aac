use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

/// Port the Alpaca discovery protocol listens on.
pub const DEFAULT_DISCOVERY_PORT: u16 = 32227;

/// The exact datagram payload clients broadcast to find Alpaca servers.
const DISCOVERY_MSG: &[u8] = b"alpacadiscovery1";

/// Discovery reply body.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AlpacaPort {
    #[serde(rename = "AlpacaPort")]
    pub(crate) alpaca_port: u16,
}

/// Alpaca discovery responder configuration.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryServer {
    /// Address for the discovery responder to listen on.
    pub listen_addr: SocketAddr,
    /// Port the Alpaca HTTP server is listening on, advertised in replies.
    pub alpaca_port: u16,
}

impl DiscoveryServer {
    /// Creates a discovery responder advertising an already bound Alpaca server.
    pub const fn for_alpaca_server_at(alpaca_addr: SocketAddr) -> Self {
        Self {
            listen_addr: SocketAddr::new(alpaca_addr.ip(), DEFAULT_DISCOVERY_PORT),
            alpaca_port: alpaca_addr.port(),
        }
    }

    /// Binds the discovery socket.
    ///
    /// Split from [`BoundDiscoveryServer::start`] so callers can make sure
    /// the socket is bound successfully before entering the infinite loop.
    #[tracing::instrument(level = "debug")]
    pub async fn bind(self) -> eyre::Result<BoundDiscoveryServer> {
        let socket = socket2::Socket::new(
            socket2::Domain::for_address(self.listen_addr),
            socket2::Type::DGRAM,
            Some(socket2::Protocol::UDP),
        )?;
        socket.set_reuse_address(true)?;
        // Clients send to the IPv4 broadcast address.
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&self.listen_addr.into())?;

        let socket = UdpSocket::from_std(socket.into())?;
        tracing::debug!(addr = %socket.local_addr()?, "Bound Alpaca discovery responder");

        Ok(BoundDiscoveryServer {
            socket,
            response_msg: serde_json::to_string(&AlpacaPort {
                alpaca_port: self.alpaca_port,
            })?,
        })
    }
}

/// Discovery responder bound to a local socket.
#[derive(Debug)]
pub struct BoundDiscoveryServer {
    socket: UdpSocket,
    response_msg: String,
}

impl BoundDiscoveryServer {
    /// The bound listen address.
    pub fn listen_addr(&self) -> eyre::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Answers discovery datagrams until `shutdown` fires.
    #[tracing::instrument(name = "alpaca_discovery_loop", level = "debug", skip_all)]
    pub async fn start(self, shutdown: CancellationToken) {
        // One extra byte lets an overlong packet fail the comparison.
        let mut buf = [0_u8; DISCOVERY_MSG.len() + 1];
        loop {
            let recv = tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::debug!("Discovery responder stopping");
                    return;
                }
                recv = self.socket.recv_from(&mut buf) => recv,
            };
            let result = async {
                let (len, src) = recv?;
                if &buf[..len] == DISCOVERY_MSG {
                    tracing::trace!(%src, "Received Alpaca discovery request");
                    let _ = self
                        .socket
                        .send_to(self.response_msg.as_bytes(), src)
                        .await?;
                } else {
                    tracing::warn!(%src, "Received unknown packet");
                }
                Ok::<_, std::io::Error>(())
            }
            .await;
            if let Err(err) = result {
                tracing::error!(%err, "Error while handling a discovery request");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn answers_discovery_datagrams_with_alpaca_port() {
        let server = DiscoveryServer {
            listen_addr: (Ipv4Addr::LOCALHOST, 0).into(),
            alpaca_port: 11111,
        }
        .bind()
        .await
        .unwrap();
        let server_addr = server.listen_addr().unwrap();

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(server.start(shutdown.clone()));

        let client = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        client
            .send_to(b"alpacadiscovery1", server_addr)
            .await
            .unwrap();

        let mut buf = [0_u8; 64];
        let (len, _) = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            client.recv_from(&mut buf),
        )
        .await
        .unwrap()
        .unwrap();
        let reply: AlpacaPort = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(reply.alpaca_port, 11111);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn ignores_unrelated_datagrams() {
        let server = DiscoveryServer {
            listen_addr: (Ipv4Addr::LOCALHOST, 0).into(),
            alpaca_port: 7843,
        }
        .bind()
        .await
        .unwrap();
        let server_addr = server.listen_addr().unwrap();

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(server.start(shutdown.clone()));

        let client = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        client.send_to(b"hello", server_addr).await.unwrap();
        client
            .send_to(b"alpacadiscovery1extra", server_addr)
            .await
            .unwrap();
        // Only a valid request earns a reply.
        client
            .send_to(b"alpacadiscovery1", server_addr)
            .await
            .unwrap();

        let mut buf = [0_u8; 64];
        let (len, _) = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            client.recv_from(&mut buf),
        )
        .await
        .unwrap()
        .unwrap();
        let reply: AlpacaPort = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(reply.alpaca_port, 7843);

        shutdown.cancel();
        task.await.unwrap();
    }
}
