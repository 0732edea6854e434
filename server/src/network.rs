//! Server network layer handling WebSocket connections and registry startup

use crate::config::ServerConfig;
use crate::error::Result;
use crate::launcher::SessionLauncher;
use crate::participant::{Connection, ConnectionPeer, Participant, ParticipantId};
use crate::registry::{Registry, RegistryHandle};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use rand::Rng;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

const MAX_DISPLAY_NAME_CHARS: usize = 32;

/// Accepts racers over WebSocket and hands them to the matchmaking registry
pub struct Server {
    listener: TcpListener,
    registry: RegistryHandle,
    registry_task: JoinHandle<()>,
}

impl Server {
    /// Binds the listener and starts the registry actor
    ///
    /// The passage source is loaded once up front so a misconfigured server
    /// fails at startup instead of aborting every match.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let passage = config.passages.load().await?;
        info!("Passage source ready ({} chars)", passage.chars().count());

        let listener = TcpListener::bind(&config.bind_addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (registry, commands) = RegistryHandle::channel();
        let launcher = SessionLauncher::new(registry.clone(), &config);
        let registry_task =
            tokio::spawn(Registry::new(commands, launcher, config.sweep_interval).run());

        Ok(Server {
            listener,
            registry,
            registry_task,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> RegistryHandle {
        self.registry.clone()
    }

    /// Accepts connections until the registry stops
    pub async fn run(self) -> Result<()> {
        let Server {
            listener,
            registry,
            mut registry_task,
        } = self;

        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let registry = registry.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, addr, registry).await {
                                    warn!("Connection from {} ended with error: {}", addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                },

                _ = &mut registry_task => {
                    info!("Registry stopped, no longer accepting racers");
                    break;
                },
            }
        }

        Ok(())
    }
}

/// Upgrades one TCP stream and keeps it attached to its participant
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: RegistryHandle,
) -> Result<()> {
    let mut requested_name = None;
    let ws = tokio_tungstenite::accept_hdr_async(
        stream,
        |request: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
            requested_name = display_name_from_query(request.uri().query());
            Ok(response)
        },
    )
    .await?;

    let display_name = requested_name.unwrap_or_else(generated_display_name);
    let (connection, peer) = Connection::channel();
    let participant = Participant::new(ParticipantId::generate(), display_name, connection);
    let id = participant.id().clone();

    info!(
        "Racer {} ({}) connected from {}",
        id,
        participant.display_name(),
        addr
    );
    registry.add(participant)?;

    let result = pump(ws, peer).await;

    info!("Racer {} disconnected", id);
    if let Err(e) = registry.remove(id) {
        debug!("Could not deregister racer: {}", e);
    }

    result
}

/// Moves frames between the socket and the participant's queues
///
/// Returns when the socket closes or the participant's connection is dropped.
/// Both queues are dropped on return, which is how the rest of the server
/// learns the racer is gone.
async fn pump(ws: WebSocketStream<TcpStream>, peer: ConnectionPeer) -> Result<()> {
    let ConnectionPeer {
        mut outbound,
        inbound,
    } = peer;
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            message = outbound.recv() => {
                match message {
                    Some(message) => sink.send(Message::Text(message.to_json()?)).await?,
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            },

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if inbound.send(text).is_err() {
                            debug!("Dropping frame, participant is gone");
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                }
            },
        }
    }

    Ok(())
}

/// Query parameters accepted on the upgrade request
#[derive(Debug, Deserialize)]
struct ConnectQuery {
    name: Option<String>,
}

/// Reads the `name` query parameter, if present and non-blank
fn display_name_from_query(query: Option<&str>) -> Option<String> {
    let query: ConnectQuery = match serde_urlencoded::from_str(query?) {
        Ok(query) => query,
        Err(e) => {
            debug!("Ignoring unreadable query string: {}", e);
            return None;
        }
    };

    let name = query.name?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(name.chars().take(MAX_DISPLAY_NAME_CHARS).collect())
}

fn generated_display_name() -> String {
    format!("racer-{:04}", rand::thread_rng().gen_range(0..10_000))
}
