//! Async server loop.
//!
//! `Server::spawn` moves a `Hub` onto a tokio task that serializes every
//! connection command and every store change through one loop. Transports
//! talk to it through a cloneable `ServerHandle`.

use crate::hub::{FrameReceiver, Hub};
use strand_core::{ConnectionId, Error, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

enum Command {
    Open {
        user_id: Option<String>,
        reply: oneshot::Sender<(ConnectionId, FrameReceiver)>,
    },
    Frame {
        connection: ConnectionId,
        frame: String,
    },
    Close {
        connection: ConnectionId,
    },
}

/// A hub waiting to be spawned.
#[derive(Debug)]
pub struct Server {
    hub: Hub,
}

impl Server {
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }

    /// Runs the hub on a new task.
    pub fn spawn(self) -> ServerHandle {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(self.hub, rx));
        ServerHandle { commands, task }
    }
}

async fn run(mut hub: Hub, mut commands: mpsc::UnboundedReceiver<Command>) {
    tracing::info!("server loop started");
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => dispatch(&mut hub, command),
                None => break,
            },
            Some(change) = hub.next_change() => {
                hub.apply_change(&change);
                hub.pump();
            }
        }
    }
    tracing::info!("server loop stopped");
}

fn dispatch(hub: &mut Hub, command: Command) {
    match command {
        Command::Open { user_id, reply } => {
            let (connection, frames) = hub.open(user_id);
            if reply.send((connection, frames)).is_err() {
                hub.close(connection);
            }
        }
        Command::Frame { connection, frame } => {
            // Violations are answered and logged by the hub itself.
            if let Err(error) = hub.handle_frame(connection, &frame) {
                tracing::debug!(%connection, %error, "frame rejected");
            }
        }
        Command::Close { connection } => hub.close(connection),
    }
}

/// Handle to a running server.
#[derive(Debug)]
pub struct ServerHandle {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Opens a connection for an optional authenticated user.
    pub async fn connect(&self, user_id: Option<String>) -> Result<ClientLink> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Open { user_id, reply })
            .map_err(|_| Error::ConnectionLost)?;
        let (connection, inbound) = rx.await.map_err(|_| Error::ConnectionLost)?;
        Ok(ClientLink {
            connection,
            commands: self.commands.clone(),
            inbound,
        })
    }

    /// Stops the server loop.
    pub async fn shutdown(self) {
        self.task.abort();
        // A cancelled task reports a JoinError.
        let _ = self.task.await;
    }
}

/// One connection's frame pipe. Dropping it closes the connection.
#[derive(Debug)]
pub struct ClientLink {
    connection: ConnectionId,
    commands: mpsc::UnboundedSender<Command>,
    inbound: FrameReceiver,
}

impl ClientLink {
    #[inline]
    pub fn id(&self) -> ConnectionId {
        self.connection
    }

    /// Sends one text frame to the server.
    pub fn send(&self, frame: impl Into<String>) -> Result<()> {
        self.commands
            .send(Command::Frame {
                connection: self.connection,
                frame: frame.into(),
            })
            .map_err(|_| Error::ConnectionLost)
    }

    /// Waits for the next frame. `None` once the server closed the link.
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    /// Returns a frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.inbound.try_recv().ok()
    }
}

impl Drop for ClientLink {
    fn drop(&mut self) {
        // The server may already be gone.
        let _ = self.commands.send(Command::Close {
            connection: self.connection,
        });
    }
}
