use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::types::{ClientCommand, ClientEvent};

/// Broadcast event stream type used by frontend subscribers.
pub type EventStream = broadcast::Receiver<ClientEvent>;

/// Errors returned by client channel operations.
#[derive(Debug, Error)]
pub enum ClientChannelError {
    /// The command receiver side is closed.
    #[error("command channel is closed")]
    CommandChannelClosed,
}

/// Command/event channel pair shared by the runtime and the frontend.
#[derive(Clone, Debug)]
pub struct ClientChannels {
    command_tx: mpsc::Sender<ClientCommand>,
    event_tx: broadcast::Sender<ClientEvent>,
}

impl ClientChannels {
    /// Create a channel set and return it with the command receiver.
    pub fn new(
        command_buffer: usize,
        event_buffer: usize,
    ) -> (Self, mpsc::Receiver<ClientCommand>) {
        let (command_tx, command_rx) = mpsc::channel(command_buffer.max(1));
        let (event_tx, _) = broadcast::channel(event_buffer.max(1));

        (
            Self {
                command_tx,
                event_tx,
            },
            command_rx,
        )
    }

    /// Subscribe to emitted client events.
    pub fn subscribe(&self) -> EventStream {
        self.event_tx.subscribe()
    }

    /// Send one command to the runtime.
    pub async fn send_command(&self, command: ClientCommand) -> Result<(), ClientChannelError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| ClientChannelError::CommandChannelClosed)
    }

    /// Emit an event to all subscribers.
    ///
    /// Emission is best-effort; lagged subscribers are handled by `broadcast`.
    pub fn emit(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PushConnectionState, PushStatus};

    #[tokio::test]
    async fn sends_commands_to_receiver() {
        let (channels, mut rx) = ClientChannels::new(8, 8);
        channels
            .send_command(ClientCommand::RefreshDirectory { revision: 4 })
            .await
            .expect("command send should work");

        let cmd = rx.recv().await.expect("receiver should have a command");
        assert_eq!(cmd, ClientCommand::RefreshDirectory { revision: 4 });
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_dropped() {
        let (channels, rx) = ClientChannels::new(1, 1);
        drop(rx);
        let err = channels
            .send_command(ClientCommand::Stop)
            .await
            .expect_err("closed receiver should fail the send");
        assert!(matches!(err, ClientChannelError::CommandChannelClosed));
    }

    #[tokio::test]
    async fn fans_out_events_to_subscribers() {
        let (channels, _) = ClientChannels::new(4, 16);
        let mut a = channels.subscribe();
        let mut b = channels.subscribe();

        channels.emit(ClientEvent::PushStatus(PushStatus {
            state: PushConnectionState::Connected,
            retry_in_ms: None,
        }));

        let event_a = a.recv().await.expect("subscriber a should receive event");
        let event_b = b.recv().await.expect("subscriber b should receive event");
        assert_eq!(event_a, event_b);
    }
}
