use futures_util::StreamExt;
use inbox_core::{
    ClientChannels, ClientError, ClientEvent, PushEvent, PushStateMachine, PushStatus,
    ReconnectPolicy,
};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

/// Decode one push text frame. Malformed frames are logged and dropped.
pub fn decode_frame(text: &str) -> Option<PushEvent> {
    match serde_json::from_str::<PushEvent>(text) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(error = %err, "dropping malformed push frame");
            None
        }
    }
}

enum ConnectionEnd {
    Cancelled,
    Dropped(String),
}

/// Run the push loop until `stop` is cancelled.
///
/// Every drop, clean or not, is followed by a reconnect after the policy's
/// fixed delay. Frames are emitted in arrival order; nothing is buffered while
/// disconnected.
pub async fn run_push_loop(
    url: Url,
    policy: ReconnectPolicy,
    channels: ClientChannels,
    stop: CancellationToken,
) {
    let mut machine = PushStateMachine::default();

    loop {
        emit_status(&channels, machine.on_connecting());

        let end = tokio::select! {
            _ = stop.cancelled() => ConnectionEnd::Cancelled,
            end = connect_and_read(&url, &channels, &mut machine, &stop) => end,
        };

        let reason = match end {
            ConnectionEnd::Cancelled => break,
            ConnectionEnd::Dropped(reason) => reason,
        };

        let delay = policy.delay_for_attempt(machine.attempts().saturating_add(1));
        emit_status(
            &channels,
            machine.on_disconnected(delay.as_millis() as u64),
        );
        info!(
            %reason,
            retry_in_ms = delay.as_millis() as u64,
            attempt = machine.attempts(),
            "push channel disconnected"
        );

        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    channels.emit(ClientEvent::PushStatus(machine.on_stopped()));
    debug!("push loop stopped");
}

async fn connect_and_read(
    url: &Url,
    channels: &ClientChannels,
    machine: &mut PushStateMachine,
    stop: &CancellationToken,
) -> ConnectionEnd {
    let (mut stream, _) = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok(connected) => connected,
        Err(err) => return ConnectionEnd::Dropped(format!("connect failed: {err}")),
    };
    emit_status(channels, machine.on_connected());
    info!(%url, "push channel connected");

    loop {
        let frame = tokio::select! {
            _ = stop.cancelled() => return ConnectionEnd::Cancelled,
            frame = stream.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(text))) => {
                if let Some(event) = decode_frame(text.as_str()) {
                    trace!(kind = event.kind(), "push event received");
                    channels.emit(ClientEvent::Push(event));
                }
            }
            Some(Ok(Message::Close(_))) | None => {
                return ConnectionEnd::Dropped("connection closed".to_owned());
            }
            Some(Err(err)) => return ConnectionEnd::Dropped(format!("read error: {err}")),
            Some(Ok(_)) => continue,
        }
    }
}

fn emit_status(channels: &ClientChannels, status: Result<PushStatus, ClientError>) {
    match status {
        Ok(status) => channels.emit(ClientEvent::PushStatus(status)),
        Err(err) => warn!(error = %err, "unexpected push state transition"),
    }
}
