//! Socket writer and heartbeat tasks.

use crate::state::GatewaySession;
use futures::{Sink, SinkExt};
use parking_lot::Mutex;
use qqbot_core::DispatchFrame;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Shortest cadence the ticker accepts.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Send an op 1 every `interval`, first one after a full interval.
pub(crate) fn spawn_heartbeat(
    interval: Duration,
    session: Arc<Mutex<GatewaySession>>,
    outbound: mpsc::UnboundedSender<DispatchFrame>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let interval = interval.max(MIN_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let seq = session.lock().last_seq;
                    debug!("Sending heartbeat (seq {:?})", seq);
                    if outbound.send(DispatchFrame::heartbeat(seq)).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Drain `outbound` into the socket. Sends a close frame on cancellation.
pub(crate) fn spawn_writer<S>(
    mut sink: S,
    mut outbound: mpsc::UnboundedReceiver<DispatchFrame>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    S: Sink<Message, Error = WsError> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    if let Err(e) = sink.send(Message::Text(frame.encode())).await {
                        debug!("Gateway write failed: {}", e);
                        break;
                    }
                }
            }
        }
    })
}
