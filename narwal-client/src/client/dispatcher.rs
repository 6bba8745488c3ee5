//! Command dispatch and response correlation.
//!
//! Responses carry no correlation id; the response marker is the only thing
//! distinguishing them from broadcasts on the same socket. Commands are
//! therefore serialized by a mutex and matched to the next response frame.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use log::debug;
use tokio_tungstenite::tungstenite::Message;

use narwal_protocol::frame::{parse_frame, Frame};
use narwal_protocol::pb::PbMessage;

use crate::error::{ClientError, Result};
use crate::models::CommandResponse;

use super::ClientInner;

/// Send a command frame and await its correlated response.
///
/// Stale responses left over from a previously timed-out command are drained
/// before sending. With the listener running, the response arrives through
/// the queue; without one, this reads the socket directly, applying any
/// broadcasts it encounters on the way so state updates are not dropped.
pub(crate) async fn send_command(
    inner: &Arc<ClientInner>,
    short_topic: &str,
    payload: &[u8],
    timeout: Duration,
) -> Result<CommandResponse> {
    if !inner.is_connected() {
        return Err(ClientError::NotConnected);
    }

    let _in_flight = inner.command_lock.lock().await;

    {
        let mut rx = inner.response_rx.lock().await;
        while rx.try_recv().is_ok() {
            debug!("Drained a stale queued response");
        }
    }

    inner.send_frame(short_topic, payload).await?;
    debug!("Sent command: {short_topic} ({} payload bytes)", payload.len());

    let frame = if inner.listener_active.load(Ordering::SeqCst) {
        await_queued_response(inner, short_topic, timeout).await?
    } else {
        read_response_directly(inner, short_topic, timeout).await?
    };

    let data = match PbMessage::decode(&frame.payload) {
        Ok(msg) => msg,
        Err(e) => {
            debug!("Undecodable response payload for {short_topic}: {e}");
            PbMessage::default()
        }
    };
    Ok(CommandResponse::from_payload(data, frame.payload))
}

async fn await_queued_response(
    inner: &Arc<ClientInner>,
    short_topic: &str,
    timeout: Duration,
) -> Result<Frame> {
    let mut rx = inner.response_rx.lock().await;
    match tokio::time::timeout(timeout, rx.recv()).await {
        Ok(Some(frame)) => Ok(frame),
        Ok(None) => Err(ClientError::NotConnected),
        Err(_) => Err(ClientError::CommandTimeout {
            topic: short_topic.to_string(),
            timeout,
        }),
    }
}

/// Bounded direct read used when no listener holds the socket. Broadcast
/// frames encountered while waiting still go through the reconciler.
async fn read_response_directly(
    inner: &Arc<ClientInner>,
    short_topic: &str,
    timeout: Duration,
) -> Result<Frame> {
    let deadline = Instant::now() + timeout;
    let mut guard = inner.reader.lock().await;
    let Some(stream) = guard.as_mut() else {
        return Err(ClientError::NotConnected);
    };

    while Instant::now() < deadline {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let next = tokio::time::timeout(remaining.min(Duration::from_secs(1)), stream.next()).await;

        let data = match next {
            Err(_) => continue,
            Ok(Some(Ok(Message::Binary(data)))) => data,
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) => return Err(ClientError::NotConnected),
        };

        let frame = match parse_frame(&data) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Dropping unparseable frame: {e}");
                continue;
            }
        };

        if frame.is_response() {
            return Ok(frame);
        }
        inner.apply_broadcast_frame(&frame);
    }

    Err(ClientError::CommandTimeout {
        topic: short_topic.to_string(),
        timeout,
    })
}
