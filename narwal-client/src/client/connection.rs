//! WebSocket connection management: connect, listener with reconnect
//! backoff, heartbeat, keepalive, wake, and device discovery.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use rand::Rng;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use narwal_protocol::frame::{build_frame, parse_frame};
use narwal_protocol::pb::PbMessage;
use narwal_protocol::types::{
    RECONNECT_BACKOFF_FACTOR, RECONNECT_INITIAL_DELAY, RECONNECT_MAX_DELAY, HEARTBEAT_INTERVAL,
    KEEPALIVE_INTERVAL, TOPIC_CMD_APP_HEARTBEAT, TOPIC_CMD_GET_DEVICE_INFO,
};

use crate::error::{ClientError, Result};
use crate::wake;

use super::ClientInner;

/// Establish the WebSocket connection and store the split halves.
pub(crate) async fn connect(inner: &Arc<ClientInner>) -> Result<()> {
    let url = inner.config.url();
    let connected = tokio::time::timeout(inner.config.connect_timeout, connect_async(&url))
        .await
        .map_err(|_| ClientError::Connection(format!("timed out connecting to {url}")))?;
    let (ws, _) = connected.map_err(|e| ClientError::Connection(format!("{url}: {e}")))?;

    let (sink, stream) = ws.split();
    *inner.writer.lock().await = Some(sink);
    *inner.reader.lock().await = Some(stream);
    inner.connected.store(true, Ordering::SeqCst);
    info!("Connected to Narwal vacuum at {url}");
    Ok(())
}

/// Tear everything down. Idempotent; the only path to a terminal stop.
pub(crate) async fn disconnect(inner: &Arc<ClientInner>) {
    inner.should_reconnect.store(false, Ordering::SeqCst);
    inner.listener_active.store(false, Ordering::SeqCst);
    inner.connected.store(false, Ordering::SeqCst);
    inner.shared.lock().reconciler.mark_asleep();
    inner.abort_subtasks();

    if let Some(mut sink) = inner.writer.lock().await.take() {
        let _ = sink.close().await;
    }
    inner.reader.lock().await.take();
    info!("Disconnected from Narwal vacuum");
}

/// The persistent listener loop with auto-reconnect.
///
/// Each round: ensure connectivity, spawn heartbeat and keepalive, then read
/// frames until the transport fails. On failure the sub-tasks are torn down
/// and the loop sleeps with exponential backoff plus jitter before retrying;
/// a disconnect exits immediately.
pub(crate) async fn run_listener(inner: &Arc<ClientInner>) {
    inner.should_reconnect.store(true, Ordering::SeqCst);
    let mut delay = RECONNECT_INITIAL_DELAY;

    loop {
        if !inner.is_connected() {
            if let Err(e) = connect(inner).await {
                warn!("Connection failed: {e}");
            }
        }

        if inner.is_connected() {
            delay = RECONNECT_INITIAL_DELAY;
            {
                let mut subtasks = inner.subtasks.lock();
                subtasks.push(tokio::spawn(heartbeat_loop(Arc::clone(inner))));
                subtasks.push(tokio::spawn(keepalive_loop(Arc::clone(inner))));
            }
            inner.listener_active.store(true, Ordering::SeqCst);

            let result = read_loop(inner).await;

            inner.listener_active.store(false, Ordering::SeqCst);
            inner.connected.store(false, Ordering::SeqCst);
            inner.shared.lock().reconciler.mark_asleep();
            inner.abort_subtasks();

            match result {
                Ok(()) => info!("Connection closed by robot"),
                Err(e) => warn!("Connection lost: {e}"),
            }
        }

        if !inner.should_reconnect.load(Ordering::SeqCst) {
            break;
        }

        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..1000));
        let wait = delay + jitter;
        info!("Reconnecting in {:.1}s", wait.as_secs_f64());
        tokio::time::sleep(wait).await;
        if !inner.should_reconnect.load(Ordering::SeqCst) {
            break;
        }
        delay = delay.mul_f64(RECONNECT_BACKOFF_FACTOR).min(RECONNECT_MAX_DELAY);
    }
}

/// Read frames until the stream ends or errors. The reader lock is taken per
/// message so a shutdown can reclaim the half.
async fn read_loop(inner: &Arc<ClientInner>) -> Result<()> {
    loop {
        let next = {
            let mut guard = inner.reader.lock().await;
            let Some(stream) = guard.as_mut() else {
                return Ok(());
            };
            stream.next().await
        };

        match next {
            Some(Ok(Message::Binary(data))) => inner.handle_frame(&data),
            Some(Ok(Message::Close(_))) | None => return Ok(()),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

/// Periodic transport-level ping. Failure is logged, not escalated: the
/// listener's read failure is the real signal.
async fn heartbeat_loop(inner: Arc<ClientInner>) {
    loop {
        tokio::time::sleep(HEARTBEAT_INTERVAL).await;
        if !inner.is_connected() {
            return;
        }
        let mut guard = inner.writer.lock().await;
        let Some(sink) = guard.as_mut() else {
            return;
        };
        if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
            debug!("Heartbeat ping failed: {e}");
            return;
        }
        debug!("Heartbeat ping sent");
    }
}

/// Keep the robot from going back to sleep.
///
/// Every interval: first check whether broadcasts have gone stale (the robot
/// fell asleep despite us), then either send a cheap app heartbeat while it
/// is awake or a full wake burst while it sleeps.
async fn keepalive_loop(inner: Arc<ClientInner>) {
    loop {
        tokio::time::sleep(KEEPALIVE_INTERVAL).await;
        if !inner.is_connected() {
            return;
        }

        let awake = {
            let mut shared = inner.shared.lock();
            shared.reconciler.check_broadcast_stale(Instant::now());
            shared.reconciler.is_awake()
        };

        if awake {
            if inner
                .send_frame(TOPIC_CMD_APP_HEARTBEAT, &wake::heartbeat_payload())
                .await
                .is_err()
            {
                debug!("Keepalive send failed");
                return;
            }
            debug!("Keepalive heartbeat sent");
        } else {
            debug!("Robot not awake, sending wake burst");
            send_wake_burst(&inner).await;
        }
    }
}

/// Fire-and-forget the ordered wake burst; responses, if any, flow through
/// the normal listener path.
pub(crate) async fn send_wake_burst(inner: &ClientInner) {
    for (short_topic, payload) in wake::wake_commands() {
        if let Err(e) = inner.send_frame(short_topic, &payload).await {
            debug!("Wake burst: failed to send {short_topic}: {e}");
            return;
        }
        debug!("Wake burst: sent {short_topic} ({} bytes)", payload.len());
        tokio::time::sleep(wake::BURST_FRAME_DELAY).await;
    }
}

/// Repeat wake bursts until the robot broadcasts or the deadline passes.
/// Never raises on mere non-response; a failed wake mutates no state.
pub(crate) async fn wake(inner: &Arc<ClientInner>, timeout: Duration) -> Result<bool> {
    if inner.shared.lock().reconciler.is_awake() {
        return Ok(true);
    }
    if !inner.is_connected() {
        return Err(ClientError::NotConnected);
    }

    info!("Attempting to wake robot");
    let deadline = Instant::now() + timeout;
    let mut attempt = 0u32;

    while Instant::now() < deadline {
        attempt += 1;
        debug!("Wake attempt {attempt}");
        send_wake_burst(inner).await;

        // Give each burst a few seconds to produce a broadcast.
        let wait_end = (Instant::now() + Duration::from_secs(5)).min(deadline);
        while Instant::now() < wait_end {
            if inner.shared.lock().reconciler.is_awake() {
                info!("Robot woke up after {attempt} attempt(s)");
                return Ok(true);
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
    }

    warn!("Robot did not wake within {timeout:?} ({attempt} attempts)");
    Ok(false)
}

/// Resolve the device id by waking the robot and reading its traffic.
///
/// Sends get_device_info both under the configured prefix and as a bare
/// `//topic` (the server processes commands regardless of the device id in
/// the topic), re-sending on silence while cycling variants. The id comes
/// from field 2 of a direct response, or from the topic of any broadcast,
/// which also yields the real addressing prefix.
pub(crate) async fn discover_device_id(
    inner: &Arc<ClientInner>,
    timeout: Duration,
) -> Result<String> {
    if !inner.is_connected() {
        return Err(ClientError::NotConnected);
    }

    let cmd = TOPIC_CMD_GET_DEVICE_INFO;
    let wake_frames = vec![
        build_frame(&inner.full_topic(cmd), b"", None)?,
        build_frame(&format!("//{cmd}"), b"", None)?,
    ];
    for frame in &wake_frames {
        if let Err(e) = inner.send_raw_bytes(frame.clone()).await {
            warn!("Failed to send discovery wake command: {e}");
        }
    }
    debug!("Sent discovery wake commands");

    let deadline = Instant::now() + timeout;
    let mut variant = 0usize;

    while Instant::now() < deadline {
        let remaining = deadline.saturating_duration_since(Instant::now());
        // The reader lock is bounded per read so a concurrent disconnect
        // can reclaim the half instead of waiting out the deadline.
        let next = {
            let mut guard = inner.reader.lock().await;
            let Some(stream) = guard.as_mut() else {
                return Err(ClientError::NotConnected);
            };
            tokio::time::timeout(remaining.min(Duration::from_secs(2)), stream.next()).await
        };

        let message = match next {
            Err(_) => {
                // Silence: re-send, cycling through prefix variants.
                let frame = wake_frames[variant % wake_frames.len()].clone();
                variant += 1;
                let _ = inner.send_raw_bytes(frame).await;
                debug!("Re-sent discovery wake command (variant {variant})");
                continue;
            }
            Ok(message) => message,
        };

        let data = match message {
            Some(Ok(Message::Binary(data))) => data,
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(ClientError::Connection(
                    "connection closed during discovery".into(),
                ))
            }
        };

        let Ok(frame) = parse_frame(&data) else {
            continue;
        };

        if frame.is_response() {
            // get_device_info returns the device id in field 2.
            if let Ok(msg) = PbMessage::decode(&frame.payload) {
                if let Some(id) = msg.str_field(2) {
                    let id = id.trim().to_string();
                    if !id.is_empty() {
                        info!("Discovered device id from response: {id}");
                        *inner.device_id.lock() = id.clone();
                        return Ok(id);
                    }
                }
            }
            continue;
        }

        // Broadcast topics are /{product_key}/{device_id}/{category}/{name}.
        let parts: Vec<&str> = frame.topic.split('/').collect();
        if parts.len() >= 4 && !parts[2].is_empty() {
            if !parts[1].is_empty() {
                let prefix = format!("/{}", parts[1]);
                info!("Topic prefix from broadcast: {prefix}");
                *inner.topic_prefix.lock() = prefix;
            }
            let id = parts[2].to_string();
            info!("Discovered device id from broadcast: {id}");
            *inner.device_id.lock() = id.clone();
            return Ok(id);
        }
    }

    Err(ClientError::Discovery(format!(
        "no response or broadcast within {timeout:?}; check vacuum IP and power"
    )))
}
