//! The client facade and its shared inner structure.

mod connection;
mod dispatcher;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::SinkExt;
use log::{debug, info};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use narwal_protocol::frame::{build_frame, parse_frame, Frame, HEADER_SIZE};
use narwal_protocol::pb::PbMessage;
use narwal_protocol::types::{
    MAP_RESPONSE_TIMEOUT, TOPIC_CMD_CANCEL, TOPIC_CMD_DRY_MOP, TOPIC_CMD_DUST_GATHERING,
    TOPIC_CMD_EASY_CLEAN, TOPIC_CMD_FORCE_END, TOPIC_CMD_GET_ALL_MAPS, TOPIC_CMD_GET_BASE_STATUS,
    TOPIC_CMD_GET_CURRENT_TASK, TOPIC_CMD_GET_DEVICE_INFO, TOPIC_CMD_GET_FEATURE_LIST,
    TOPIC_CMD_GET_MAP, TOPIC_CMD_PAUSE, TOPIC_CMD_RECALL, TOPIC_CMD_RESUME,
    TOPIC_CMD_SET_FAN_LEVEL, TOPIC_CMD_SET_MOP_HUMIDITY, TOPIC_CMD_START_CLEAN,
    TOPIC_CMD_WASH_MOP, TOPIC_CMD_YELL, FanLevel, MopHumidity,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::models::{CommandResponse, DeviceInfo, MapData};
use crate::reconcile::{Reconciler, VerificationOutcome};
use crate::state::DeviceState;
use crate::wake;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Callback invoked with a state snapshot after each update.
pub type StateCallback = Box<dyn Fn(&DeviceState) + Send + Sync>;

type SharedStateCallback = Arc<dyn Fn(&DeviceState) + Send + Sync>;

/// State and reconciler live behind one lock so trust decisions and state
/// mutation are atomic with respect to each other.
pub(crate) struct Shared {
    pub(crate) state: DeviceState,
    pub(crate) reconciler: Reconciler,
}

pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    /// Discovered device id; starts from config.
    pub(crate) device_id: Mutex<String>,
    /// Addressing prefix; replaced once the product key is known.
    pub(crate) topic_prefix: Mutex<String>,
    pub(crate) shared: Mutex<Shared>,
    /// Write half; heartbeat, keepalive, and dispatcher all send.
    pub(crate) writer: AsyncMutex<Option<WsSink>>,
    /// Read half; held by the listener while it runs, or taken for bounded
    /// direct reads when no listener is active.
    pub(crate) reader: AsyncMutex<Option<WsSource>>,
    pub(crate) connected: AtomicBool,
    pub(crate) listener_active: AtomicBool,
    pub(crate) should_reconnect: AtomicBool,
    /// Command responses routed by the listener.
    pub(crate) response_tx: mpsc::Sender<Frame>,
    pub(crate) response_rx: AsyncMutex<mpsc::Receiver<Frame>>,
    /// Serializes in-flight commands; responses carry no correlation id.
    pub(crate) command_lock: AsyncMutex<()>,
    pub(crate) on_state_update: Mutex<Option<SharedStateCallback>>,
    /// Heartbeat and keepalive task handles, aborted on teardown.
    pub(crate) subtasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ClientInner {
    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn full_topic(&self, short_topic: &str) -> String {
        format!(
            "{}/{}/{}",
            self.topic_prefix.lock(),
            self.device_id.lock(),
            short_topic
        )
    }

    /// Build and send a command frame addressed to the device.
    pub(crate) async fn send_frame(&self, short_topic: &str, payload: &[u8]) -> Result<()> {
        let frame = build_frame(&self.full_topic(short_topic), payload, None)?;
        self.send_raw_bytes(frame).await
    }

    pub(crate) async fn send_raw_bytes(&self, frame: Bytes) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let sink = guard.as_mut().ok_or(ClientError::NotConnected)?;
        sink.send(Message::Binary(frame.to_vec())).await?;
        Ok(())
    }

    /// Route one raw frame from the socket: responses to the queue,
    /// everything else through the reconciler.
    pub(crate) fn handle_frame(&self, data: &[u8]) {
        if data.len() < HEADER_SIZE {
            return;
        }
        let frame = match parse_frame(data) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Dropping unparseable frame: {e}");
                return;
            }
        };
        if frame.is_response() {
            // Wake bursts solicit responses nobody is waiting for; a full
            // queue must never stall the read loop. The dispatcher drains
            // the queue before each command, so dropping here only sheds
            // unclaimed responses.
            if let Err(e) = self.response_tx.try_send(frame) {
                debug!("Dropping response frame: {e}");
            }
            return;
        }
        self.apply_broadcast_frame(&frame);
    }

    /// Apply a broadcast frame to the shared state and notify the callback.
    pub(crate) fn apply_broadcast_frame(&self, frame: &Frame) {
        let now = Instant::now();
        let snapshot = {
            let mut shared = self.shared.lock();
            let Shared { state, reconciler } = &mut *shared;
            match PbMessage::decode(&frame.payload) {
                Ok(msg) => reconciler.apply_broadcast(state, frame.short_topic(), &msg, now),
                Err(e) => {
                    // Even garbage proves the firmware is running.
                    debug!("Undecodable broadcast on {}: {e}", frame.short_topic());
                    reconciler.note_broadcast(now);
                }
            }
            state.clone()
        };
        self.notify(&snapshot);
    }

    pub(crate) fn notify(&self, snapshot: &DeviceState) {
        // Clone out so a callback can reconfigure the client without
        // deadlocking on the non-reentrant lock.
        let callback = self.on_state_update.lock().clone();
        if let Some(callback) = callback {
            callback(snapshot);
        }
    }

    pub(crate) fn abort_subtasks(&self) {
        for task in self.subtasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Async client for one Narwal vacuum.
///
/// Composes the connection manager, wake engine, command dispatcher, and
/// state reconciler behind a single surface. Cloning is cheap and clones
/// share the same connection and state.
///
/// ```no_run
/// # async fn run() -> narwal_client::Result<()> {
/// use narwal_client::{ClientConfig, NarwalClient};
///
/// let client = NarwalClient::new(ClientConfig::new("192.168.1.50"));
/// client.connect().await?;
/// client.discover_device_id(std::time::Duration::from_secs(15)).await?;
/// tokio::spawn({
///     let listener = client.clone();
///     async move { listener.start_listening().await }
/// });
/// client.start().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NarwalClient {
    inner: Arc<ClientInner>,
}

impl NarwalClient {
    pub fn new(config: ClientConfig) -> Self {
        let (response_tx, response_rx) = mpsc::channel(32);
        let inner = ClientInner {
            device_id: Mutex::new(config.device_id.clone()),
            topic_prefix: Mutex::new(config.topic_prefix.clone()),
            config,
            shared: Mutex::new(Shared {
                state: DeviceState::default(),
                reconciler: Reconciler::new(),
            }),
            writer: AsyncMutex::new(None),
            reader: AsyncMutex::new(None),
            connected: AtomicBool::new(false),
            listener_active: AtomicBool::new(false),
            should_reconnect: AtomicBool::new(true),
            response_tx,
            response_rx: AsyncMutex::new(response_rx),
            command_lock: AsyncMutex::new(()),
            on_state_update: Mutex::new(None),
            subtasks: Mutex::new(Vec::new()),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Register a callback fired with a state snapshot after every update.
    pub fn set_state_callback(&self, callback: StateCallback) {
        *self.inner.on_state_update.lock() = Some(Arc::from(callback));
    }

    /// Snapshot of the current device state.
    pub fn state(&self) -> DeviceState {
        self.inner.shared.lock().state.clone()
    }

    /// True while the WebSocket is open.
    pub fn connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// True while the robot is actively broadcasting.
    pub fn robot_awake(&self) -> bool {
        self.inner.shared.lock().reconciler.is_awake()
    }

    /// Recommended fallback poll interval for the caller's poll loop.
    pub fn poll_interval(&self) -> Duration {
        self.inner.shared.lock().reconciler.poll_interval()
    }

    /// Device id, once known.
    pub fn device_id(&self) -> String {
        self.inner.device_id.lock().clone()
    }

    /// Establish the WebSocket connection.
    pub async fn connect(&self) -> Result<()> {
        connection::connect(&self.inner).await
    }

    /// Disconnect and stop all background tasks. Idempotent.
    pub async fn disconnect(&self) {
        connection::disconnect(&self.inner).await;
    }

    /// Run the persistent listener with auto-reconnect. Returns only after
    /// [`disconnect`](Self::disconnect) is called.
    pub async fn start_listening(&self) {
        connection::run_listener(&self.inner).await;
    }

    /// Wake the robot from sleep. Returns false on deadline without raising;
    /// a failed wake leaves state untouched.
    pub async fn wake(&self, timeout: Duration) -> Result<bool> {
        connection::wake(&self.inner, timeout).await
    }

    /// [`wake`](Self::wake) with the configured wake timeout.
    pub async fn ensure_awake(&self) -> Result<bool> {
        self.wake(self.inner.config.wake_timeout).await
    }

    /// Resolve the device id (and addressing prefix) by waking the robot.
    ///
    /// The robot's server processes commands regardless of the device id in
    /// the topic, so a get_device_info under each candidate prefix doubles
    /// as a wake signal. The id comes from a direct response, or from the
    /// topic of any broadcast that arrives first.
    pub async fn discover_device_id(&self, timeout: Duration) -> Result<String> {
        connection::discover_device_id(&self.inner, timeout).await
    }

    /// Send a command and await its correlated response.
    pub async fn send_command(
        &self,
        short_topic: &str,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<CommandResponse> {
        dispatcher::send_command(&self.inner, short_topic, payload, timeout).await
    }

    async fn command(&self, short_topic: &str) -> Result<CommandResponse> {
        self.send_command(short_topic, b"", self.inner.config.command_timeout)
            .await
    }

    /// Send a prebuilt frame to an arbitrary topic.
    pub async fn send_raw(
        &self,
        topic: &str,
        payload: &[u8],
        header_byte: Option<u8>,
    ) -> Result<()> {
        if !self.inner.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let frame = build_frame(topic, payload, header_byte)?;
        self.inner.send_raw_bytes(frame).await
    }

    // --- High-level commands ---

    /// Play the locate sound. Also forces a full firmware boot, which the
    /// verification flow relies on.
    pub async fn locate(&self) -> Result<CommandResponse> {
        self.command(TOPIC_CMD_YELL).await
    }

    /// Start a whole-house clean.
    pub async fn start(&self) -> Result<CommandResponse> {
        self.command(TOPIC_CMD_START_CLEAN).await
    }

    /// Start a quick clean.
    pub async fn start_easy_clean(&self) -> Result<CommandResponse> {
        self.command(TOPIC_CMD_EASY_CLEAN).await
    }

    pub async fn pause(&self) -> Result<CommandResponse> {
        self.command(TOPIC_CMD_PAUSE).await
    }

    pub async fn resume(&self) -> Result<CommandResponse> {
        self.command(TOPIC_CMD_RESUME).await
    }

    /// Force-stop the current task.
    pub async fn stop(&self) -> Result<CommandResponse> {
        self.command(TOPIC_CMD_FORCE_END).await
    }

    pub async fn cancel(&self) -> Result<CommandResponse> {
        self.command(TOPIC_CMD_CANCEL).await
    }

    /// Send the robot back to the charging dock.
    pub async fn return_to_base(&self) -> Result<CommandResponse> {
        self.command(TOPIC_CMD_RECALL).await
    }

    pub async fn set_fan_speed(&self, level: FanLevel) -> Result<CommandResponse> {
        let payload = wake::varint_payload(1, level as u64);
        self.send_command(TOPIC_CMD_SET_FAN_LEVEL, &payload, self.inner.config.command_timeout)
            .await
    }

    pub async fn set_mop_humidity(&self, level: MopHumidity) -> Result<CommandResponse> {
        let payload = wake::varint_payload(1, level as u64);
        self.send_command(TOPIC_CMD_SET_MOP_HUMIDITY, &payload, self.inner.config.command_timeout)
            .await
    }

    /// Wash the mop pads at the station.
    pub async fn wash_mop(&self) -> Result<CommandResponse> {
        self.command(TOPIC_CMD_WASH_MOP).await
    }

    /// Dry the mop pads at the station.
    pub async fn dry_mop(&self) -> Result<CommandResponse> {
        self.command(TOPIC_CMD_DRY_MOP).await
    }

    /// Empty the dustbin at the station.
    pub async fn empty_dustbin(&self) -> Result<CommandResponse> {
        self.command(TOPIC_CMD_DUST_GATHERING).await
    }

    // --- Queries ---

    /// Query device identity. Also fixes the addressing prefix to the
    /// device's actual product key.
    pub async fn get_device_info(&self) -> Result<DeviceInfo> {
        let resp = self.command(TOPIC_CMD_GET_DEVICE_INFO).await?;
        let info = DeviceInfo::from_response(&resp.data);
        if !info.product_key.is_empty() {
            let prefix = format!("/{}", info.product_key);
            info!("Topic prefix set to {prefix}");
            *self.inner.topic_prefix.lock() = prefix;
        }
        self.inner.shared.lock().state.device_info = Some(info.clone());
        Ok(info)
    }

    /// Query the supported feature set.
    pub async fn get_feature_list(&self) -> Result<CommandResponse> {
        self.command(TOPIC_CMD_GET_FEATURE_LIST).await
    }

    /// Poll the base status and apply it under the trust policy: fully
    /// while the robot is broadcasting, battery-only while it sleeps.
    pub async fn get_status(&self) -> Result<CommandResponse> {
        let resp = self.command(TOPIC_CMD_GET_BASE_STATUS).await?;
        // The status body sits in field 2 of the response envelope.
        if let Some(status) = resp.data.message_field(2) {
            let now = Instant::now();
            let snapshot = {
                let mut shared = self.inner.shared.lock();
                let Shared { state, reconciler } = &mut *shared;
                reconciler.apply_poll_response(state, status, now);
                state.clone()
            };
            self.inner.notify(&snapshot);
        } else {
            debug!("Status response carried no body");
        }
        Ok(resp)
    }

    /// Query the current clean task.
    pub async fn get_current_task(&self) -> Result<CommandResponse> {
        self.command(TOPIC_CMD_GET_CURRENT_TASK).await
    }

    /// Download the full map.
    pub async fn get_map(&self) -> Result<MapData> {
        let resp = self
            .send_command(TOPIC_CMD_GET_MAP, b"", MAP_RESPONSE_TIMEOUT)
            .await?;
        let map = MapData::from_response(&resp.data);
        self.inner.shared.lock().state.map_data = Some(map.clone());
        Ok(map)
    }

    /// Download all saved/reduced maps.
    pub async fn get_all_maps(&self) -> Result<CommandResponse> {
        self.send_command(TOPIC_CMD_GET_ALL_MAPS, b"", MAP_RESPONSE_TIMEOUT)
            .await
    }

    /// Poll status and, when the result looks like a stale cached mode, run
    /// the verification flow. Returns the reconciled state snapshot.
    pub async fn refresh(&self) -> Result<DeviceState> {
        self.get_status().await?;
        let suspicious = {
            let shared = self.inner.shared.lock();
            shared.reconciler.suspects_stale_cleaning(&shared.state)
        };
        if suspicious {
            self.verify_stale_cleaning().await?;
        }
        Ok(self.state())
    }

    /// Probe a suspected stale "cleaning" mode with a force-stop command.
    ///
    /// Not-applicable proves no task was running and the mode is overridden
    /// to docked; success proves a real lingering task was just terminated.
    /// Anything else escalates to a locate (full firmware boot) plus a
    /// re-query, overriding to docked if the mode still reads stale.
    async fn verify_stale_cleaning(&self) -> Result<()> {
        info!("Verifying suspected stale cleaning state");
        let outcome = match self.stop().await {
            Ok(resp) if resp.not_applicable() => VerificationOutcome::NoTaskRunning,
            Ok(resp) if resp.result_code.is_some() && resp.success() => {
                VerificationOutcome::TaskTerminated
            }
            Ok(_) => VerificationOutcome::Inconclusive,
            Err(ClientError::CommandTimeout { .. }) => VerificationOutcome::Inconclusive,
            Err(e) => return Err(e),
        };

        {
            let mut shared = self.inner.shared.lock();
            let Shared { state, reconciler } = &mut *shared;
            reconciler.record_verification(state, outcome, Instant::now());
        }

        if outcome == VerificationOutcome::Inconclusive {
            debug!("Force-stop inconclusive, escalating to forced wake");
            let _ = self.locate().await;
            tokio::time::sleep(Duration::from_secs(2)).await;
            let _ = self.get_status().await;

            let snapshot = {
                let mut shared = self.inner.shared.lock();
                let Shared { state, reconciler } = &mut *shared;
                if reconciler.suspects_stale_cleaning(state) {
                    info!("Mode still reads stale after forced wake, overriding to docked");
                    reconciler.apply_correction(state, Instant::now());
                }
                state.clone()
            };
            self.inner.notify(&snapshot);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use futures_util::StreamExt;
    use narwal_protocol::pb::{put_bytes_field, put_fixed32_field, put_varint_field};
    use narwal_protocol::types::WorkingMode;

    /// A local WebSocket endpoint that accepts one connection and swallows
    /// every frame, like a robot whose firmware is asleep.
    async fn spawn_silent_server() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });
        port
    }

    async fn connected_client(port: u16) -> NarwalClient {
        let mut config = ClientConfig::new("127.0.0.1");
        config.port = port;
        let client = NarwalClient::new(config);
        client.connect().await.unwrap();
        client
    }

    fn base_status_payload(mode: u64, battery: f32) -> Bytes {
        let mut mode_msg = BytesMut::new();
        put_varint_field(&mut mode_msg, 1, mode);
        let mut buf = BytesMut::new();
        put_fixed32_field(&mut buf, 2, battery.to_bits());
        put_bytes_field(&mut buf, 3, &mode_msg);
        buf.freeze()
    }

    fn broadcast_frame(payload: &[u8]) -> Frame {
        let frame =
            build_frame("/PFX/DEV/status/robot_base_status", payload, None).unwrap();
        parse_frame(&frame).unwrap()
    }

    fn test_client() -> NarwalClient {
        let _ = env_logger::builder().is_test(true).try_init();
        NarwalClient::new(ClientConfig::new("127.0.0.1"))
    }

    #[test]
    fn test_broadcast_frame_updates_state() {
        let client = test_client();
        let frame = broadcast_frame(&base_status_payload(4, 85.0));
        client.inner.apply_broadcast_frame(&frame);

        let state = client.state();
        assert_eq!(state.mode, WorkingMode::Cleaning);
        assert_eq!(state.battery_level, Some(85));
        assert!(state.is_cleaning());
        assert!(client.robot_awake());
    }

    #[test]
    fn test_sleeping_poll_after_broadcast_is_battery_only() {
        let client = test_client();
        let frame = broadcast_frame(&base_status_payload(10, 80.0));
        client.inner.apply_broadcast_frame(&frame);
        assert_eq!(client.state().mode, WorkingMode::Docked);

        // The robot stops broadcasting; a poll now claims cleaning at 85.
        let poll = PbMessage::decode(&base_status_payload(4, 85.0)).unwrap();
        {
            let mut shared = client.inner.shared.lock();
            let Shared { state, reconciler } = &mut *shared;
            reconciler.mark_asleep();
            reconciler.apply_poll_response(state, &poll, Instant::now());
        }

        let state = client.state();
        assert_eq!(state.mode, WorkingMode::Docked);
        assert_eq!(state.battery_level, Some(85));
    }

    #[test]
    fn test_state_callback_receives_snapshots() {
        let client = test_client();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.set_state_callback(Box::new(move |state| {
            sink.lock().push(state.battery_level);
        }));

        let frame = broadcast_frame(&base_status_payload(10, 80.0));
        client.inner.apply_broadcast_frame(&frame);
        assert_eq!(seen.lock().as_slice(), &[Some(80)]);
    }

    #[test]
    fn test_undecodable_broadcast_still_wakes() {
        let client = test_client();
        let frame = broadcast_frame(b"\xff\xff\xff");
        client.inner.apply_broadcast_frame(&frame);
        assert!(client.robot_awake());
        assert_eq!(client.state(), DeviceState::default());
    }

    #[test]
    fn test_full_topic_uses_discovered_identity() {
        let client = test_client();
        *client.inner.device_id.lock() = "NWL-0042".to_string();
        assert_eq!(
            client.inner.full_topic("task/pause"),
            "/QoEsI5qYXO/NWL-0042/task/pause"
        );
    }

    #[test]
    fn test_response_flood_never_stalls_frame_handling() {
        let client = test_client();
        let mut response = build_frame("/PFX/DEV/common/get_device_info", b"\x08\x01", None)
            .unwrap()
            .to_vec();
        response[2] = 0x2A;

        // Unclaimed responses well past the queue capacity, as left behind
        // by repeated wake bursts with no command in flight.
        for _ in 0..100 {
            client.inner.handle_frame(&response);
        }

        // Broadcasts must still flow afterwards.
        let frame = broadcast_frame(&base_status_payload(4, 85.0));
        client.inner.handle_frame(&frame.raw);
        assert!(client.robot_awake());
        assert_eq!(client.state().battery_level, Some(85));
    }

    #[test]
    fn test_callback_may_reconfigure_client() {
        let client = test_client();
        let seen = Arc::new(Mutex::new(0u32));
        let sink = Arc::clone(&seen);
        let reconfigure = client.clone();
        client.set_state_callback(Box::new(move |_| {
            *sink.lock() += 1;
            reconfigure.set_state_callback(Box::new(|_| {}));
        }));

        let frame = broadcast_frame(&base_status_payload(10, 80.0));
        client.inner.apply_broadcast_frame(&frame);
        assert_eq!(*seen.lock(), 1);
    }

    #[tokio::test]
    async fn test_failed_wake_returns_false_and_leaves_state() {
        let port = spawn_silent_server().await;
        let client = connected_client(port).await;

        let woke = client.wake(Duration::from_millis(300)).await.unwrap();
        assert!(!woke);
        assert!(!client.robot_awake());
        assert_eq!(client.state(), DeviceState::default());
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_disconnect_interrupts_discovery() {
        let port = spawn_silent_server().await;
        let client = connected_client(port).await;

        let discovery = tokio::spawn({
            let discovering = client.clone();
            async move { discovering.discover_device_id(Duration::from_secs(30)).await }
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        tokio::time::timeout(Duration::from_secs(5), client.disconnect())
            .await
            .expect("disconnect must not wait out the discovery deadline");
        assert!(discovery.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_wake_requires_connection_and_mutates_nothing() {
        let client = test_client();
        let before = client.state();
        let result = client.wake(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
        assert_eq!(client.state(), before);
        assert!(!client.robot_awake());
    }

    #[tokio::test]
    async fn test_commands_require_connection() {
        let client = test_client();
        assert!(matches!(client.pause().await, Err(ClientError::NotConnected)));
        assert!(matches!(
            client.send_raw("/PFX/DEV/task/pause", b"", None).await,
            Err(ClientError::NotConnected)
        ));
    }
}
