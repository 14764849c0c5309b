//! End-to-end bridge test over an in-memory transport.
//!
//! A scripted peer stands in for the upstream system on the far side of a
//! duplex pipe: it answers the handshake and discovery calls, then pushes a
//! change notification. The test observes the outcome through the recording
//! runtime and the shared endpoint store.

use std::future::Future;
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::time::{sleep, timeout};

use slotbridge_core::{BridgeConfig, RuntimeError, Slot, UnitRuntime};
use slotbridge_devices::{Bridge, EndpointRegistry};
use slotbridge_session::{BoxedIo, Dialer, Session, SessionConfig};
use slotbridge_storage::EndpointStore;

/// Hands out one prepared pipe, then refuses further dials.
struct OneShotDialer {
    io: StdMutex<Option<DuplexStream>>,
}

impl OneShotDialer {
    fn new(io: DuplexStream) -> Self {
        Self {
            io: StdMutex::new(Some(io)),
        }
    }
}

#[async_trait]
impl Dialer for OneShotDialer {
    async fn dial(&self) -> std::io::Result<BoxedIo> {
        match self.io.lock().unwrap().take() {
            Some(io) => Ok(Box::new(io)),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "no more endpoints",
            )),
        }
    }
}

#[derive(Default)]
struct RecordingRuntime {
    installs: StdMutex<Vec<Slot>>,
    reports: StdMutex<Vec<(Slot, String)>>,
}

#[async_trait]
impl UnitRuntime for RecordingRuntime {
    async fn install_unit(&self, slot: Slot) -> Result<(), RuntimeError> {
        self.installs.lock().unwrap().push(slot);
        Ok(())
    }

    async fn report_attribute_changed(
        &self,
        slot: Slot,
        attribute: &str,
    ) -> Result<(), RuntimeError> {
        self.reports
            .lock()
            .unwrap()
            .push((slot, attribute.to_string()));
        Ok(())
    }
}

/// Serve handshake and discovery, then push one attribute change. Before
/// answering `hello`, `burst` unsolicited notifications are pushed with the
/// bridge mid-call and not yet draining events.
async fn run_peer(io: DuplexStream, devices: Value, burst: usize) {
    let (read, mut write) = tokio::io::split(io);
    let mut lines = BufReader::new(read).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let msg: Value = serde_json::from_str(&line).unwrap();
        let id = msg["id"].clone();
        let method = msg["method"].as_str().unwrap().to_string();
        let result = match method.as_str() {
            "hello" => {
                for seq in 0..burst {
                    write_frame(
                        &mut write,
                        json!({
                            "notification": "attributeChanged",
                            "identity": "lamp_1",
                            "attribute": "on",
                            "value": seq % 2 == 0,
                        }),
                    )
                    .await;
                }
                json!({"application": "devhub", "version": "3.2"})
            }
            "listDevices" => json!({"devices": devices}),
            other => panic!("peer got unexpected method {other}"),
        };
        write_frame(&mut write, json!({"id": id, "result": result})).await;

        if method == "listDevices" {
            write_frame(
                &mut write,
                json!({
                    "notification": "attributeChanged",
                    "identity": "strip_1_segment_1",
                    "attribute": "on",
                    "value": true,
                }),
            )
            .await;
        }
    }
}

async fn write_frame<W: tokio::io::AsyncWrite + Unpin>(write: &mut W, value: Value) {
    let mut frame = serde_json::to_vec(&value).unwrap();
    frame.push(b'\n');
    write.write_all(&frame).await.unwrap();
}

/// Poll until `probe` yields `Some`, auto-advancing paused time.
async fn wait_for<T, F, Fut>(probe: F) -> T
where
    F: Fn() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    timeout(Duration::from_secs(60), async {
        loop {
            if let Some(value) = probe().await {
                return value;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached")
}

fn full_device_list() -> Value {
    json!([
        {"identity": "lamp_1", "name": "Lamp", "kind": "light", "attributes": {"on": true}},
        {"identity": "strip_1", "name": "Strip", "members": [
            {"role": "segment", "sub_id": 0, "kind": "light"},
            {"role": "segment", "sub_id": 1, "kind": "light"}
        ]}
    ])
}

async fn run_once(
    store: &Arc<EndpointStore>,
    runtime: &Arc<RecordingRuntime>,
    devices: Value,
    expected_map: &str,
    burst: usize,
) {
    let registry = EndpointRegistry::with_store(Arc::clone(store), 16);
    let config = BridgeConfig::default();

    let (client_io, peer_io) = tokio::io::duplex(4096);
    let dialer = Arc::new(OneShotDialer::new(client_io));
    let (session, events) = Session::spawn(SessionConfig::from(&config.upstream), dialer);
    let peer = tokio::spawn(run_peer(peer_io, devices, burst));

    let bridge = Bridge::new(config, session.clone(), events, registry, runtime.clone());
    let bridge_task = tokio::spawn(bridge.run());

    // discovery is done once the pass committed the expected slot map
    let expected = expected_map.to_string();
    wait_for(|| {
        let store = Arc::clone(store);
        let expected = expected.clone();
        async move {
            match store.load_slot_map().unwrap() {
                Some(encoded) if encoded == expected => Some(()),
                _ => None,
            }
        }
    })
    .await;

    // and the pushed change reached the downstream runtime
    let runtime = Arc::clone(runtime);
    wait_for(move || {
        let runtime = Arc::clone(&runtime);
        async move {
            runtime
                .reports
                .lock()
                .unwrap()
                .iter()
                .any(|(slot, _)| *slot == Slot(3))
                .then_some(())
        }
    })
    .await;

    session.disconnect().await;
    bridge_task.await.unwrap();
    peer.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_connect_discover_install_and_route() {
    let dir = TempDir::new().unwrap();
    let store = EndpointStore::open(dir.path().join("endpoints.redb")).unwrap();
    let runtime = Arc::new(RecordingRuntime::default());

    run_once(&store, &runtime, full_device_list(), "cccc", 0).await;

    // install order: single unit, then composed parent before its members
    assert_eq!(
        *runtime.installs.lock().unwrap(),
        vec![Slot(0), Slot(1), Slot(2), Slot(3)]
    );
    assert_eq!(store.load_binding("lamp_1").unwrap(), Some(0));
    assert_eq!(store.load_binding("strip_1").unwrap(), Some(1));
    assert_eq!(store.load_binding("strip_1_segment_0").unwrap(), Some(2));
    assert_eq!(store.load_binding("strip_1_segment_1").unwrap(), Some(3));

    let reports = runtime.reports.lock().unwrap().clone();
    // lamp's initial value was applied on install
    assert!(reports.contains(&(Slot(0), "on".to_string())));
    // the pushed member change arrived and derived the parent aggregate
    assert!(reports.contains(&(Slot(3), "on".to_string())));
    assert!(reports.contains(&(Slot(1), "on".to_string())));
}

#[tokio::test(start_paused = true)]
async fn test_slots_survive_a_full_bridge_restart() {
    let dir = TempDir::new().unwrap();
    let store = EndpointStore::open(dir.path().join("endpoints.redb")).unwrap();
    let runtime = Arc::new(RecordingRuntime::default());

    run_once(&store, &runtime, full_device_list(), "cccc", 0).await;

    // second run: the lamp is gone; the strip keeps slots 1..=3 and the
    // lamp's slot stays bound but unconfirmed
    let devices = json!([
        {"identity": "strip_1", "name": "Strip", "members": [
            {"role": "segment", "sub_id": 0, "kind": "light"},
            {"role": "segment", "sub_id": 1, "kind": "light"}
        ]}
    ]);
    run_once(&store, &runtime, devices, "uccc", 0).await;

    assert_eq!(store.load_binding("lamp_1").unwrap(), Some(0));
    assert_eq!(store.load_binding("strip_1_segment_0").unwrap(), Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_notification_burst_during_discovery_does_not_stall() {
    let dir = TempDir::new().unwrap();
    let store = EndpointStore::open(dir.path().join("endpoints.redb")).unwrap();
    let runtime = Arc::new(RecordingRuntime::default());

    // 100 pushes land while the bridge is awaiting the handshake response
    // and not yet draining events; discovery must still complete
    run_once(&store, &runtime, full_device_list(), "cccc", 100).await;

    assert_eq!(store.load_binding("lamp_1").unwrap(), Some(0));
    assert_eq!(
        *runtime.installs.lock().unwrap(),
        vec![Slot(0), Slot(1), Slot(2), Slot(3)]
    );
}
