//! Failover integration tests
//!
//! A leader watcher re-targets the RPC client from its callback while the
//! client keeps following redirects on its own.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use leadwire_client::{Client, ClientConfig};
use leadwire_core::{LeaderInfo, LeaderView, MemberFormat, RetryConfig};
use leadwire_detector::{DetectorConfig, LeaderWatcher};
use leadwire_testing::{init_tracing, InMemoryEnsemble, Reply, ScriptedTransport};

const ELECTION: &str = "/mesos";

fn detector_config() -> DetectorConfig {
    DetectorConfig::from_url("zk://zk1:2181,zk2:2181/mesos")
        .expect("Invalid ensemble url")
        .with_read_retry(RetryConfig::new(3, Duration::from_millis(10)))
}

fn leader(index: u8, port: u16) -> LeaderInfo {
    LeaderInfo::new(
        format!("master@10.0.0.{}:{}", index, port),
        format!("10.0.0.{}", index),
        port,
    )
    .with_pid(format!("master@10.0.0.{}:{}", index, port))
}

async fn wait_for_endpoint(client: &Client, host: &str) {
    timeout(Duration::from_secs(2), async {
        while client.endpoint().host_str() != Some(host) {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Client never moved to {}, still at {}", host, client.endpoint()));
}

/// Watcher callback moving the client to whichever node leads now.
fn follow_leader(client: Arc<Client>) -> impl Fn(&LeaderView) + Send + Sync + 'static {
    move |view: &LeaderView| {
        if let Some(address) = view.info().and_then(LeaderInfo::host_port) {
            if let Err(e) = client.retarget(&address) {
                panic!("Leader address {} rejected: {}", address, e);
            }
        }
    }
}

#[tokio::test]
async fn test_watcher_retargets_client() {
    init_tracing();

    let ensemble = InMemoryEnsemble::with_path(ELECTION);
    ensemble.join(ELECTION, MemberFormat::Json, &leader(1, 5050)).unwrap();
    let standby = ensemble.join(ELECTION, MemberFormat::Json, &leader(2, 5051)).unwrap();

    let transport = Arc::new(ScriptedTransport::new());
    transport.set_fallback(Reply::Ok(bytes::Bytes::new()));
    let client = Arc::new(
        Client::new(
            transport.clone(),
            ClientConfig::new("http://127.0.0.1:5050/api/v1/scheduler"),
        )
        .unwrap(),
    );

    let watcher = LeaderWatcher::connect(ensemble.connector(), detector_config())
        .await
        .unwrap();
    watcher.start().await.unwrap();
    watcher.detect(follow_leader(Arc::clone(&client))).await.unwrap();

    // The synthetic delivery already points the client at the leader
    assert_eq!(client.endpoint().as_str(), "http://10.0.0.1:5050/api/v1/scheduler");

    let members = ensemble.children(ELECTION);
    let current = members.iter().find(|name| **name != standby).unwrap();
    ensemble.delete(&format!("{}/{}", ELECTION, current));
    wait_for_endpoint(&client, "10.0.0.2").await;
    assert_eq!(client.endpoint().port(), Some(5051));

    client.call_no_data(&serde_json::json!({"type": "REVIVE"})).await.unwrap();
    let requests = transport.requests();
    assert_eq!(requests.last().unwrap().url.as_str(), "http://10.0.0.2:5051/api/v1/scheduler");

    // Losing every candidate does not move the client anywhere
    ensemble.delete(&format!("{}/{}", ELECTION, standby));
    timeout(Duration::from_secs(2), async {
        while watcher.current().await != Some(LeaderView::Absent) {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Watcher never reported the leader as absent");
    assert_eq!(client.endpoint().host_str(), Some("10.0.0.2"));

    watcher.stop().await;
}

#[tokio::test]
async fn test_client_redirects_independently_of_watcher() {
    init_tracing();

    let ensemble = InMemoryEnsemble::with_path(ELECTION);
    ensemble.join(ELECTION, MemberFormat::Json, &leader(1, 5050)).unwrap();

    let transport = Arc::new(ScriptedTransport::with_replies([
        Reply::redirect("//10.0.0.3:5050"),
        Reply::subscribed("stream-7"),
    ]));
    let client = Arc::new(
        Client::new(
            transport.clone(),
            ClientConfig::new("http://10.0.0.1:5050/api/v1/scheduler").with_max_redirects(2),
        )
        .unwrap(),
    );

    let watcher = LeaderWatcher::connect(ensemble.connector(), detector_config())
        .await
        .unwrap();
    watcher.detect(follow_leader(Arc::clone(&client))).await.unwrap();
    watcher.start().await.unwrap();
    wait_for_endpoint(&client, "10.0.0.1").await;

    // The transport reports the new leader before the ensemble does
    let (_events, token) = client
        .subscribe(&serde_json::json!({"type": "SUBSCRIBE"}))
        .await
        .unwrap();
    token.apply(&client);

    assert_eq!(client.endpoint().host_str(), Some("10.0.0.3"));
    assert_eq!(client.session_token().as_deref(), Some("stream-7"));
    let view = watcher.current().await.unwrap();
    assert_eq!(view.info().unwrap().hostname, "10.0.0.1");

    watcher.stop().await;
}
