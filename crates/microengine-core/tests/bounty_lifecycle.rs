//! End-to-end bounty lifecycle against mocked collaborators.
//!
//! The gateway and artifact store are wiremock servers; clamd is a small
//! TCP fake speaking INSTREAM. Exercises the real HTTP and clamd clients
//! through the scheduler: scan → commit → wait out the window → reveal.

use microengine_core::{
    BlockEvent, BountyEvent, BountyOutcome, ClamdEngine, Event, ScanAggregator, Scheduler,
};
use microengine_gateway::{ArtifactClient, GatewayClient, GatewayConfig};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ACCOUNT: &str = "0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F";
const URI: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

/// Serves INSTREAM requests, flagging any payload that contains "EICAR".
async fn fake_clamd() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            let mut cmd = [0u8; 10];
            if sock.read_exact(&mut cmd).await.is_err() {
                continue;
            }
            let mut payload = Vec::new();
            loop {
                let len = sock.read_u32().await.unwrap() as usize;
                if len == 0 {
                    break;
                }
                let mut buf = vec![0u8; len];
                sock.read_exact(&mut buf).await.unwrap();
                payload.extend_from_slice(&buf);
            }
            let reply: &[u8] = if payload.windows(5).any(|w| w == &b"EICAR"[..]) {
                b"stream: Eicar-Test-Signature FOUND\0"
            } else {
                b"stream: OK\0"
            };
            sock.write_all(reply).await.unwrap();
        }
    });

    addr
}

async fn mount_artifacts(server: &MockServer, members: &[&'static [u8]]) {
    for (index, body) in members.iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(format!("/artifacts/{}/{}/stat", URI, index)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "result": {"hash": URI, "data_size": body.len(), "num_links": 0}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/artifacts/{}/{}", URI, index)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_scan_commit_and_reveal() {
    let gateway_server = MockServer::start().await;
    let artifact_server = MockServer::start().await;
    let clamd_addr = fake_clamd().await;
    let guid = Uuid::new_v4();

    mount_artifacts(
        &artifact_server,
        &[
            &b"benign bytes"[..],
            &b"X5O!P%@AP[4\\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*"[..],
        ],
    )
    .await;

    Mock::given(method("POST"))
        .and(path(format!("/bounties/{}/assertions", guid)))
        .and(query_param("account", ACCOUNT))
        .and(body_partial_json(json!({
            "verdicts": [false, true],
            "mask": [true, true],
            "bid": "62500000000000000"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "result": {"index": 3, "nonce": "12345"}
        })))
        .expect(1)
        .mount(&gateway_server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/bounties/{}/assertions/3/reveal", guid)))
        .and(query_param("account", ACCOUNT))
        .and(body_partial_json(json!({
            "nonce": "12345",
            "verdicts": [false, true],
            "metadata": ";Eicar-Test-Signature;"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "result": {}
        })))
        .expect(1)
        .mount(&gateway_server)
        .await;

    let config = GatewayConfig::default()
        .with_url(gateway_server.uri())
        .with_artifact_url(artifact_server.uri())
        .with_account(ACCOUNT);

    let aggregator = ScanAggregator::new(
        ArtifactClient::new(config.clone()).unwrap(),
        ClamdEngine::new(clamd_addr),
    );
    let mut scheduler = Scheduler::new(aggregator, GatewayClient::new(config).unwrap());

    let outcome = scheduler
        .on_bounty(BountyEvent {
            guid,
            artifact_uri: URI.into(),
            expiration_block: 100,
        })
        .await;
    assert_eq!(outcome, BountyOutcome::Committed);
    assert!(scheduler.is_outstanding(&guid));

    for block_number in [100, 110, 125] {
        scheduler.handle(Event::Block(BlockEvent { block_number })).await;
        assert!(scheduler.is_outstanding(&guid));
    }

    scheduler
        .handle(Event::Block(BlockEvent { block_number: 126 }))
        .await;
    assert!(!scheduler.is_outstanding(&guid));

    // Later blocks must not reveal again; wiremock verifies expect(1) on drop.
    scheduler
        .handle(Event::Block(BlockEvent { block_number: 127 }))
        .await;
}

#[tokio::test]
async fn test_empty_collection_posts_nothing() {
    let gateway_server = MockServer::start().await;
    let clamd_addr = fake_clamd().await;
    let guid = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path(format!("/artifacts/{}/0/stat", URI)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "result": {"hash": URI, "data_size": 0, "num_links": 0}
        })))
        .mount(&gateway_server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&gateway_server)
        .await;

    let config = GatewayConfig::default()
        .with_url(gateway_server.uri())
        .with_account(ACCOUNT);
    let aggregator = ScanAggregator::new(
        ArtifactClient::new(config.clone()).unwrap(),
        ClamdEngine::new(clamd_addr),
    );
    let mut scheduler = Scheduler::new(aggregator, GatewayClient::new(config).unwrap());

    let outcome = scheduler
        .on_bounty(BountyEvent {
            guid,
            artifact_uri: URI.into(),
            expiration_block: 100,
        })
        .await;
    assert_eq!(outcome, BountyOutcome::NothingToAssert);
    assert_eq!(scheduler.outstanding().count(), 0);
}

#[tokio::test]
async fn test_rejected_assertion_drops_bounty() {
    let gateway_server = MockServer::start().await;
    let clamd_addr = fake_clamd().await;
    let guid = Uuid::new_v4();

    mount_artifacts(&gateway_server, &[&b"benign"[..]]).await;

    Mock::given(method("POST"))
        .and(path(format!("/bounties/{}/assertions", guid)))
        .respond_with(ResponseTemplate::new(400).set_body_string("bounty expired"))
        .expect(1)
        .mount(&gateway_server)
        .await;

    let config = GatewayConfig::default()
        .with_url(gateway_server.uri())
        .with_account(ACCOUNT);
    let aggregator = ScanAggregator::new(
        ArtifactClient::new(config.clone()).unwrap(),
        ClamdEngine::new(clamd_addr),
    );
    let mut scheduler = Scheduler::new(aggregator, GatewayClient::new(config).unwrap());

    let outcome = scheduler
        .on_bounty(BountyEvent {
            guid,
            artifact_uri: URI.into(),
            expiration_block: 100,
        })
        .await;
    assert_eq!(outcome, BountyOutcome::Dropped);
    assert!(!scheduler.is_outstanding(&guid));
}
