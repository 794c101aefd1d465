//! Two handlers talking `arb` over in-memory channels.

use arb_sync::{
    test_utils::{sealed_chain, sealed_header_with_salt, TestChain, TestHandler},
    ArbSyncConfig, SealedHeader,
};
use arb_wire::{ArbPeer, LastConfirmedPacket, PeerId, ARB1};
use std::time::Duration;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Connects `a` and `b` and returns the session `b` keeps for `a`.
fn connect(a: &TestHandler, b: &TestHandler) -> (ArbPeer, Vec<JoinHandle<()>>) {
    let (a_to_b, b_from_a) = ArbPeer::new(PeerId::with_last_byte(0xb), ARB1);
    let (b_to_a, a_from_b) = ArbPeer::new(PeerId::with_last_byte(0xa), ARB1);

    let mut tasks = Vec::new();
    let a_incoming = pipe(a_from_b, &mut tasks);
    let b_incoming = pipe(b_from_a, &mut tasks);

    let arb = a.handler.arb_handler();
    tasks.push(tokio::spawn(async move {
        let _ = arb.run_peer(a_to_b, a_incoming).await;
    }));
    let arb = b.handler.arb_handler();
    let session = b_to_a.clone();
    tasks.push(tokio::spawn(async move {
        let _ = arb.run_peer(session, b_incoming).await;
    }));

    (b_to_a, tasks)
}

/// Encodes everything a session sends into the frame stream of the remote side.
fn pipe(
    mut outgoing: mpsc::UnboundedReceiver<arb_wire::ArbMessage>,
    tasks: &mut Vec<JoinHandle<()>>,
) -> UnboundedReceiverStream<bytes::BytesMut> {
    let (tx, rx) = mpsc::unbounded_channel();
    tasks.push(tokio::spawn(async move {
        while let Some(msg) = outgoing.recv().await {
            if tx.send(msg.encoded()).is_err() {
                break
            }
        }
    }));
    UnboundedReceiverStream::new(rx)
}

async fn eventually(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

fn source(confirmed: &SealedHeader, checkpoint: &SealedHeader) -> TestHandler {
    let source = TestHandler::with_config(ArbSyncConfig::default(), false);
    source.helper.set_last_confirmed(Some(LastConfirmedPacket {
        header: confirmed.inner().clone(),
        l1_block_number: 100,
        node: 0,
    }));
    source.helper.set_last_checkpoint(Some(checkpoint.inner().clone()));
    source
}

#[tokio::test(flavor = "multi_thread")]
async fn syncing_node_learns_watermarks() {
    arb_tracing::init_test_tracing();
    let chain = sealed_chain(11);
    let source = source(&chain[10], &chain[8]);

    let local = TestChain::default();
    for header in &chain[..=8] {
        local.insert_canonical(header.clone());
    }
    let syncing = TestHandler::new(local, ArbSyncConfig::default(), true);
    let (_session, _tasks) = connect(&syncing, &source);

    eventually(|| syncing.handler.confirmed().is_some()).await;
    assert_eq!(syncing.handler.confirmed().unwrap().hash(), chain[10].hash());

    // checkpoint verification waits for local sync to reach it
    assert!(syncing.handler.checkpoint().is_none());
    syncing.downloader.set_skeleton_head(Some(chain[8].clone()));
    syncing.downloader.resume_backfill();

    eventually(|| syncing.handler.checkpoint().is_some()).await;
    assert_eq!(syncing.handler.checkpoint().unwrap().hash(), chain[8].hash());
    assert_eq!(syncing.downloader.pivot_targets(), vec![(10, None), (10, Some(8))]);
    assert_eq!(syncing.handler.synced_block_number(), 8);
    assert_eq!(syncing.backfiller.resumed(), 1);

    // the source never asks a synced peer for anything
    assert!(source.handler.confirmed().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn forked_checkpoint_drops_source() {
    arb_tracing::init_test_tracing();
    let chain = sealed_chain(11);
    let forked = sealed_header_with_salt(8, 7);
    let source = source(&chain[10], &forked);

    let local = TestChain::default();
    for header in &chain[..=8] {
        local.insert_canonical(header.clone());
    }
    let syncing = TestHandler::new(local, ArbSyncConfig::default(), true);
    syncing.downloader.set_skeleton_head(Some(chain[8].clone()));
    syncing.downloader.resume_backfill();

    let (_session, _tasks) = connect(&syncing, &source);

    eventually(|| syncing.handler.confirmed().is_some() && syncing.handler.num_peers() == 0).await;
    assert!(syncing.handler.checkpoint().is_none());
    assert_eq!(syncing.downloader.pivot_targets(), vec![(10, None)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn finished_sync_stops_asking() {
    arb_tracing::init_test_tracing();
    let chain = sealed_chain(3);
    let source = source(&chain[2], &chain[1]);
    let syncing = TestHandler::syncing();
    syncing.backfiller.finish();
    assert!(!syncing.handler.is_syncing());

    let (_session, _tasks) = connect(&syncing, &source);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(syncing.handler.confirmed().is_none());
    assert_eq!(syncing.handler.num_peers(), 1);
}
