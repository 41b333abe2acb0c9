//! Swarm scenarios over the in-memory relay

use std::sync::Arc;
use std::time::Duration;

use linx_core::ParentChain;
use linx_crypto::Identity;
use linx_runtime::PeerConfig;
use linx_signal::{SignalEvent, SignalingClient};
use linx_test::{wait_for, LinkChaos, LoopbackMode, SwarmHarness};

const SCOPE: &str = "swarm1";

fn config() -> PeerConfig {
    PeerConfig::default().with_scope(SCOPE)
}

#[tokio::test]
async fn two_peers_connect() {
    let mut swarm = SwarmHarness::new(config());
    swarm.spawn_peer().await.unwrap();
    swarm.spawn_peer().await.unwrap();
    let p1 = swarm.peer(0).public_key();
    let p2 = swarm.peer(1).public_key();

    let snapshots = swarm.settle(Duration::from_secs(5)).await.unwrap();
    assert_eq!(snapshots[0].outgoing, vec![p2]);
    assert!(snapshots[0].incoming.is_empty());
    assert_eq!(snapshots[1].incoming, vec![p1]);
    assert_eq!(snapshots[1].parents, ParentChain::from_keys([p1]));
    assert!(snapshots[0].parents.is_empty());
    assert!(swarm.check_invariants(&snapshots).is_empty());

    swarm.shutdown().await.unwrap();
}

#[tokio::test]
async fn announcement_through_descendant_is_rejected() {
    let mut swarm = SwarmHarness::new(config());
    swarm.spawn_peer().await.unwrap();
    let p1 = swarm.peer(0).public_key();

    // A bare signaling client stands in for a peer below P1
    let (client, mut events) = SignalingClient::new(Arc::new(Identity::generate()), swarm.relay().link(), 16);
    client.subscribe(SCOPE).unwrap();
    client.announce(&ParentChain::from_keys([p1])).unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(swarm.connector().opened(), 0);
    while let Ok(event) = events.try_recv() {
        // Only the relay's echo of our own announcement
        assert!(matches!(event, SignalEvent::JoinRequest { .. }), "unexpected {:?}", event);
    }

    // Same client, empty chain: P1 admits and sends an offer
    client.announce(&ParentChain::new()).unwrap();
    let offer = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Some(SignalEvent::Offer { from, payload }) => return (from, payload),
                Some(SignalEvent::JoinRequest { .. }) => continue,
                None => panic!("signaling client stopped"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(offer.0, p1);
    assert_eq!(offer.1.signal["type"], "offer");
    assert_eq!(swarm.connector().opened(), 1);

    swarm.shutdown().await.unwrap();
}

#[tokio::test]
async fn expired_pending_slot_is_reusable() {
    let mut config = config().with_pending_timeout(Duration::from_millis(200));
    config.sweep_interval_ms = 50;
    let mut swarm = SwarmHarness::new(config);
    swarm.connector().set_mode(LoopbackMode::Stall);

    swarm.spawn_peer().await.unwrap();
    swarm.spawn_peer().await.unwrap();

    // Both sides hold a stalled attempt until the sweep drops it
    let first = swarm.peer(0);
    wait_for(Duration::from_secs(5), || async move { !first.snapshot().await.unwrap().pending.is_empty() })
        .await
        .unwrap();
    let snapshots = swarm.settle(Duration::from_secs(5)).await.unwrap();
    assert!(snapshots.iter().all(|s| s.incoming.is_empty() && s.outgoing.is_empty()));
    assert!(swarm.connector().closed() >= 2);

    swarm.connector().set_mode(LoopbackMode::Complete);
    swarm.peer(1).announce().await.unwrap();

    let p2 = swarm.peer(1).public_key();
    wait_for(Duration::from_secs(5), || async move { first.snapshot().await.unwrap().outgoing == vec![p2] })
        .await
        .unwrap();

    swarm.shutdown().await.unwrap();
}

#[tokio::test]
async fn bounds_hold_as_swarm_grows() {
    let config = config().with_pending_timeout(Duration::from_millis(500));
    let mut swarm = SwarmHarness::new(config);

    for _ in 0..10 {
        swarm.spawn_peer().await.unwrap();
    }
    let snapshots = swarm.settle(Duration::from_secs(10)).await.unwrap();

    let violations = swarm.check_invariants(&snapshots);
    assert!(violations.is_empty(), "violations: {:?}", violations);

    // Everyone but the first peer found a way in
    assert!(snapshots[0].parents.is_empty());
    for s in &snapshots[1..] {
        assert!(!s.incoming.is_empty(), "{} has no incoming link", s.public_key.short());
        assert!(!s.parents.is_empty());
    }

    swarm.shutdown().await.unwrap();
}

#[tokio::test]
async fn scopes_are_isolated() {
    let mut swarm = SwarmHarness::new(config());
    swarm.spawn_peer().await.unwrap();
    swarm
        .spawn_peer_with(Identity::generate(), config().with_scope("swarm2"))
        .await
        .unwrap();

    let snapshots = swarm.settle(Duration::from_secs(5)).await.unwrap();
    assert!(snapshots.iter().all(|s| s.incoming.is_empty() && s.outgoing.is_empty()));
    assert_eq!(swarm.connector().opened(), 0);

    swarm.spawn_peer().await.unwrap();
    let snapshots = swarm.settle(Duration::from_secs(5)).await.unwrap();
    assert_eq!(snapshots[2].incoming, vec![snapshots[0].public_key]);
    assert!(snapshots[1].outgoing.is_empty());

    swarm.shutdown().await.unwrap();
}

#[tokio::test]
async fn bounds_hold_under_frame_loss() {
    let mut config = config()
        .with_slots(2, 4)
        .with_pending_timeout(Duration::from_millis(300))
        .with_reannounce_interval(Duration::from_millis(200));
    config.sweep_interval_ms = 50;
    let mut swarm = SwarmHarness::new(config).with_chaos(LinkChaos::lossy(0.2).with_seed(7));

    for _ in 0..8 {
        swarm.spawn_peer().await.unwrap();
    }

    for _ in 0..20 {
        let snapshots = swarm.snapshots().await.unwrap();
        let violations = swarm.check_invariants(&snapshots);
        assert!(violations.is_empty(), "violations: {:?}", violations);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    swarm.shutdown().await.unwrap();
}
