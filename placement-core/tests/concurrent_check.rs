use std::sync::{Arc, Barrier};
use std::thread;

use placement_core::operator::{AddPeer, RecordingStepObserver, RemovePeer, TransferLeader};
use placement_core::prelude::*;

const THREADS: usize = 8;

fn move_and_transfer() -> Vec<OpStep> {
    vec![
        AddPeer {
            to_store: StoreId(4),
            peer_id: PeerId(4),
            is_lightweight: false,
        }
        .into(),
        TransferLeader {
            from_store: StoreId(1),
            to_store: StoreId(4),
        }
        .into(),
        RemovePeer {
            from_store: StoreId(1),
            peer_id: None,
            is_down_store: false,
        }
        .into(),
    ]
}

fn snapshot(stores: &[u64], leader: u64) -> RegionInfo {
    let peers = stores.iter().map(|&store| Peer::voter(store, store)).collect();
    RegionInfo::new(1, RegionEpoch::new(1, 1), peers).with_leader(leader)
}

#[test]
fn test_concurrent_checkers_observe_each_step_once() {
    let observer = Arc::new(RecordingStepObserver::new());
    let op = Operator::for_test_builder(
        RegionId(1),
        RegionEpoch::new(1, 1),
        OpKind::REGION | OpKind::LEADER,
        move_and_transfer(),
    )
    .observer(observer.clone())
    .build();
    assert!(op.start());

    let done = snapshot(&[2, 3, 4], 4);
    let barrier = Barrier::new(THREADS);
    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                barrier.wait();
                for _ in 0..50 {
                    let _ = op.check(&done);
                }
            });
        }
    });

    assert_eq!(op.current_step(), 3);
    assert_eq!(op.status(), OpStatus::Success);
    assert_eq!(observer.len(), 3);
    assert_eq!(observer.count_of("add_peer"), 1);
    assert_eq!(observer.count_of("transfer_leader"), 1);
    assert_eq!(observer.count_of("remove_peer"), 1);
    for index in 0..op.len() {
        assert!(op.step_finish_time(index).is_some());
    }
}

#[test]
fn test_cursor_never_moves_backwards_under_mixed_snapshots() {
    let op = Operator::for_test(
        RegionId(1),
        RegionEpoch::new(1, 1),
        OpKind::REGION | OpKind::LEADER,
        move_and_transfer(),
    );
    assert!(op.start());

    // Snapshots at different points of progress, including stale ones.
    let snapshots = [
        snapshot(&[1, 2, 3], 1),
        snapshot(&[1, 2, 3, 4], 1),
        snapshot(&[1, 2, 3, 4], 4),
        snapshot(&[2, 3, 4], 4),
    ];
    thread::scope(|scope| {
        for offset in 0..THREADS {
            let op = &op;
            let snapshots = &snapshots;
            scope.spawn(move || {
                let mut last_seen = 0;
                for round in 0..200 {
                    let region = &snapshots[(round + offset) % snapshots.len()];
                    let _ = op.check(region);
                    let cursor = op.current_step();
                    assert!(cursor >= last_seen, "cursor regressed from {last_seen} to {cursor}");
                    last_seen = cursor;
                }
            });
        }
    });

    assert_eq!(op.current_step(), 3);
    assert!(op.check_success());
}

#[test]
fn test_cancel_racing_final_check_has_single_outcome() {
    for _ in 0..200 {
        let op = Arc::new(Operator::for_test(
            RegionId(1),
            RegionEpoch::new(1, 1),
            OpKind::LEADER,
            vec![
                TransferLeader {
                    from_store: StoreId(1),
                    to_store: StoreId(2),
                }
                .into(),
            ],
        ));
        assert!(op.start());
        let done = snapshot(&[1, 2], 2);
        let barrier = Arc::new(Barrier::new(2));

        let canceled = {
            let op = Arc::clone(&op);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                op.cancel()
            })
        };
        barrier.wait();
        let _ = op.check(&done);
        let canceled = canceled.join().unwrap();

        let status = op.status();
        assert!(
            matches!(status, OpStatus::Canceled | OpStatus::Success),
            "unexpected final status {status}"
        );
        assert_eq!(canceled, status == OpStatus::Canceled);
        let reached_cancel = op.reach_time_of(OpStatus::Canceled).is_some();
        let reached_success = op.reach_time_of(OpStatus::Success).is_some();
        assert!(reached_cancel ^ reached_success);
    }
}

#[test]
fn test_operator_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Operator>();
    assert_send_sync::<OpRecord>();
}
