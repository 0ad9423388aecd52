use lagmesh::{
    handle::all_majors, plan::ShapingPlan, reset, teardown, DelayBounds, Emulation, ResetOutcome,
    ShapingConfig,
};
use lagmesh_tc::{port::QdiscKind, Handle, MemoryPort};
use rand::{rngs::StdRng, SeedableRng};

#[test]
fn every_pair_gets_its_delay() {
    let _ = tracing_subscriber::fmt::try_init();

    let config = ShapingConfig::default();
    for peers in [1, 2, 5, 16] {
        let emulation = Emulation::new(peers, DelayBounds::default(), config).unwrap();
        let mut port = MemoryPort::new("lo");
        let applied = emulation.apply(&mut port, &mut StdRng::seed_from_u64(peers as u64)).unwrap();
        let report = applied.build.unwrap();

        assert!(report.is_clean());
        assert_eq!(port.node_count(), 1 + peers + peers * peers);
        let majors: Vec<u16> = port.qdiscs().map(|node| node.handle.major()).collect();
        let mut expected: Vec<u16> = all_majors(peers as u32).map(|m| m as u16).collect();
        expected.sort_unstable();
        assert_eq!(majors, expected);

        for i in 0..peers {
            for j in 0..peers {
                let leaf = port
                    .classify(config.port_of(i).unwrap(), config.port_of(j).unwrap())
                    .unwrap();
                let QdiscKind::Netem { delay_ms, .. } = leaf.kind else {
                    panic!("{i} → {j} did not reach a shaper")
                };
                assert_eq!(delay_ms, applied.matrix.get(i, j));
            }
        }
    }
}

#[test]
fn reset_build_reset_build() {
    let emulation = Emulation::new(4, DelayBounds::fixed(25), ShapingConfig::default()).unwrap();
    let mut port = MemoryPort::new("lo");
    let mut rng = StdRng::seed_from_u64(11);

    assert_eq!(reset(&mut port), ResetOutcome::Absent);
    assert_eq!(reset(&mut port), ResetOutcome::Absent);

    let first = emulation.apply(&mut port, &mut rng).unwrap();
    let count = port.node_count();
    let second = emulation.apply(&mut port, &mut rng).unwrap();

    assert_eq!(first.matrix, second.matrix);
    assert_eq!(second.reset, ResetOutcome::Removed);
    assert_eq!(port.node_count(), count);

    teardown(&mut port).unwrap();
    assert!(port.is_empty());
    assert!(teardown(&mut port).is_err());
}

#[test]
fn unrelated_traffic_is_not_shaped() {
    let emulation = Emulation::new(2, DelayBounds::fixed(10), ShapingConfig::default()).unwrap();
    let mut port = MemoryPort::new("lo");
    emulation.apply(&mut port, &mut StdRng::seed_from_u64(0)).unwrap();

    // Neither port belongs to a peer.
    assert!(port.classify(443, 51_000).is_none());
    // A peer talking to a non-peer port stops at its source classifier.
    assert!(port.classify(10_000, 443).is_none());
    assert_eq!(port.root().unwrap().handle, Handle(1));
}

#[test]
fn plan_matches_tree() {
    let config = ShapingConfig::default();
    let emulation = Emulation::new(3, DelayBounds::new(1, 9), config).unwrap();
    let mut port = MemoryPort::new("lo");
    let applied = emulation.apply(&mut port, &mut StdRng::seed_from_u64(5)).unwrap();

    let plan = ShapingPlan::new(&applied.matrix, &config).unwrap();
    // Deleting the absent root was rejected, so only the build is logged.
    assert_eq!(port.log(), plan.operations(&config).collect::<Vec<_>>().as_slice());
}
