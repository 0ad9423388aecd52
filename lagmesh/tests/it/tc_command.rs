//! Drives [`TcCommand`] with a stand-in `tc` script that records its arguments.

use std::{fs, os::unix::fs::PermissionsExt as _};

use lagmesh::{plan::ShapingPlan, DelayBounds, Emulation, ResetOutcome, ShapingConfig};
use lagmesh_tc::port::TcCommand;
use rand::{rngs::StdRng, SeedableRng};
use tempfile::TempDir;

/// A scratch directory holding a fake `tc` that appends each invocation to `calls.log`.
///
/// The fake refuses `qdisc del` like the real utility does on an interface without a root qdisc.
struct FakeTc {
    dir: TempDir,
}

impl FakeTc {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();

        let script = format!(
            "#!/bin/sh\n\
             if [ \"$1 $2\" = \"qdisc del\" ]; then\n\
             \techo 'Error: Cannot delete qdisc with handle of zero.' >&2\n\
             \texit 2\n\
             fi\n\
             echo \"$@\" >> '{}'\n",
            dir.path().join("calls.log").display()
        );
        let program = dir.path().join("tc");
        fs::write(&program, script).unwrap();
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();

        Self { dir }
    }

    fn program(&self) -> String {
        self.dir.path().join("tc").display().to_string()
    }

    fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

#[test]
fn issues_one_tc_call_per_node_and_rule() {
    let fake = FakeTc::new();
    let mut port = TcCommand::new("lo").with_program(fake.program());
    let config = ShapingConfig::default();

    let emulation = Emulation::new(2, DelayBounds::fixed(10), config).unwrap();
    let applied = emulation.apply(&mut port, &mut StdRng::seed_from_u64(0)).unwrap();

    assert_eq!(applied.reset, ResetOutcome::Absent);
    assert!(applied.build.unwrap().is_clean());

    let expected: Vec<String> = ShapingPlan::new(&applied.matrix, &config)
        .unwrap()
        .operations(&config)
        .map(|op| op.args("lo").join(" "))
        .collect();
    let calls = fake.calls();
    assert_eq!(calls, expected);
    assert_eq!(calls.len(), 1 + 2 + 4 + 2 + 4);
    assert_eq!(calls[0], "qdisc add dev lo root handle 1: prio bands 3");
    assert_eq!(
        calls[2],
        "filter add dev lo protocol ip parent 1: prio 1 u32 match ip sport 10000 0xffff flowid 1:1"
    );
    assert!(calls.contains(&"qdisc add dev lo parent 2:2 handle 5: netem delay 10ms".to_string()));
}

#[test]
fn failing_tc_aborts_at_the_root() {
    let mut port = TcCommand::new("lo").with_program("false");
    let emulation = Emulation::new(3, DelayBounds::default(), ShapingConfig::default()).unwrap();
    let applied = emulation.apply(&mut port, &mut StdRng::seed_from_u64(0)).unwrap();

    assert_eq!(applied.reset, ResetOutcome::Ignored);
    let err = applied.build.unwrap_err();
    let report = err.report().unwrap();
    assert!(report.created.is_empty());
    assert_eq!(report.not_created.len(), 1 + 3 + 9);
    // The matrix is still there to print.
    assert_eq!(applied.matrix.len(), 3);
}
