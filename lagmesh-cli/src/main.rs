//! `lagmesh`: give every pair of local peers its own network latency.
//!
//! ```text
//! sudo lagmesh 4 --min 20 --max 120 --seed 7
//! sudo lagmesh --teardown
//! lagmesh 3 --dry-run
//! ```

use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use lagmesh::{teardown, DelayBounds, Emulation, ShapingConfig};
use lagmesh_tc::{CommandPort, MemoryPort, PortError, TcCommand, TcOperation};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lagmesh")]
#[command(about = "Emulate pairwise latency between local peers with tc")]
#[command(version)]
struct Cli {
    /// Number of peers; peer `i` uses port `base-port + i`
    #[arg(required_unless_present = "teardown")]
    users: Option<usize>,

    /// Minimum one-way delay in milliseconds
    #[arg(long, default_value_t = lagmesh::config::DEFAULT_MIN_DELAY_MS)]
    min: u32,

    /// Maximum one-way delay in milliseconds
    #[arg(long, default_value_t = lagmesh::config::DEFAULT_MAX_DELAY_MS)]
    max: u32,

    /// Interface to shape
    #[arg(short, long, default_value = "lo")]
    dev: String,

    /// Port of peer 0
    #[arg(long, default_value_t = lagmesh::config::DEFAULT_BASE_PORT)]
    base_port: u16,

    /// Queue limit of every delay shaper, in packets
    #[arg(long, default_value_t = lagmesh_tc::op::DEFAULT_NETEM_LIMIT)]
    netem_limit: u32,

    /// Seed for a reproducible delay matrix
    #[arg(long)]
    seed: Option<u64>,

    /// How operations reach the kernel
    #[arg(long, value_enum, default_value_t = Backend::Tc)]
    backend: Backend,

    /// Print the tc commands instead of running them
    #[arg(long)]
    dry_run: bool,

    /// Remove the shaping tree from the interface and exit
    #[arg(long, conflicts_with = "users")]
    teardown: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Run the `tc` utility
    Tc,
    /// Send rtnetlink requests (Linux only)
    Netlink,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr; stdout only carries the matrix and dry-run commands.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut port = open_port(cli)?;

    if cli.teardown {
        teardown(&mut port)?;
        print_dry_run(cli, &*port);
        return Ok(ExitCode::SUCCESS);
    }

    // `required_unless_present` guarantees a peer count without `--teardown`.
    let peers = cli.users.ok_or("missing number of peers")?;
    let config = shaping_config(cli);
    let emulation = Emulation::new(peers, DelayBounds::new(cli.min, cli.max), config)?;

    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    info!(peers, min = cli.min, max = cli.max, dev = %cli.dev, "applying latency emulation");
    let applied = emulation.apply(&mut port, &mut rng)?;

    println!("{}", applied.matrix);
    print_dry_run(cli, &*port);

    match applied.build {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            error!("{e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn shaping_config(cli: &Cli) -> ShapingConfig {
    ShapingConfig::default().with_base_port(cli.base_port).with_netem_limit(cli.netem_limit)
}

/// The port selected by `--backend` and `--dry-run`.
fn open_port(cli: &Cli) -> Result<Box<dyn Port>, PortError> {
    if cli.dry_run {
        return Ok(Box::new(MemoryPort::new(cli.dev.as_str())));
    }

    match cli.backend {
        Backend::Tc => Ok(Box::new(TcCommand::new(cli.dev.as_str()))),
        #[cfg(target_os = "linux")]
        Backend::Netlink => Ok(Box::new(lagmesh_tc::netlink::NetlinkPort::new(cli.dev.as_str())?)),
        #[cfg(not(target_os = "linux"))]
        Backend::Netlink => Err(PortError::Rejected {
            reason: "the netlink backend is only available on Linux".to_string(),
        }),
    }
}

/// A [`CommandPort`] that can hand out the operations it recorded, if it records any.
trait Port: CommandPort {
    fn recorded(&self) -> Option<&[TcOperation]> {
        None
    }
}

impl Port for TcCommand {}

impl Port for MemoryPort {
    fn recorded(&self) -> Option<&[TcOperation]> {
        Some(self.log())
    }
}

#[cfg(target_os = "linux")]
impl Port for lagmesh_tc::netlink::NetlinkPort {}

fn print_dry_run(cli: &Cli, port: &dyn Port) {
    if let Some(ops) = port.recorded() {
        for op in ops {
            println!("{}", op.command_line(&cli.dev));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["lagmesh", "4"]).unwrap();
        assert_eq!(cli.users, Some(4));
        assert_eq!(cli.min, 50);
        assert_eq!(cli.max, 150);
        assert_eq!(cli.dev, "lo");
        assert_eq!(cli.base_port, 10_000);
        assert_eq!(cli.netem_limit, 1_000);
        assert_eq!(shaping_config(&cli), ShapingConfig::default());
        assert_eq!(cli.backend, Backend::Tc);
        assert!(!cli.dry_run && !cli.teardown && !cli.verbose);
    }

    #[test]
    fn peers_required_unless_teardown() {
        assert!(Cli::try_parse_from(["lagmesh"]).is_err());

        let cli = Cli::try_parse_from(["lagmesh", "--teardown", "-d", "eth0"]).unwrap();
        assert!(cli.teardown);
        assert_eq!(cli.users, None);
        assert_eq!(cli.dev, "eth0");

        assert!(Cli::try_parse_from(["lagmesh", "3", "--teardown"]).is_err());
    }

    #[test]
    fn all_flags() {
        let cli = Cli::try_parse_from([
            "lagmesh",
            "3",
            "--min",
            "5",
            "--max",
            "9",
            "--base-port",
            "20000",
            "--seed",
            "42",
            "--backend",
            "netlink",
            "--dry-run",
            "-v",
        ])
        .unwrap();
        assert_eq!((cli.min, cli.max, cli.base_port, cli.seed), (5, 9, 20_000, Some(42)));
        assert_eq!(cli.backend, Backend::Netlink);
        assert!(cli.dry_run && cli.verbose);
    }

    #[test]
    fn dry_run_records_the_tree() {
        let cli = Cli::try_parse_from(["lagmesh", "2", "--dry-run", "--seed", "1"]).unwrap();
        let mut port = open_port(&cli).unwrap();
        let emulation =
            Emulation::new(2, DelayBounds::new(cli.min, cli.max), ShapingConfig::default()).unwrap();
        let applied = emulation.apply(&mut port, &mut StdRng::seed_from_u64(1)).unwrap();

        assert!(applied.build.unwrap().is_clean());
        let ops = port.recorded().unwrap();
        assert_eq!(ops.len(), 1 + 2 + 2 + 4 + 4);
        assert_eq!(ops[0].command_line("lo"), "tc qdisc add dev lo root handle 1: prio bands 3");
    }

    #[test]
    fn dry_run_teardown_of_nothing_fails() {
        let cli = Cli::try_parse_from(["lagmesh", "--teardown", "--dry-run"]).unwrap();
        let mut port = open_port(&cli).unwrap();
        assert!(teardown(&mut port).is_err());
    }

    #[test]
    fn netem_limit_reaches_the_shapers() {
        let cli =
            Cli::try_parse_from(["lagmesh", "2", "--dry-run", "--netem-limit", "50"]).unwrap();
        let mut port = open_port(&cli).unwrap();
        let emulation =
            Emulation::new(2, DelayBounds::fixed(10), shaping_config(&cli)).unwrap();
        emulation.apply(&mut port, &mut StdRng::seed_from_u64(0)).unwrap();

        let shapers: Vec<_> = port
            .recorded()
            .unwrap()
            .iter()
            .filter(|op| matches!(op, TcOperation::AddNetem { .. }))
            .map(|op| op.command_line("lo"))
            .collect();
        assert_eq!(shapers.len(), 4);
        assert!(shapers.iter().all(|line| line.contains("netem limit 50 delay")));
    }
}
