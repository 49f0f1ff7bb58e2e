mod scenarios;

use std::process;

use clap::Parser;
use itertools::Itertools;
use thenable::{Drain, MicrotaskQueue, QueueConfig, RejectionTracker, TrackerConfig};
use tracing_subscriber::EnvFilter;

use crate::scenarios::Scenario;

/// Run the deferred value conformance scenarios
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// Only run the scenarios with these names
  #[arg(short, long)]
  pub scenario: Vec<String>,
  /// Maximum number of microtasks a scenario may run
  #[arg(long)]
  pub gas: Option<usize>,
  /// Report rejections that no continuation handled
  #[arg(long)]
  pub track_rejections: bool,
  /// Log filter in `RUST_LOG` syntax, overrides the environment
  #[arg(long)]
  pub log: Option<String>,
  /// Print the scenario names and exit
  #[arg(long)]
  pub list: bool,
}
impl Args {
  /// Check that every requested scenario exists
  pub fn chk_scenarios(&self, known: &[Scenario]) -> Result<(), String> {
    let missing = (self.scenario.iter())
      .filter(|s| !known.iter().any(|k| k.name == s.as_str()))
      .collect_vec();
    if missing.is_empty() {
      return Ok(());
    }
    Err(format!(
      "unknown scenario {}, expected one of {}",
      missing.iter().join(", "),
      known.iter().map(|k| k.name).join(", ")
    ))
  }
}

fn init_logging(directive: Option<&str>) {
  let filter = match directive {
    Some(d) => EnvFilter::new(d),
    None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
  };
  tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Run one scenario on a fresh queue. Returns whether it settled as expected.
fn run(scenario: &Scenario, args: &Args) -> bool {
  let queue = MicrotaskQueue::with_config(QueueConfig { gas: args.gas });
  let tracker =
    args.track_rejections.then(|| RejectionTracker::enable(TrackerConfig { all_rejections: true }));
  let out = (scenario.build)(&queue);
  let drain = queue.run_until_idle();
  let (got, expected) = (out.state(), (scenario.expect)());
  let ok = got == expected;
  let status = if ok { "ok" } else { "FAIL" };
  println!("{status:>4} {}: {} => {got:?}", scenario.name, scenario.about);
  if !ok {
    println!("     expected {expected:?}");
  }
  match drain {
    Drain::Idle(n) => println!("     {n} tasks"),
    Drain::OutOfGas => println!("     ran out of gas with {} tasks waiting", queue.len()),
  }
  if let Some(tracker) = tracker {
    for u in tracker.report() {
      println!("     unhandled rejection of deferred #{}: {}", u.id, u.reason)
    }
  }
  ok
}

pub fn main() {
  let args = Args::parse();
  init_logging(args.log.as_deref());
  let all = scenarios::all();
  if args.list {
    for s in all.iter() {
      println!("{:<16} {}", s.name, s.about)
    }
    return;
  }
  args.chk_scenarios(&all).unwrap_or_else(|e| {
    eprintln!("{e}");
    process::exit(2)
  });
  let selected = (all.iter())
    .filter(|s| args.scenario.is_empty() || args.scenario.iter().any(|n| n == s.name))
    .collect_vec();
  let failed = selected.iter().filter(|s| !run(s, &args)).count();
  println!("{} passed, {failed} failed", selected.len() - failed);
  if failed != 0 {
    process::exit(1);
  }
}
