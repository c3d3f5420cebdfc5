//! Proof-producing translation of structured-statement programs into a
//! monadic intermediate language.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

pub mod ast;
pub mod build;
mod call;
pub mod callgraph;
pub mod driver;
pub mod error;
pub mod finish;
pub mod format;
pub mod monad;
pub mod orchestrate;
pub mod proof;
pub mod reader;
pub mod schedule;
#[cfg(test)]
pub(crate) mod test_support;
pub mod theory;
pub mod translate;
pub mod types;

pub fn stat(s: &'static str) {
  *STATS.lock().unwrap().get_or_insert_with(HashMap::new).entry(s).or_default() += 1;
}

#[macro_export]
macro_rules! vprintln {
  ($($args:tt)*) => {
    if $crate::verbose() {
      eprintln!($($args)*)
    }
  };
}

static VERBOSE: AtomicBool = AtomicBool::new(false);
pub fn verbose() -> bool { VERBOSE.load(std::sync::atomic::Ordering::SeqCst) }
pub fn set_verbose(b: bool) { VERBOSE.store(b, std::sync::atomic::Ordering::SeqCst) }

static STATS: Mutex<Option<HashMap<&'static str, u32>>> = Mutex::new(None);

/// The current value of a statistics counter.
pub fn stat_count(s: &'static str) -> u32 {
  STATS.lock().unwrap().as_ref().and_then(|m| m.get(s).copied()).unwrap_or(0)
}

pub fn print_stats() {
  let mut g = STATS.lock().unwrap();
  let mut vec: Vec<_> = g.get_or_insert_with(HashMap::new).iter().collect();
  vec.sort();
  for (s, i) in vec {
    println!("{s}: {i}");
  }
}

pub fn print_stats_and_exit() {
  print_stats();
  std::process::exit(0)
}

#[derive(Clone, Debug)]
pub struct Config {
  /// Prove total correctness: the statement side must terminate whenever the
  /// monadic side does
  pub check_termination: bool,
  /// Run the peephole and optimizing exception rule sets
  pub optimize: bool,
  /// Collect rewrite traces
  pub trace: bool,
  pub parallelism: usize,
  pub panic_on_fail: bool,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      check_termination: true,
      optimize: true,
      trace: false,
      parallelism: num_cpus::get(),
      panic_on_fail: false,
    }
  }
}

impl Config {
  /// Apply the `NO_OPTIMIZE`, `NO_TERMINATION`, `TRACE`, `PANIC_ON_FAIL` and
  /// `ONE_THREAD` environment overrides.
  pub fn with_env_overrides(mut self) -> Self {
    self.optimize &= std::env::var("NO_OPTIMIZE").is_err();
    self.check_termination &= std::env::var("NO_TERMINATION").is_err();
    self.trace |= std::env::var("TRACE").is_ok();
    self.panic_on_fail |= std::env::var("PANIC_ON_FAIL").is_ok();
    if std::env::var("ONE_THREAD").is_ok() {
      self.parallelism = 1
    }
    self
  }
}
