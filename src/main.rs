use clap::Parser;
use corres_lift::error::TranslateError;
use corres_lift::finish::TraceRecord;
use corres_lift::format::render_term;
use corres_lift::orchestrate::{
  translate_all, translate_all_parallel, FunctionInfo, NamingScheme, Options, ProgramInfo,
  TraceCallback,
};
use corres_lift::reader::Program;
use corres_lift::theory::{DefinitionStore, Theory};
use corres_lift::types::*;
use corres_lift::{print_stats, print_stats_and_exit, set_verbose, stat, Config};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::PathBuf;

/// Translate the functions of a program into the monadic language, proving
/// each translation correct.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
  /// The program description (JSON)
  program: PathBuf,
  /// Skip the peephole and optimizing exception rewrites
  #[arg(long)]
  no_optimize: bool,
  /// Prove partial instead of total correspondence
  #[arg(long)]
  no_termination: bool,
  /// Print the rewrite steps of every pass
  #[arg(long)]
  trace: bool,
  /// Number of worker threads (default: number of CPUs)
  #[arg(short, long)]
  jobs: Option<usize>,
  /// Prefix of the generated constants
  #[arg(long, default_value = "l1_")]
  prefix: String,
  #[arg(long)]
  panic_on_fail: bool,
  #[arg(long)]
  no_progress: bool,
  #[arg(short, long)]
  verbose: bool,
}

impl Args {
  fn config(&self) -> Config {
    let mut cfg = Config::default();
    cfg.optimize &= !self.no_optimize;
    cfg.check_termination &= !self.no_termination;
    cfg.trace |= self.trace;
    cfg.panic_on_fail |= self.panic_on_fail;
    if let Some(n) = self.jobs {
      cfg.parallelism = n
    }
    cfg.with_env_overrides()
  }
}

fn progress_bar(num_clusters: usize, enabled: bool) -> Option<ProgressBar> {
  if !enabled {
    return None
  }
  let target = ProgressDrawTarget::stderr_with_hz(5);
  let bar = ProgressBar::with_draw_target(Some(num_clusters as u64), target);
  if bar.is_hidden() {
    return None
  }
  let template = "{msg:10} [{pos:>5}/{len:5}] {wide_bar} {elapsed_precise}";
  let style = ProgressStyle::with_template(template);
  bar.set_style(style.unwrap_or_else(|_| ProgressStyle::default_bar()));
  bar.set_message("clusters");
  Some(bar)
}

fn print_trace(id: ClusterId, label: &str, record: &TraceRecord) {
  println!("cluster {id:?}, {label}: {} steps", record.steps.len());
  for step in &record.steps {
    println!("  {step:?}")
  }
}

fn print_function(thy: &Theory, f: &FunctionInfo) {
  let Some(t) = &f.translation else { return };
  let names = |k| thy.name(k);
  println!("{} = {}", t.const_name, render_term(&t.term, &names));
  println!("  {:?}", t.thm);
  if let Some(mono) = &t.mono {
    println!("  {mono:?}")
  }
}

fn fail(file: &str, cfg: &Config, e: &TranslateError) {
  e.report(file);
  if cfg.panic_on_fail {
    std::process::abort()
  }
}

fn main() {
  let args = Args::parse();
  set_verbose(args.verbose);
  let cfg = args.config();
  ctrlc::set_handler(print_stats_and_exit).expect("Error setting Ctrl-C handler");

  let program = match Program::read(&args.program) {
    Ok(p) => p,
    Err(e) => {
      e.report(&args.program.display().to_string());
      std::process::exit(2)
    }
  };
  let file = program.file.clone();
  let (info, current) = ProgramInfo::new(program, &Default::default());
  let progress = progress_bar(info.graph.clusters.len(), !args.no_progress);
  let opts = Options {
    check_termination: cfg.check_termination,
    optimize: cfg.optimize,
    trace: cfg.trace,
    naming: NamingScheme { prefix: args.prefix.clone() },
    on_trace: if cfg.trace { Some(&print_trace as &TraceCallback) } else { None },
  };

  let mut failed = 0;
  let (thy, functions) = if cfg.parallelism <= 1 {
    let mut it = translate_all(&info, current.clone(), &Default::default(), opts, Theory::new());
    for r in &mut it {
      if let Err(e) = r {
        failed += 1;
        fail(&file, &cfg, &e)
      }
      if let Some(bar) = &progress {
        bar.inc(1)
      }
    }
    it.into_state()
  } else {
    let prior = Default::default();
    let out =
      translate_all_parallel(&info, current.clone(), &prior, &opts, Theory::new(), cfg.parallelism);
    for (_, e) in &out.errors {
      failed += 1;
      fail(&file, &cfg, e)
    }
    (out.store, out.functions)
  };
  if let Some(bar) = progress {
    bar.finish_and_clear()
  }

  for f in functions.values().filter(|f| current.contains_key(&f.name)) {
    if let Some(t) = &f.translation {
      t.warnings.iter().for_each(|w| w.report(&file));
    } else {
      stat("untranslated")
    }
    print_function(&thy, f)
  }
  print_stats();
  if failed > 0 {
    std::process::exit(1)
  }
}
