//! The group-level orchestrator: translates the clusters of the call graph in
//! dependency order and registers each cluster's definitions in one step.

use crate::ast::Env;
use crate::callgraph::{analyze, CallGraph};
use crate::driver::{translate_function, Assembled, DriverCtx};
use crate::error::{TranslateError, Warning};
use crate::finish::TraceRecord;
use crate::monad::MTerm;
use crate::proof::{close_cluster, mono_cluster, Binding, Member, Theorem};
use crate::reader::Program;
use crate::schedule::{run_ordered, Flow};
use crate::theory::DefinitionStore;
use crate::types::*;
use crate::{stat, vprintln};
use itertools::izip;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Per-function metadata. Created by the call-graph analysis with
/// `translation` empty, filled in once the function's cluster is registered,
/// and never changed afterwards.
#[derive(Clone, Debug)]
pub struct FunctionInfo {
  pub name: Name,
  pub proc: Name,
  pub callees: BTreeSet<Name>,
  /// Callees in the same cluster. Before translation this is the call-graph
  /// estimate, afterwards the calls that really are recursive call sites.
  pub rec_callees: BTreeSet<Name>,
  pub wrapper: bool,
  /// The function takes a measure argument
  pub measured: bool,
  pub return_slot: Option<Name>,
  pub translation: Option<Arc<Translation>>,
}

#[derive(Clone, Debug)]
pub struct Translation {
  pub konst: ConstId,
  pub const_name: Name,
  /// The registered definition of `konst`
  pub term: MTerm,
  /// `corres ct Γ konst (Call proc)`
  pub thm: Theorem,
  /// Monotonicity in the measure, for measured functions
  pub mono: Option<Theorem>,
  pub callee_consts: BTreeMap<Name, ConstId>,
  pub warnings: Vec<Warning>,
  pub traces: Vec<TraceRecord>,
}

#[derive(Clone, Debug)]
pub struct NamingScheme {
  pub prefix: String,
}

impl Default for NamingScheme {
  fn default() -> Self { NamingScheme { prefix: "l1_".into() } }
}

impl NamingScheme {
  pub fn const_name(&self, func: &str) -> Name { format!("{}{func}'", self.prefix).into() }
}

/// Called with the cluster, the pass label and the pass's rewrite trace.
pub type TraceCallback = dyn Fn(ClusterId, &str, &TraceRecord) + Sync;

#[derive(Default)]
pub struct Options<'a> {
  pub check_termination: bool,
  pub optimize: bool,
  pub trace: bool,
  pub naming: NamingScheme,
  pub on_trace: Option<&'a TraceCallback>,
}

/// What the orchestrator needs to know about the program being translated.
pub struct ProgramInfo {
  pub file: Name,
  pub env: Arc<Env>,
  /// procedure constant to function name, for new and prior functions
  pub proc_names: HashMap<Name, Name>,
  pub graph: CallGraph,
}

impl ProgramInfo {
  /// Analyze the call graph of `program`. Returns the new functions alongside.
  pub fn new(
    program: Program, prior: &im::OrdMap<Name, FunctionInfo>,
  ) -> (ProgramInfo, im::OrdMap<Name, FunctionInfo>) {
    let a = analyze(&program.env, &program.functions, prior);
    let (n, k) = (a.functions.len(), a.graph.clusters.len());
    vprintln!("{}: {n} functions in {k} clusters", program.file);
    let (file, env) = (program.file, program.env);
    let info = ProgramInfo { file, env, proc_names: a.proc_names, graph: a.graph };
    (info, a.functions)
  }

  fn driver<'a>(
    &'a self, functions: &'a im::OrdMap<Name, FunctionInfo>, opts: &Options<'_>,
  ) -> DriverCtx<'a> {
    DriverCtx {
      env: &self.env,
      proc_names: &self.proc_names,
      functions,
      check_termination: opts.check_termination,
      optimize: opts.optimize,
      trace: opts.trace,
    }
  }
}

/// Run the function-level driver on every member of a cluster. The `i`th
/// member gets measure variable `i`.
fn translate_cluster(
  program: &ProgramInfo, functions: &im::OrdMap<Name, FunctionInfo>, opts: &Options<'_>,
  id: ClusterId,
) -> Result<Vec<Assembled>, TranslateError> {
  let ctx = program.driver(functions, opts);
  let members = &program.graph.clusters[id];
  vprintln!("cluster {id:?}: {members:?}");
  (members.iter().enumerate())
    .map(|(i, func)| {
      let a = translate_function(&ctx, func, MeasureVar::from_usize(i))?;
      if let Some(cb) = opts.on_trace {
        a.traces.iter().for_each(|r| cb(id, r.label, r))
      }
      Ok(a)
    })
    .collect()
}

/// Register a translated cluster. Works on a copy of the store and returns it
/// only if every member was registered, together with the updated infos.
fn commit_cluster<S: DefinitionStore + Clone>(
  store: &S, functions: &im::OrdMap<Name, FunctionInfo>, naming: &NamingScheme,
  assembled: Vec<Assembled>,
) -> Result<(S, Vec<FunctionInfo>), TranslateError> {
  let mut next = store.clone();
  let konsts = (assembled.iter())
    .map(|a| next.reserve(naming.const_name(&a.name)))
    .collect::<Result<Vec<_>, _>>()?;
  let siblings: HashMap<&Name, ConstId> =
    assembled.iter().map(|a| &a.name).zip(konsts.iter().copied()).collect();

  let mut members = vec![];
  let mut callee_consts = vec![];
  for (a, &konst) in assembled.iter().zip(&konsts) {
    let mut bindings = HashMap::new();
    let mut consts = BTreeMap::new();
    for &p in a.thm.hyps().keys() {
      let e = &a.table.entries[p];
      let (binding, k) = if e.recursive {
        let Some(&k) = siblings.get(&e.func) else { continue };
        (Binding::Sibling(k), k)
      } else {
        let t = functions.get(&e.func).and_then(|f| f.translation.as_ref());
        let Some(t) = t else { continue };
        (Binding::Defined(&t.thm), t.konst)
      };
      consts.insert(e.func.clone(), k);
      bindings.insert(p, binding);
    }
    members.push(Member { thm: a.thm.clone(), konst, bindings });
    callee_consts.push(consts)
  }
  let func = assembled.first().map(|a| a.name.clone());
  let proof_err = |err| TranslateError::Proof { func: func.clone(), err };
  let closed = close_cluster(members).map_err(proof_err)?;
  let (ct, env) = match closed.thms.first() {
    Some(thm) => (thm.ct(), thm.env().clone()),
    None => return Ok((next, vec![])),
  };
  let terms: Vec<MTerm> = closed.defs.iter().map(|(_, t)| t.clone()).collect();
  let thms = closed.thms.clone();
  next.commit(closed.defs, closed.thms)?;

  let measured = assembled.iter().any(|a| functions.get(&a.name).map_or(false, |f| f.measured));
  let monos: Vec<Option<Theorem>> = if measured {
    let conj = mono_cluster(ct, &env, &konsts, |k| next.get(k).and_then(|d| d.body.as_ref()));
    conj.and_then(|thm| thm.split()).map_err(proof_err)?.into_iter().map(Some).collect()
  } else {
    vec![None; assembled.len()]
  };

  let mut infos = vec![];
  let parts = izip!(assembled, konsts, terms, thms, monos, callee_consts);
  for (a, konst, term, thm, mono, callee_consts) in parts {
    let not_found = || TranslateError::FunctionNotFound(a.name.clone());
    let mut info = functions.get(&a.name).cloned().ok_or_else(not_found)?;
    info.rec_callees = a.realized_rec_callees;
    info.translation = Some(Arc::new(Translation {
      konst,
      const_name: naming.const_name(&a.name),
      term,
      thm,
      mono,
      callee_consts,
      warnings: a.warnings,
      traces: a.traces,
    }));
    infos.push(info)
  }
  stat("cluster defined");
  Ok((next, infos))
}

fn translate_and_commit<S: DefinitionStore + Clone>(
  program: &ProgramInfo, functions: &im::OrdMap<Name, FunctionInfo>, opts: &Options<'_>,
  store: &S, id: ClusterId,
) -> Result<(S, Vec<FunctionInfo>), TranslateError> {
  let assembled = translate_cluster(program, functions, opts, id)?;
  commit_cluster(store, functions, &opts.naming, assembled)
}

fn record_failure(id: ClusterId, e: &TranslateError) {
  stat("function failed");
  vprintln!("cluster {id:?} failed: {e}");
}

/// The lazy sequence returned by [`translate_all`]: one item per cluster, in
/// dependency order. A failed cluster leaves the store untouched; after a
/// fatal error the sequence ends.
pub struct TranslateAll<'a, S> {
  program: &'a ProgramInfo,
  opts: Options<'a>,
  store: S,
  functions: im::OrdMap<Name, FunctionInfo>,
  next: usize,
  stopped: bool,
}

/// Translate `current` (the new functions of `program`) on top of `prior`,
/// the functions translated before, registering into `store`.
pub fn translate_all<'a, S: DefinitionStore + Clone>(
  program: &'a ProgramInfo, current: im::OrdMap<Name, FunctionInfo>,
  prior: &im::OrdMap<Name, FunctionInfo>, opts: Options<'a>, store: S,
) -> TranslateAll<'a, S> {
  let functions = current.union(prior.clone());
  TranslateAll { program, opts, store, functions, next: 0, stopped: false }
}

impl<S> TranslateAll<'_, S> {
  /// The store and function table after the clusters consumed so far.
  pub fn into_state(self) -> (S, im::OrdMap<Name, FunctionInfo>) { (self.store, self.functions) }
}

impl<S: DefinitionStore + Clone> Iterator for TranslateAll<'_, S> {
  type Item = Result<(S, im::OrdMap<Name, FunctionInfo>), TranslateError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.stopped || self.next >= self.program.graph.clusters.len() {
      return None
    }
    let id = ClusterId::from_usize(self.next);
    self.next += 1;
    match translate_and_commit(self.program, &self.functions, &self.opts, &self.store, id) {
      Ok((store, infos)) => {
        self.store = store;
        for info in infos {
          self.functions.insert(info.name.clone(), info);
        }
        Some(Ok((self.store.clone(), self.functions.clone())))
      }
      Err(e) => {
        record_failure(id, &e);
        self.stopped = e.is_fatal();
        Some(Err(e))
      }
    }
  }
}

pub struct ParallelOutcome<S> {
  pub store: S,
  pub functions: im::OrdMap<Name, FunctionInfo>,
  pub errors: Vec<(ClusterId, TranslateError)>,
}

/// Like [`translate_all`], but translates independent clusters on
/// `parallelism` worker threads. Registration stays serialized, in an order
/// compatible with the dependencies.
pub fn translate_all_parallel<S: DefinitionStore + Clone + Send>(
  program: &ProgramInfo, current: im::OrdMap<Name, FunctionInfo>,
  prior: &im::OrdMap<Name, FunctionInfo>, opts: &Options<'_>, store: S, parallelism: usize,
) -> ParallelOutcome<S> {
  let state = ParallelOutcome { store, functions: current.union(prior.clone()), errors: vec![] };
  run_ordered(
    &program.graph.deps,
    parallelism,
    state,
    |st, _| st.functions.clone(),
    |id, functions| {
      let r = translate_cluster(program, &functions, opts, id);
      (functions, r)
    },
    |st, id, (functions, r)| {
      let r = r.and_then(|a| commit_cluster(&st.store, &functions, &opts.naming, a));
      match r {
        Ok((store, infos)) => {
          st.store = store;
          for info in infos {
            st.functions.insert(info.name.clone(), info);
          }
          Flow::Continue
        }
        Err(e) => {
          record_failure(id, &e);
          let fatal = e.is_fatal();
          st.errors.push((id, e));
          if fatal {
            Flow::Stop
          } else {
            Flow::Continue
          }
        }
      }
    },
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::{Expr, Stmt};
  use crate::monad::{CalleeRef, MeasureArg};
  use crate::proof::Prop;
  use crate::reader::FunctionDecl;
  use crate::test_support::*;
  use crate::theory::{StoreError, Theory};

  fn program(procs: &[(&str, Stmt)]) -> (ProgramInfo, im::OrdMap<Name, FunctionInfo>) {
    let functions = (procs.iter())
      .map(|(f, _)| FunctionDecl {
        name: name(f),
        proc: name(&format!("{f}_'proc")),
        return_slot: None,
        wrapper: false,
      })
      .collect();
    let bodies: Vec<_> = procs.iter().map(|(f, s)| (format!("{f}_'proc"), s.clone())).collect();
    let bodies: Vec<_> = bodies.iter().map(|(p, s)| (&**p, s.clone())).collect();
    let program = Program { file: name("test.c"), env: env_with(&bodies), functions };
    ProgramInfo::new(program, &im::OrdMap::new())
  }

  fn opts() -> Options<'static> {
    Options { check_termination: true, optimize: true, ..Options::default() }
  }

  fn translation<'a>(fs: &'a im::OrdMap<Name, FunctionInfo>, f: &str) -> &'a Translation {
    fs[f].translation.as_deref().unwrap()
  }

  /// The single call in a registered body.
  fn call_in(t: &MTerm) -> crate::monad::Callee {
    let mut out = vec![];
    t.callees(&mut |c| out.push(*c));
    assert_eq!(out.len(), 1, "{t:?}");
    out[0]
  }

  fn contains_rec_guard(t: &MTerm) -> bool {
    matches!(t, MTerm::RecGuard { .. }) || t.children().into_iter().any(contains_rec_guard)
  }

  #[test]
  fn plain_calls_use_the_registered_constant() {
    let (prog, current) =
      program(&[("main", Stmt::seq(assign("x", 1), call_stmt("leaf_'proc"))), ("leaf", assign("r", 2))]);
    let results: Vec<_> =
      translate_all(&prog, current, &im::OrdMap::new(), opts(), Theory::new()).collect();
    assert_eq!(results.len(), 2);
    let (thy, fs) = results.into_iter().last().unwrap().unwrap();
    let (main, leaf) = (translation(&fs, "main"), translation(&fs, "leaf"));
    assert_eq!(&*leaf.const_name, "l1_leaf'");
    assert_eq!(thy.lookup("l1_main'"), Some(main.konst));
    let callee = call_in(&main.term);
    assert_eq!(callee.target, CalleeRef::Const(leaf.konst));
    assert_eq!(callee.measure, MeasureArg::Unused);
    assert_eq!(main.callee_consts[&name("leaf")], leaf.konst);
    assert!(!contains_rec_guard(&main.term) && !contains_rec_guard(&leaf.term));
    assert!(main.mono.is_none() && leaf.mono.is_none());
    assert!(matches!(main.thm.prop(), Prop::FnCorres { konst, .. } if *konst == main.konst));
    assert!(main.thm.hyps().is_empty());
  }

  #[test]
  fn mutual_recursion_is_registered_in_one_step() {
    let (prog, current) = program(&[
      ("f", Stmt::cond(Expr::var("c"), call_stmt("g_'proc"), Stmt::Skip)),
      ("g", call_stmt("f_'proc")),
      ("main", call_stmt("f_'proc")),
    ]);
    let mut it = translate_all(&prog, current, &im::OrdMap::new(), opts(), Theory::new());
    let (thy, fs) = it.next().unwrap().unwrap();
    // f and g are defined together, main not yet
    assert_eq!(thy.defined().count(), 2);
    assert!(thy.lookup("l1_main'").is_none());
    let (f, g) = (translation(&fs, "f"), translation(&fs, "g"));
    assert!(matches!(f.term, MTerm::RecGuard { .. }) && matches!(g.term, MTerm::RecGuard { .. }));
    assert_eq!(call_in(&g.term).target, CalleeRef::Const(f.konst));
    assert!(matches!(call_in(&g.term).measure, MeasureArg::Pred(_)));
    assert!(matches!(f.mono.as_ref().unwrap().prop(), Prop::Mono { konst } if *konst == f.konst));
    assert!(fs["f"].rec_callees.contains("g"));

    // main calls into the recursive cluster from outside
    let (_, fs) = it.next().unwrap().unwrap();
    let main = translation(&fs, "main");
    assert_eq!(call_in(&main.term), crate::monad::Callee {
      target: CalleeRef::Const(f.konst),
      measure: MeasureArg::Managed,
    });
    assert!(it.next().is_none());
  }

  #[test]
  fn failed_cluster_leaves_no_trace() {
    let dyn_call = match call_stmt("x_'proc") {
      Stmt::Call { setup, cleanup, result, .. } =>
        Stmt::DynCall { setup, target: Expr::var("fp"), cleanup, result },
      _ => unreachable!(),
    };
    let (prog, current) = program(&[
      ("f", call_stmt("g_'proc")),
      ("g", Stmt::seq(call_stmt("f_'proc"), dyn_call)),
      ("main", call_stmt("f_'proc")),
      ("other", Stmt::Skip),
    ]);
    let mut it = translate_all(&prog, current, &im::OrdMap::new(), opts(), Theory::new());
    let mut errors = vec![];
    for r in &mut it {
      if let Err(e) = r {
        assert!(!e.is_fatal());
        errors.push(e)
      }
    }
    let (thy, fs) = it.into_state();
    // f is never registered without g
    assert!(thy.lookup("l1_f'").is_none() && thy.lookup("l1_g'").is_none());
    assert!(fs["f"].translation.is_none() && fs["g"].translation.is_none());
    assert!(matches!(errors[..], [TranslateError::Unsupported { .. }]));
    assert!(fs["other"].translation.is_some());
    // the call to the failed f is replaced by fail
    let main = translation(&fs, "main");
    assert!(main.term == MTerm::Fail);
    assert_eq!(main.warnings, [Warning::MissingCalleeBody { func: name("main"), callee: name("f") }]);
    assert_eq!(thy.defined().count(), 2);
  }

  #[test]
  fn store_errors_end_the_run() {
    let procs = [("a", assign("x", 1)), ("b", call_stmt("a_'proc"))];
    let (prog, current) = program(&procs);
    let mut thy = Theory::new();
    thy.reserve(name("l1_a'")).unwrap();
    let items: Vec<_> =
      translate_all(&prog, current.clone(), &im::OrdMap::new(), opts(), thy.clone()).collect();
    assert!(matches!(items[..], [Err(TranslateError::Store(StoreError::Duplicate(_)))]));
    assert!(items.iter().all(|r| r.as_ref().is_err_and(|e| e.is_fatal())));

    let out = translate_all_parallel(&prog, current, &im::OrdMap::new(), &opts(), thy, 2);
    assert_eq!(out.errors.len(), 1);
    assert!(out.errors[0].1.is_fatal());
    // b waits on a, so it is never admitted
    assert!(out.functions["a"].translation.is_none() && out.functions["b"].translation.is_none());
    assert_eq!(out.store.len(), 1);
  }

  #[test]
  fn function_tables_hold_translations_out_of_line() {
    // im's B-tree nodes store entries inline
    assert!(std::mem::size_of::<FunctionInfo>() <= 256);
    let procs: Vec<(String, Stmt)> = (0..200).map(|i| (format!("f{i}"), assign("x", i))).collect();
    let procs: Vec<_> = procs.iter().map(|(f, s)| (&**f, s.clone())).collect();
    let (prog, current) = program(&procs);
    // a default-sized thread stack is enough for the whole run
    let out = std::thread::scope(|s| {
      let worker = std::thread::Builder::new().stack_size(2 << 20);
      let h = worker.spawn_scoped(s, || {
        translate_all_parallel(&prog, current, &im::OrdMap::new(), &opts(), Theory::new(), 2)
      });
      h.unwrap().join().unwrap()
    });
    assert!(out.errors.is_empty());
    assert_eq!(out.store.defined().count(), 200);
  }

  #[test]
  fn parallel_run_registers_the_same_functions() {
    let procs = [
      ("a", call_stmt("b_'proc")),
      ("b", Stmt::cond(Expr::var("c"), call_stmt("b_'proc"), Stmt::Skip)),
      ("c", Stmt::seq(call_stmt("a_'proc"), call_stmt("b_'proc"))),
      ("d", assign("x", 3)),
      ("e", call_stmt("d_'proc")),
    ];
    let (prog, current) = program(&procs);
    let seq = translate_all(&prog, current.clone(), &im::OrdMap::new(), opts(), Theory::new());
    let (seq_thy, _) = {
      let mut seq = seq;
      (&mut seq).for_each(|r| assert!(r.is_ok()));
      seq.into_state()
    };
    let out = translate_all_parallel(&prog, current, &im::OrdMap::new(), &opts(), Theory::new(), 4);
    assert!(out.errors.is_empty());
    assert_eq!(out.store.len(), seq_thy.len());
    for f in ["a", "b", "c", "d", "e"] {
      assert!(out.store.lookup(&format!("l1_{f}'")).is_some());
      assert!(out.functions[f].translation.is_some());
    }
    assert!(translation(&out.functions, "b").mono.is_some());
    assert!(translation(&out.functions, "a").mono.is_none());
  }

  #[test]
  fn prior_functions_are_reused() {
    let env = env_with(&[("leaf_'proc", assign("r", 1)), ("main_'proc", call_stmt("leaf_'proc"))]);
    let decl = |f: &str| FunctionDecl {
      name: name(f),
      proc: name(&format!("{f}_'proc")),
      return_slot: None,
      wrapper: false,
    };
    let first = Program { file: name("a.c"), env: env.clone(), functions: vec![decl("leaf")] };
    let (prog, current) = ProgramInfo::new(first, &im::OrdMap::new());
    let (thy, prior) = {
      let mut it = translate_all(&prog, current, &im::OrdMap::new(), opts(), Theory::new());
      (&mut it).for_each(|r| assert!(r.is_ok()));
      it.into_state()
    };

    let second = Program { file: name("a.c"), env, functions: vec![decl("main")] };
    let (prog, current) = ProgramInfo::new(second, &prior);
    assert_eq!(prog.graph.clusters.len(), 1);
    let mut it = translate_all(&prog, current, &prior, opts(), thy);
    let (thy, fs) = it.next().unwrap().unwrap();
    let leaf = translation(&fs, "leaf").konst;
    assert_eq!(call_in(&translation(&fs, "main").term).target, CalleeRef::Const(leaf));
    assert_eq!(thy.defined().count(), 2);
  }
}
