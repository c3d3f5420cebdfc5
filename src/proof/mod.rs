//! The correspondence kernel.
//!
//! A [`Theorem`] can only be produced by the functions in this module, each of
//! which corresponds to one trusted base lemma about the monadic IR and the
//! statement semantics. Translation produces a [`Recipe`] alongside every
//! term; [`Goal::prove`] replays the recipe against the term and the
//! fragment, so any disagreement between the two halves of the translator
//! surfaces here as a [`ProofError`] instead of as a wrong theorem.

use crate::ast::{Env, Stmt};
use crate::build::TermBuilder;
use crate::monad::{CalleeRef, InstPlaceholders, MTerm, MeasureArg, VisitMut};
use crate::types::*;
use enum_map::{Enum, EnumMap};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

mod mono;
pub mod rewrite;

macro_rules! mk_lemmas {
  ($($id:ident: $name:literal,)*) => {
    /// The base lemmas of the kernel.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Enum)]
    pub enum Lemma {
      $($id,)*
    }
    impl Lemma {
      pub fn name(self) -> &'static str {
        match self {
          $(Lemma::$id => $name,)*
        }
      }
    }
  }
}
mk_lemmas! {
  Skip: "skip-lemma",
  Seq: "seq-lemma",
  Modify: "modify-lemma",
  Condition: "condition-lemma",
  Catch: "catch-lemma",
  While: "while-lemma",
  Throw: "throw-lemma",
  Guard: "guard-lemma",
  Init: "init-lemma",
  Spec: "spec-lemma",
  GuardedSpec: "guarded-spec-lemma",
  CallExternal: "call-lemma",
  CallRecursive: "recursive-call-lemma",
  CallUndefined: "undefined-call-lemma",
  RecGuard: "recguard-lemma",
  Unfold: "impl-unfold-lemma",
  UndefinedFn: "undefined-function-lemma",
  InitReturn: "init-return-lemma",
  InitReturnRecGuard: "init-return-recguard-lemma",
  Rewrite: "rewrite-lemma",
  Define: "define-lemma",
  MutualInduction: "mutual-induction-lemma",
  Mono: "mono-lemma",
  ConjSplit: "conj-split-lemma",
}

impl std::fmt::Display for Lemma {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.name()) }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Prop {
  /// `corres ct Γ m c`
  Corres { mterm: MTerm, stmt: Stmt },
  /// `corres ct Γ m (Call proc)`
  CallCorres { mterm: MTerm, proc: Name },
  /// `corres ct Γ konst (Call proc)`, for a registered constant
  FnCorres { konst: ConstId, proc: Name },
  /// `konst` is monotone in its measure argument
  Mono { konst: ConstId },
  /// Conjunction of `Mono` over a cluster
  MonoAll(Vec<ConstId>),
}

/// A proposition waiting to be proved.
#[derive(Clone)]
pub struct Goal {
  /// Whether termination is being checked
  pub ct: bool,
  pub env: Arc<Env>,
  pub prop: Prop,
}

/// An assumption on a callee placeholder: for every measure, the placeholder
/// corresponds to a call of `proc`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hyp {
  pub proc: Name,
  /// An induction hypothesis for a call within the caller's own cluster
  pub recursive: bool,
}

/// How to prove a correspondence goal: a tree mirroring the shape of the term.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipe {
  Apply { lemma: Lemma, subs: Vec<Recipe> },
  /// Appeal to the hypothesis on a callee placeholder
  Hyp(PlaceholderId),
}

impl Recipe {
  pub fn leaf(lemma: Lemma) -> Self { Recipe::Apply { lemma, subs: vec![] } }

  pub fn apply(lemma: Lemma, subs: Vec<Recipe>) -> Self { Recipe::Apply { lemma, subs } }

  /// The lemmas used, in pre-order.
  pub fn lemmas(&self) -> Vec<Lemma> {
    fn go(r: &Recipe, out: &mut Vec<Lemma>) {
      if let Recipe::Apply { lemma, subs } = r {
        out.push(*lemma);
        subs.iter().for_each(|r| go(r, out))
      }
    }
    let mut out = vec![];
    go(self, &mut out);
    out
  }

  pub fn lemma_counts(&self) -> EnumMap<Lemma, u32> {
    let mut counts = EnumMap::default();
    self.lemmas().into_iter().for_each(|l| counts[l] += 1);
    counts
  }
}

#[derive(Clone, Debug)]
pub struct ProofError {
  pub lemma: Option<Lemma>,
  pub msg: String,
}

impl ProofError {
  fn new(lemma: Option<Lemma>, msg: impl Into<String>) -> Self {
    ProofError { lemma, msg: msg.into() }
  }
}

impl std::fmt::Display for ProofError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self.lemma {
      Some(lemma) => write!(f, "{lemma}: {}", self.msg),
      None => f.write_str(&self.msg),
    }
  }
}

pub type OrProofError<T> = Result<T, ProofError>;

/// A proved proposition, possibly conditional on callee hypotheses.
#[derive(Clone)]
pub struct Theorem {
  ct: bool,
  env: Arc<Env>,
  prop: Prop,
  hyps: BTreeMap<PlaceholderId, Hyp>,
  /// The free measure variable of the proposition, if any
  measure: Option<MeasureVar>,
}

impl Theorem {
  pub fn prop(&self) -> &Prop { &self.prop }
  pub fn ct(&self) -> bool { self.ct }
  pub fn env(&self) -> &Arc<Env> { &self.env }
  pub fn hyps(&self) -> &BTreeMap<PlaceholderId, Hyp> { &self.hyps }
  pub fn measure(&self) -> Option<MeasureVar> { self.measure }

  /// The monadic term of a `Corres` or `CallCorres` theorem.
  pub fn mterm(&self) -> Option<&MTerm> {
    match &self.prop {
      Prop::Corres { mterm, .. } | Prop::CallCorres { mterm, .. } => Some(mterm),
      _ => None,
    }
  }

  /// Restate the theorem as `corres ct Γ mterm (Call proc)`.
  fn with_call(&self, mterm: MTerm, proc: Name) -> Theorem {
    let goal = TermBuilder::new(&self.env).call_proposition(self.ct, &self.env, mterm, proc);
    self.with_prop(goal.prop)
  }

  fn with_prop(&self, prop: Prop) -> Theorem {
    Theorem {
      ct: self.ct,
      env: self.env.clone(),
      prop,
      hyps: self.hyps.clone(),
      measure: self.measure,
    }
  }

  /// Wrap the term of a `Corres` theorem in a recursion guard on its measure.
  pub fn rec_guard(self) -> OrProofError<Theorem> {
    let err = |msg| ProofError::new(Some(Lemma::RecGuard), msg);
    let Some(measure) = self.measure else { return Err(err("no measure to guard on")) };
    let Prop::Corres { mterm, stmt } = &self.prop else { return Err(err("not a corres theorem")) };
    let mterm = MTerm::RecGuard { measure, body: Box::new(mterm.clone()) };
    Ok(self.with_prop(Prop::Corres { mterm, stmt: stmt.clone() }))
  }

  /// Restate a theorem about the body of `proc` as a theorem about calling `proc`.
  pub fn unfold_impl(self, proc: Name) -> OrProofError<Theorem> {
    let err = |msg: String| ProofError::new(Some(Lemma::Unfold), msg);
    let Prop::Corres { mterm, stmt } = &self.prop else {
      return Err(err("not a corres theorem".into()))
    };
    match self.env.body(&proc) {
      Some(body) if body == stmt => {}
      Some(_) => return Err(err(format!("statement is not the body of {proc}"))),
      None => return Err(err(format!("{proc} has no implementation"))),
    }
    Ok(self.with_call(mterm.clone(), proc))
  }

  /// A call to a procedure without implementation corresponds to failure.
  pub fn undefined_fn(ct: bool, env: &Arc<Env>, proc: Name) -> OrProofError<Theorem> {
    if env.has_body(&proc) {
      let msg = format!("{proc} has an implementation");
      return Err(ProofError::new(Some(Lemma::UndefinedFn), msg))
    }
    let goal = TermBuilder::new(env).call_proposition(ct, env, MTerm::Fail, proc);
    Ok(Theorem { ct, env: goal.env, prop: goal.prop, hyps: Default::default(), measure: None })
  }

  /// Prepend the initialization of a return slot. `lemma` selects the shape:
  /// [`Lemma::InitReturnRecGuard`] goes under an outermost recursion guard,
  /// [`Lemma::InitReturn`] goes in front of the whole term.
  pub fn init_return(self, lemma: Lemma, init: crate::ast::Expr) -> OrProofError<Theorem> {
    let err = |msg| ProofError::new(Some(lemma), msg);
    let Prop::CallCorres { mterm, proc } = &self.prop else {
      return Err(err("not a call corres theorem"))
    };
    let mterm = match (lemma, mterm) {
      (Lemma::InitReturnRecGuard, MTerm::RecGuard { measure, body }) => MTerm::RecGuard {
        measure: *measure,
        body: Box::new(MTerm::seq(MTerm::Init(init), (**body).clone())),
      },
      (Lemma::InitReturn, _) => MTerm::seq(MTerm::Init(init), mterm.clone()),
      _ => return Err(err("lemma does not unify with the theorem")),
    };
    Ok(self.with_call(mterm, proc.clone()))
  }

  /// Rewrite the monadic term with a rule set. Every rule is an equivalence
  /// of monadic terms, so the rewritten proposition still holds.
  pub fn rewrite(
    self, rules: rewrite::RuleSet, trace: bool,
  ) -> OrProofError<(Theorem, Vec<rewrite::RewriteStep>)> {
    let mut steps = if trace { Some(vec![]) } else { None };
    let prop = match &self.prop {
      Prop::Corres { mterm, stmt } => {
        let mterm = rewrite::normalize(mterm.clone(), rules, &mut steps);
        Prop::Corres { mterm, stmt: stmt.clone() }
      }
      Prop::CallCorres { mterm, proc } => {
        let mterm = rewrite::normalize(mterm.clone(), rules, &mut steps);
        return Ok((self.with_call(mterm, proc.clone()), steps.unwrap_or_default()))
      }
      _ => return Err(ProofError::new(Some(Lemma::Rewrite), "nothing to rewrite")),
    };
    Ok((self.with_prop(prop), steps.unwrap_or_default()))
  }
}

impl Goal {
  /// Replay `recipe` on a `Corres` goal. `hyps` are the assumptions available
  /// on callee placeholders, `measure` the free measure variable of the goal.
  pub fn prove(
    self, recipe: &Recipe, hyps: &IdxVec<PlaceholderId, Hyp>, measure: MeasureVar,
  ) -> OrProofError<Theorem> {
    let Prop::Corres { mterm, stmt } = &self.prop else {
      return Err(ProofError::new(None, "only corres goals are proved by recipe"))
    };
    let mut ck = Checker {
      b: TermBuilder::new(&self.env),
      hyps,
      measure,
      used: BTreeMap::new(),
    };
    ck.check(mterm, stmt, recipe)?;
    let used = ck.used;
    Ok(Theorem { ct: self.ct, env: self.env, prop: self.prop, hyps: used, measure: Some(measure) })
  }
}

struct Checker<'a> {
  b: TermBuilder,
  hyps: &'a IdxVec<PlaceholderId, Hyp>,
  measure: MeasureVar,
  used: BTreeMap<PlaceholderId, Hyp>,
}

impl Checker<'_> {
  fn check(&mut self, mterm: &MTerm, stmt: &Stmt, recipe: &Recipe) -> OrProofError<()> {
    let Recipe::Apply { lemma, subs } = recipe else {
      return Err(ProofError::new(None, "callee hypothesis used as a statement proof"))
    };
    let lemma = *lemma;
    let err = |msg: &str| ProofError::new(Some(lemma), msg);
    let arity = |n: usize| {
      if subs.len() == n {
        Ok(())
      } else {
        Err(err(&format!("expected {n} subproofs, got {}", subs.len())))
      }
    };
    stacker::maybe_grow(32 * 1024, 1024 * 1024, || match (lemma, mterm, stmt) {
      (Lemma::Skip, MTerm::Skip, Stmt::Skip) | (Lemma::Throw, MTerm::Throw, Stmt::Throw) =>
        arity(0),
      (Lemma::Seq, MTerm::Seq(a, b), Stmt::Seq(c, d))
      | (Lemma::Catch, MTerm::Catch(a, b), Stmt::Catch(c, d)) => {
        arity(2)?;
        self.check(a, c, &subs[0])?;
        self.check(b, d, &subs[1])
      }
      (Lemma::Modify, MTerm::Modify(f), Stmt::Assign(g))
      | (Lemma::Init, MTerm::Init(f), Stmt::LocalInit(g))
      | (Lemma::Spec, MTerm::Spec(f), Stmt::Spec(g)) => {
        if f != g {
          return Err(err("expressions differ"))
        }
        arity(0)
      }
      (
        Lemma::Condition,
        MTerm::Condition { pred, left, right },
        Stmt::Cond { guard, left: l2, right: r2 },
      ) => {
        self.check_pred(pred, guard, lemma)?;
        arity(2)?;
        self.check(left, l2, &subs[0])?;
        self.check(right, r2, &subs[1])
      }
      (Lemma::While, MTerm::While { pred, body }, Stmt::While { guard, body: b2 }) => {
        self.check_pred(pred, guard, lemma)?;
        arity(1)?;
        self.check(body, b2, &subs[0])
      }
      (Lemma::Guard, MTerm::Seq(g, body), Stmt::Guard { cond, body: b2 }) => {
        let MTerm::Guard(pred) = &**g else { return Err(err("expected a guard check")) };
        self.check_pred(pred, cond, lemma)?;
        arity(1)?;
        self.check(body, b2, &subs[0])
      }
      (Lemma::GuardedSpec, MTerm::Seq(g, s), Stmt::GuardedSpec { cond, rel }) => {
        let (MTerm::Guard(pred), MTerm::Spec(r)) = (&**g, &**s) else {
          return Err(err("expected a guard check followed by a spec"))
        };
        self.check_pred(pred, cond, lemma)?;
        if r != rel {
          return Err(err("relations differ"))
        }
        arity(0)
      }
      (
        Lemma::CallExternal | Lemma::CallRecursive,
        MTerm::Call { setup, callee, cleanup, result },
        Stmt::Call { setup: s2, proc, cleanup: c2, result: rs },
      ) => {
        if setup != s2 || cleanup != c2 {
          return Err(err("argument setup or cleanup differs"))
        }
        let Some((t, s, upd)) = rs.canonical() else {
          return Err(err("result store is not a plain update"))
        };
        if *result != self.b.result_handler(t, s, upd) {
          return Err(err("result handler differs"))
        }
        let [Recipe::Hyp(p)] = &**subs else {
          return Err(err("expected exactly the callee hypothesis"))
        };
        if callee.target != CalleeRef::Placeholder(*p) {
          return Err(err("callee is not the hypothesis placeholder"))
        }
        let Some(hyp) = self.hyps.get(*p).cloned() else {
          return Err(err("unknown placeholder"))
        };
        if hyp.proc != *proc {
          return Err(err(&format!("placeholder stands for {}, not {proc}", hyp.proc)))
        }
        match (lemma, callee.measure, hyp.recursive) {
          (Lemma::CallExternal, MeasureArg::Unused, false)
          | (Lemma::CallRecursive, MeasureArg::Managed, false) => {}
          (Lemma::CallRecursive, MeasureArg::Pred(m), true) if m == self.measure => {}
          _ => return Err(err("measure threading does not match the call site")),
        }
        self.used.insert(*p, hyp);
        Ok(())
      }
      (Lemma::CallUndefined, MTerm::Fail, Stmt::Call { .. }) => arity(0),
      _ => Err(err("lemma does not unify with the goal")),
    })
  }

  fn check_pred(
    &self, pred: &crate::ast::Expr, set: &crate::ast::Expr, lemma: Lemma,
  ) -> OrProofError<()> {
    if *pred == self.b.pred_from_set(set) {
      Ok(())
    } else {
      Err(ProofError::new(Some(lemma), "predicate is not the characteristic function of the guard"))
    }
  }
}

/// How a callee hypothesis of a cluster member is discharged.
pub enum Binding<'a> {
  /// By the registered theorem of a function defined earlier
  Defined(&'a Theorem),
  /// By induction, for a function of the same cluster defined as `ConstId`
  Sibling(ConstId),
}

pub struct Member<'a> {
  pub thm: Theorem,
  pub konst: ConstId,
  pub bindings: HashMap<PlaceholderId, Binding<'a>>,
}

/// The result of closing a cluster: the definitions to register, and the
/// theorems about the defined constants, which hold once the definitions are
/// registered exactly as given.
pub struct ClosedCluster {
  pub defs: Vec<(ConstId, MTerm)>,
  pub thms: Vec<Theorem>,
}

/// Define every member of a cluster at once. External hypotheses are
/// discharged with the callee's registered theorem, recursive ones by
/// simultaneous induction on the measure, which needs every member with a
/// recursive hypothesis to be guarded on its measure.
pub fn close_cluster(members: Vec<Member<'_>>) -> OrProofError<ClosedCluster> {
  let recursive = members.iter().any(|m| m.thm.hyps.values().any(|h| h.recursive));
  let lemma = if recursive { Lemma::MutualInduction } else { Lemma::Define };
  let err = |msg: String| ProofError::new(Some(lemma), msg);
  let Some(first) = members.first() else { return Err(err("empty cluster".into())) };
  let (ct, env) = (first.thm.ct, first.thm.env.clone());
  let mut procs = HashMap::new();
  for m in &members {
    let Prop::CallCorres { proc, .. } = &m.thm.prop else {
      return Err(err("member is not a call corres theorem".into()))
    };
    if m.thm.ct != ct || !Arc::ptr_eq(&m.thm.env, &env) {
      return Err(err(format!("{proc}: mismatched termination flag or environment")))
    }
    procs.insert(m.konst, proc.clone());
  }
  let mut out = ClosedCluster { defs: vec![], thms: vec![] };
  for m in members {
    let Prop::CallCorres { mut mterm, proc } = m.thm.prop else { unreachable!() };
    let mut inst = HashMap::new();
    let mut uses_ih = false;
    for (p, hyp) in &m.thm.hyps {
      let Some(binding) = m.bindings.get(p) else {
        return Err(err(format!("{proc}: no binding for the hypothesis on {}", hyp.proc)))
      };
      let k = match *binding {
        Binding::Defined(thm) => {
          let Prop::FnCorres { konst, proc: p2 } = &thm.prop else {
            return Err(err(format!("{proc}: callee theorem is not about a constant")))
          };
          if hyp.recursive || *p2 != hyp.proc || !thm.hyps.is_empty() {
            return Err(err(format!("{proc}: callee theorem does not discharge {}", hyp.proc)))
          }
          if thm.ct != ct || !Arc::ptr_eq(&thm.env, &env) {
            return Err(err(format!("{proc}: callee theorem is in a different context")))
          }
          *konst
        }
        Binding::Sibling(k) => {
          if !hyp.recursive || procs.get(&k) != Some(&hyp.proc) {
            return Err(err(format!("{proc}: {} is not a recursive sibling", hyp.proc)))
          }
          uses_ih = true;
          k
        }
      };
      inst.insert(*p, k);
    }
    if uses_ih && !matches!(mterm, MTerm::RecGuard { .. }) {
      return Err(err(format!("{proc}: induction on the measure needs a recursion guard")))
    }
    InstPlaceholders(&|p| inst.get(&p).copied()).visit_term(&mut mterm);
    if mterm.has_placeholders() {
      return Err(err(format!("{proc}: undischarged callee placeholder")))
    }
    out.defs.push((m.konst, mterm));
    out.thms.push(Theorem {
      ct,
      env: env.clone(),
      prop: Prop::FnCorres { konst: m.konst, proc },
      hyps: Default::default(),
      measure: None,
    })
  }
  Ok(out)
}

/// Prove that every member of a recursive cluster is monotone in its measure,
/// by simultaneous induction. `defs` looks up the registered definitions.
pub fn mono_cluster<'a>(
  ct: bool, env: &Arc<Env>, cluster: &[ConstId], defs: impl Fn(ConstId) -> Option<&'a MTerm>,
) -> OrProofError<Theorem> {
  let ih: BTreeSet<ConstId> = cluster.iter().copied().collect();
  for &k in cluster {
    let Some(body) = defs(k) else {
      return Err(ProofError::new(Some(Lemma::Mono), format!("constant {k:?} is not defined")))
    };
    mono::check(body, &ih)?;
  }
  Ok(Theorem {
    ct,
    env: env.clone(),
    prop: Prop::MonoAll(cluster.to_vec()),
    hyps: Default::default(),
    measure: None,
  })
}

impl Theorem {
  /// Split a conjunction of monotonicity statements into its conjuncts.
  pub fn split(self) -> OrProofError<Vec<Theorem>> {
    let Prop::MonoAll(ks) = &self.prop else {
      return Err(ProofError::new(Some(Lemma::ConjSplit), "not a conjunction"))
    };
    Ok(ks.iter().map(|&konst| self.with_prop(Prop::Mono { konst })).collect())
  }
}
