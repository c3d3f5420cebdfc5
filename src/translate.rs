use crate::ast::{Env, Stmt};
use crate::build::{Ctor, TermBuilder};
use crate::error::{TranslateError, Warning};
use crate::monad::MTerm;
use crate::proof::{Hyp, Lemma, Recipe};
use crate::types::*;
use std::collections::HashMap;

/// One callee placeholder: a free function standing for `func` until the
/// caller's cluster is registered.
#[derive(Clone, Debug)]
pub struct CalleeEntry {
  pub func: Name,
  pub proc: Name,
  /// The call is an internal edge of the caller's cluster, so the measure is
  /// threaded through it
  pub recursive: bool,
  /// The callee takes a measure of its own
  pub target_recursive: bool,
}

/// The placeholders available while translating one function.
#[derive(Clone, Debug, Default)]
pub struct CalleeTable {
  pub entries: IdxVec<PlaceholderId, CalleeEntry>,
  by_func: HashMap<Name, PlaceholderId>,
}

impl CalleeTable {
  pub fn new() -> Self { Self::default() }

  pub fn push(&mut self, entry: CalleeEntry) -> PlaceholderId {
    let func = entry.func.clone();
    let p = self.entries.push(entry);
    self.by_func.insert(func, p);
    p
  }

  pub fn get(&self, func: &str) -> Option<(PlaceholderId, &CalleeEntry)> {
    let p = *self.by_func.get(func)?;
    Some((p, &self.entries[p]))
  }

  /// The assumption each placeholder carries in the proof.
  pub fn hyps(&self) -> IdxVec<PlaceholderId, Hyp> {
    let hyp = |e: &CalleeEntry| Hyp { proc: e.proc.clone(), recursive: e.recursive };
    self.entries.0.iter().map(hyp).collect()
  }
}

/// Translates the body of one function. Every case emits exactly one monadic
/// constructor together with the recipe that proves it corresponds.
pub struct Translator<'a> {
  pub(crate) b: TermBuilder,
  pub(crate) env: &'a Env,
  pub(crate) callees: &'a CalleeTable,
  /// procedure constant to function name
  pub(crate) proc_names: &'a HashMap<Name, Name>,
  pub(crate) measure: MeasureVar,
  pub(crate) func: Name,
  pub warnings: Vec<Warning>,
}

impl<'a> Translator<'a> {
  pub fn new(
    env: &'a Env, callees: &'a CalleeTable, proc_names: &'a HashMap<Name, Name>,
    measure: MeasureVar, func: Name,
  ) -> Self {
    Translator { b: TermBuilder::new(env), env, callees, proc_names, measure, func, warnings: vec![] }
  }

  pub(crate) fn unsupported(&self, what: &'static str, fragment: &Stmt) -> TranslateError {
    TranslateError::Unsupported { func: self.func.clone(), what, fragment: Box::new(fragment.clone()) }
  }

  pub fn translate(&mut self, stmt: &Stmt) -> Result<(MTerm, Recipe), TranslateError> {
    stacker::maybe_grow(32 * 1024, 1024 * 1024, || {
      Ok(match stmt {
        Stmt::Skip => (self.b.wrap_monadic(Ctor::Skip, vec![]), Recipe::leaf(Lemma::Skip)),
        Stmt::Throw => (self.b.wrap_monadic(Ctor::Throw, vec![]), Recipe::leaf(Lemma::Throw)),
        Stmt::Seq(a, b) => {
          let (a, pa) = self.translate(a)?;
          let (b, pb) = self.translate(b)?;
          let t = self.b.wrap_monadic(Ctor::Seq, vec![a.into(), b.into()]);
          (t, Recipe::apply(Lemma::Seq, vec![pa, pb]))
        }
        Stmt::Catch(a, b) => {
          let (a, pa) = self.translate(a)?;
          let (b, pb) = self.translate(b)?;
          let t = self.b.wrap_monadic(Ctor::Catch, vec![a.into(), b.into()]);
          (t, Recipe::apply(Lemma::Catch, vec![pa, pb]))
        }
        Stmt::Assign(f) =>
          (self.b.wrap_monadic(Ctor::Modify, vec![f.clone().into()]), Recipe::leaf(Lemma::Modify)),
        Stmt::LocalInit(f) =>
          (self.b.wrap_monadic(Ctor::Init, vec![f.clone().into()]), Recipe::leaf(Lemma::Init)),
        Stmt::Spec(r) =>
          (self.b.wrap_monadic(Ctor::Spec, vec![r.clone().into()]), Recipe::leaf(Lemma::Spec)),
        Stmt::Cond { guard, left, right } => {
          let pred = self.b.pred_from_set(guard);
          let (l, pl) = self.translate(left)?;
          let (r, pr) = self.translate(right)?;
          let t = self.b.wrap_monadic(Ctor::Condition, vec![pred.into(), l.into(), r.into()]);
          (t, Recipe::apply(Lemma::Condition, vec![pl, pr]))
        }
        Stmt::While { guard, body } => {
          let pred = self.b.pred_from_set(guard);
          let (body, pb) = self.translate(body)?;
          let t = self.b.wrap_monadic(Ctor::While, vec![pred.into(), body.into()]);
          (t, Recipe::apply(Lemma::While, vec![pb]))
        }
        Stmt::Guard { cond, body } => {
          let check = self.b.wrap_monadic(Ctor::Guard, vec![self.b.pred_from_set(cond).into()]);
          let (body, pb) = self.translate(body)?;
          let t = self.b.wrap_monadic(Ctor::Seq, vec![check.into(), body.into()]);
          (t, Recipe::apply(Lemma::Guard, vec![pb]))
        }
        Stmt::GuardedSpec { cond, rel } => {
          let check = self.b.wrap_monadic(Ctor::Guard, vec![self.b.pred_from_set(cond).into()]);
          let spec = self.b.wrap_monadic(Ctor::Spec, vec![rel.clone().into()]);
          let t = self.b.wrap_monadic(Ctor::Seq, vec![check.into(), spec.into()]);
          (t, Recipe::leaf(Lemma::GuardedSpec))
        }
        Stmt::Call { setup, proc, cleanup, result } =>
          return self.translate_call(stmt, setup, proc, cleanup, result),
        Stmt::DynCall { .. } => return Err(self.unsupported("dynamic call", stmt)),
      })
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::Expr;
  use crate::test_support::*;

  fn run(stmt: &Stmt) -> Result<(MTerm, Recipe), TranslateError> {
    let env = env_with(&[]);
    let (table, names) = (CalleeTable::new(), HashMap::new());
    Translator::new(&env, &table, &names, MeasureVar(0), name("f")).translate(stmt)
  }

  fn same_ctor(t: &MTerm, s: &Stmt) -> bool {
    matches!(
      (t, s),
      (MTerm::Skip, Stmt::Skip)
        | (MTerm::Seq(..), Stmt::Seq(..))
        | (MTerm::Modify(_), Stmt::Assign(_))
        | (MTerm::Condition { .. }, Stmt::Cond { .. })
        | (MTerm::Catch(..), Stmt::Catch(..))
        | (MTerm::While { .. }, Stmt::While { .. })
        | (MTerm::Throw, Stmt::Throw)
        | (MTerm::Init(_), Stmt::LocalInit(_))
        | (MTerm::Spec(_), Stmt::Spec(_))
        | (MTerm::Seq(..), Stmt::Guard { .. } | Stmt::GuardedSpec { .. })
    )
  }

  #[test]
  fn every_fragment_maps_to_its_constructor() {
    let body = || Box::new(assign("x", 1));
    let set = Expr::var("S");
    let frags = [
      Stmt::Skip,
      Stmt::Throw,
      Stmt::Seq(body(), body()),
      assign("x", 2),
      Stmt::cond(set.clone(), Stmt::Skip, Stmt::Throw),
      Stmt::Catch(body(), body()),
      Stmt::While { guard: set.clone(), body: body() },
      Stmt::Guard { cond: set.clone(), body: body() },
      Stmt::LocalInit(Expr::var("init_x")),
      Stmt::Spec(Expr::var("R")),
      Stmt::GuardedSpec { cond: set, rel: Expr::var("R") },
    ];
    for frag in &frags {
      let (t, recipe) = run(frag).unwrap();
      assert!(same_ctor(&t, frag), "{frag:?} translated to {t:?}");
      // the recipe has exactly one subproof per translated substatement
      let Recipe::Apply { subs, .. } = &recipe else { panic!() };
      let expected = match frag {
        Stmt::Seq(..) | Stmt::Cond { .. } | Stmt::Catch(..) => 2,
        Stmt::While { .. } | Stmt::Guard { .. } => 1,
        _ => 0,
      };
      assert_eq!(subs.len(), expected);
    }
  }

  #[test]
  fn sequence_with_conditional_throw() {
    let stmt = Stmt::seq(assign("x", 1), Stmt::cond(Expr::Univ, Stmt::Throw, Stmt::Skip));
    let (t, recipe) = run(&stmt).unwrap();
    let b = TermBuilder::new(&env_with(&[]));
    let expected = MTerm::seq(MTerm::Modify(set("x", 1)), MTerm::Condition {
      pred: b.const_pred(true),
      left: Box::new(MTerm::Throw),
      right: Box::new(MTerm::Skip),
    });
    assert!(t == expected);
    assert_eq!(recipe.lemmas(), [
      Lemma::Seq,
      Lemma::Modify,
      Lemma::Condition,
      Lemma::Throw,
      Lemma::Skip
    ]);
    let counts = recipe.lemma_counts();
    assert_eq!((counts[Lemma::Seq], counts[Lemma::Throw], counts[Lemma::While]), (1, 1, 0));
    assert_eq!(
      recipe,
      Recipe::apply(Lemma::Seq, vec![
        Recipe::leaf(Lemma::Modify),
        Recipe::apply(Lemma::Condition, vec![Recipe::leaf(Lemma::Throw), Recipe::leaf(Lemma::Skip)]),
      ])
    );
  }

  #[test]
  fn dynamic_calls_are_rejected() {
    let Stmt::Call { setup, cleanup, result, .. } = call_stmt("g_'proc") else { unreachable!() };
    let call = Stmt::DynCall { setup, target: Expr::var("fp"), cleanup, result };
    let stmt = Stmt::seq(Stmt::Skip, call);
    match run(&stmt) {
      Err(TranslateError::Unsupported { what, fragment, .. }) => {
        assert_eq!(what, "dynamic call");
        assert!(matches!(*fragment, Stmt::DynCall { .. }));
      }
      _ => panic!("expected an unsupported-construct error"),
    }
  }
}
