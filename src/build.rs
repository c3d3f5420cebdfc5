use crate::ast::{Env, Expr, Stmt};
use crate::monad::{Callee, MTerm};
use crate::proof::{Goal, Prop};
use crate::types::*;
use std::sync::Arc;

/// The constructors of the monadic IR, as accepted by [`TermBuilder::wrap_monadic`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Ctor {
  Skip,
  Seq,
  Modify,
  Condition,
  Catch,
  While,
  Throw,
  Guard,
  Init,
  Spec,
  Call,
  RecGuard,
  Fail,
}

#[derive(Debug)]
pub enum Arg {
  Term(MTerm),
  Expr(Expr),
  Callee(Callee),
  Measure(MeasureVar),
}

impl From<MTerm> for Arg {
  fn from(t: MTerm) -> Self { Arg::Term(t) }
}
impl From<Expr> for Arg {
  fn from(e: Expr) -> Self { Arg::Expr(e) }
}
impl From<Callee> for Arg {
  fn from(c: Callee) -> Self { Arg::Callee(c) }
}
impl From<MeasureVar> for Arg {
  fn from(m: MeasureVar) -> Self { Arg::Measure(m) }
}

struct Args(Ctor, std::vec::IntoIter<Arg>);

impl Args {
  fn next(&mut self) -> Arg {
    let ctor = self.0;
    self.1.next().unwrap_or_else(|| panic!("{ctor:?}: too few arguments"))
  }
  fn term(&mut self) -> Box<MTerm> {
    match self.next() {
      Arg::Term(t) => Box::new(t),
      a => panic!("{:?}: expected a term, got {a:?}", self.0),
    }
  }
  fn expr(&mut self) -> Expr {
    match self.next() {
      Arg::Expr(e) => e,
      a => panic!("{:?}: expected an expression, got {a:?}", self.0),
    }
  }
  fn callee(&mut self) -> Callee {
    match self.next() {
      Arg::Callee(c) => c,
      a => panic!("{:?}: expected a callee, got {a:?}", self.0),
    }
  }
  fn measure(&mut self) -> MeasureVar {
    match self.next() {
      Arg::Measure(m) => m,
      a => panic!("{:?}: expected a measure, got {a:?}", self.0),
    }
  }
  fn finish(mut self, t: MTerm) -> MTerm {
    assert!(self.1.next().is_none(), "{:?}: too many arguments", self.0);
    t
  }
}

/// Pure constructors for monadic terms and correspondence goals over a fixed
/// world type.
#[derive(Clone, Debug)]
pub struct TermBuilder {
  pub world: Name,
}

impl TermBuilder {
  pub fn new(env: &Env) -> Self { TermBuilder { world: env.world.clone() } }

  /// Build one node of the monadic IR. The argument kinds are checked
  /// against the constructor; callers construct them well-typed, so a
  /// mismatch is a bug and panics.
  pub fn wrap_monadic(&self, ctor: Ctor, args: Vec<Arg>) -> MTerm {
    let mut a = Args(ctor, args.into_iter());
    let t = match ctor {
      Ctor::Skip => MTerm::Skip,
      Ctor::Seq => MTerm::Seq(a.term(), a.term()),
      Ctor::Modify => MTerm::Modify(a.expr()),
      Ctor::Condition => MTerm::Condition { pred: a.expr(), left: a.term(), right: a.term() },
      Ctor::Catch => MTerm::Catch(a.term(), a.term()),
      Ctor::While => MTerm::While { pred: a.expr(), body: a.term() },
      Ctor::Throw => MTerm::Throw,
      Ctor::Guard => MTerm::Guard(a.expr()),
      Ctor::Init => MTerm::Init(a.expr()),
      Ctor::Spec => MTerm::Spec(a.expr()),
      Ctor::Call =>
        MTerm::Call { setup: a.expr(), callee: a.callee(), cleanup: a.expr(), result: a.expr() },
      Ctor::RecGuard => MTerm::RecGuard { measure: a.measure(), body: a.term() },
      Ctor::Fail => MTerm::Fail,
    };
    a.finish(t)
  }

  fn state_lam(&self, var: &str, body: Expr) -> Expr {
    Expr::lam(var, Some(self.world.clone()), body)
  }

  /// `λ_. b`
  pub fn const_pred(&self, b: bool) -> Expr {
    self.state_lam("_", if b { Expr::True } else { Expr::False })
  }

  /// The characteristic predicate of a set of states.
  pub fn pred_from_set(&self, set: &Expr) -> Expr {
    match set {
      Expr::Univ => self.const_pred(true),
      Expr::Empty => self.const_pred(false),
      Expr::Collect { var, body } => self.state_lam(var, (**body).clone()),
      _ => self.state_lam("s", Expr::mem(Expr::var("s"), set.clone())),
    }
  }

  /// `λ t s. upd`
  pub fn result_handler(&self, t: &str, s: &str, upd: &Expr) -> Expr {
    self.state_lam(t, self.state_lam(s, upd.clone()))
  }

  /// `λ s. s(|field := arbitrary|)`, setting a return slot to an unknown value.
  pub fn return_init(&self, field: &Name) -> Expr {
    let upd = Expr::Update {
      state: Box::new(Expr::var("s")),
      field: field.clone(),
      value: Box::new(Expr::Arbitrary),
    };
    self.state_lam("s", upd)
  }

  /// `corres ct Γ m c`
  pub fn correspondence_proposition(
    &self, ct: bool, env: &Arc<Env>, mterm: MTerm, stmt: Stmt,
  ) -> Goal {
    Goal { ct, env: env.clone(), prop: Prop::Corres { mterm, stmt } }
  }

  /// `corres ct Γ m (Call proc)`, the statement proved about a whole function.
  pub fn call_proposition(&self, ct: bool, env: &Arc<Env>, mterm: MTerm, proc: Name) -> Goal {
    Goal { ct, env: env.clone(), prop: Prop::CallCorres { mterm, proc } }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::*;

  #[test]
  fn set_guards_become_predicates() {
    let env = env_with(&[]);
    let b = TermBuilder::new(&env);
    assert_eq!(b.pred_from_set(&Expr::Univ), b.const_pred(true));
    assert_eq!(b.pred_from_set(&Expr::Empty), b.const_pred(false));
    let other = b.pred_from_set(&Expr::var("S"));
    assert_eq!(other, Expr::lam("s", Some(name(WORLD)), Expr::mem(Expr::var("s"), Expr::var("S"))));
  }

  #[test]
  fn call_propositions_name_the_procedure() {
    let env = env_with(&[("f_'proc", Stmt::Skip)]);
    let b = TermBuilder::new(&env);
    let t = b.wrap_monadic(Ctor::Seq, vec![MTerm::Skip.into(), MTerm::Throw.into()]);
    let goal = b.call_proposition(false, &env, t.clone(), name("f_'proc"));
    assert!(!goal.ct && Arc::ptr_eq(&goal.env, &env));
    assert!(goal.prop == Prop::CallCorres { mterm: t, proc: name("f_'proc") });
    let goal = b.correspondence_proposition(true, &env, MTerm::Skip, Stmt::Skip);
    assert!(goal.prop == Prop::Corres { mterm: MTerm::Skip, stmt: Stmt::Skip });
  }

  #[test]
  #[should_panic(expected = "expected a term")]
  fn ill_kinded_arguments_panic() {
    let b = TermBuilder::new(&env_with(&[]));
    b.wrap_monadic(Ctor::Catch, vec![MTerm::Skip.into(), Expr::True.into()]);
  }
}
