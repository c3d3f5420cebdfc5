use crate::ast::Expr;
use crate::types::*;

/// How a callee invocation receives its measure argument.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MeasureArg {
  /// `m - 1`: an internal recursive call within the caller's cluster
  Pred(MeasureVar),
  /// `measure_call`: the callee is recursive, the call is from outside its
  /// cluster, so a fresh internal measure is supplied
  Managed,
  /// The callee takes no measure; an arbitrary value is passed
  Unused,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CalleeRef {
  /// A not-yet-defined function, local to one driver invocation
  Placeholder(PlaceholderId),
  /// A registered term constant
  Const(ConstId),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Callee {
  pub target: CalleeRef,
  pub measure: MeasureArg,
}

/// A term of the monadic IR. The world type is implicit (it lives in the
/// procedure environment), and predicates are characteristic functions.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum MTerm {
  Skip,
  Seq(Box<MTerm>, Box<MTerm>),
  Modify(Expr),
  Condition {
    pred: Expr,
    left: Box<MTerm>,
    right: Box<MTerm>,
  },
  Catch(Box<MTerm>, Box<MTerm>),
  While {
    pred: Expr,
    body: Box<MTerm>,
  },
  Throw,
  Guard(Expr),
  Init(Expr),
  Spec(Expr),
  Call {
    setup: Expr,
    callee: Callee,
    cleanup: Expr,
    /// `λ t s. upd`, abstracted over the callee's and caller's states
    result: Expr,
  },
  /// Fails once the measure reaches zero
  RecGuard {
    measure: MeasureVar,
    body: Box<MTerm>,
  },
  Fail,
}

impl MTerm {
  pub fn seq(a: MTerm, b: MTerm) -> Self { MTerm::Seq(Box::new(a), Box::new(b)) }

  /// The immediate subterms, left to right.
  pub fn children(&self) -> Vec<&MTerm> {
    match self {
      MTerm::Seq(a, b) | MTerm::Catch(a, b) | MTerm::Condition { left: a, right: b, .. } =>
        vec![&**a, &**b],
      MTerm::While { body, .. } | MTerm::RecGuard { body, .. } => vec![&**body],
      _ => vec![],
    }
  }

  /// Can this term terminate with an exception?
  pub fn may_throw(&self) -> bool {
    match self {
      MTerm::Throw => true,
      MTerm::Seq(a, b) | MTerm::Condition { left: a, right: b, .. } =>
        a.may_throw() || b.may_throw(),
      MTerm::Catch(_, handler) => handler.may_throw(),
      MTerm::While { body, .. } | MTerm::RecGuard { body, .. } => body.may_throw(),
      // exceptions escaping a callee are turned into failure by the call combinator
      MTerm::Call { .. } => false,
      MTerm::Skip
      | MTerm::Modify(_)
      | MTerm::Guard(_)
      | MTerm::Init(_)
      | MTerm::Spec(_)
      | MTerm::Fail => false,
    }
  }

  /// Visit every callee occurring in this term, in left-to-right order.
  pub fn callees(&self, f: &mut impl FnMut(&Callee)) {
    match self {
      MTerm::Call { callee, .. } => f(callee),
      _ => self.children().into_iter().for_each(|t| t.callees(f)),
    }
  }

  pub fn has_placeholders(&self) -> bool {
    let mut found = false;
    self.callees(&mut |c| found |= matches!(c.target, CalleeRef::Placeholder(_)));
    found
  }
}

pub trait VisitMut {
  fn visit_callee(&mut self, _: &mut Callee) {}
  fn visit_expr(&mut self, _: &mut Expr) {}

  fn visit_term(&mut self, tm: &mut MTerm) { self.super_visit_term(tm) }

  fn super_visit_term(&mut self, tm: &mut MTerm) {
    match tm {
      MTerm::Skip | MTerm::Throw | MTerm::Fail => {}
      MTerm::Seq(a, b) | MTerm::Catch(a, b) => {
        self.visit_term(a);
        self.visit_term(b)
      }
      MTerm::Modify(e) | MTerm::Guard(e) | MTerm::Init(e) | MTerm::Spec(e) => self.visit_expr(e),
      MTerm::Condition { pred, left, right } => {
        self.visit_expr(pred);
        self.visit_term(left);
        self.visit_term(right)
      }
      MTerm::While { pred, body } => {
        self.visit_expr(pred);
        self.visit_term(body)
      }
      MTerm::Call { setup, callee, cleanup, result } => {
        self.visit_expr(setup);
        self.visit_callee(callee);
        self.visit_expr(cleanup);
        self.visit_expr(result)
      }
      MTerm::RecGuard { body, .. } => self.visit_term(body),
    }
  }
}

/// Replaces placeholders by registered constants.
pub struct InstPlaceholders<'a>(pub &'a dyn Fn(PlaceholderId) -> Option<ConstId>);

impl VisitMut for InstPlaceholders<'_> {
  fn visit_callee(&mut self, c: &mut Callee) {
    if let CalleeRef::Placeholder(p) = c.target {
      if let Some(k) = (self.0)(p) {
        c.target = CalleeRef::Const(k)
      }
    }
  }
}
