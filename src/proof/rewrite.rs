//! Equivalences of monadic terms, grouped into the rule sets used after
//! translation. Every rule maps a term to one that has the same behaviour on
//! every state, so [`Theorem::rewrite`](super::Theorem::rewrite) can apply
//! them without touching the fragment side.

use crate::monad::MTerm;
use enum_map::Enum;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Enum)]
pub enum RuleSet {
  /// Simplify guard predicates; drop trivial guards
  GuardSimp,
  /// Local cleanups of `skip`, `fail`, conditions and loops
  Peephole,
  /// Remove handlers that cannot be reached
  ExnBasic,
  /// Further exception rewrites; only valid for the fully optimized output
  ExnOpt,
}

pub struct Rule {
  pub name: &'static str,
  apply: fn(&MTerm) -> Option<MTerm>,
}

#[derive(Clone)]
pub struct RewriteStep {
  pub rule: &'static str,
  pub before: MTerm,
  pub after: MTerm,
}

macro_rules! rules {
  ($($name:literal => $f:expr,)*) => { &[$(Rule { name: $name, apply: $f },)*] }
}

const GUARD_SIMP: &[Rule] = rules! {
  "guard-true" => |t| match t {
    MTerm::Guard(p) if p.is_const_pred(true) => Some(MTerm::Skip),
    _ => None,
  },
  "guard-false" => |t| match t {
    MTerm::Guard(p) if p.is_const_pred(false) => Some(MTerm::Fail),
    _ => None,
  },
  "guard-simp" => |t| match t {
    MTerm::Guard(p) => Some(p.simp()).filter(|q| q != p).map(MTerm::Guard),
    _ => None,
  },
};

const PEEPHOLE: &[Rule] = rules! {
  "seq-skip-left" => |t| match t {
    MTerm::Seq(a, b) if **a == MTerm::Skip => Some((**b).clone()),
    _ => None,
  },
  "seq-skip-right" => |t| match t {
    MTerm::Seq(a, b) if **b == MTerm::Skip => Some((**a).clone()),
    _ => None,
  },
  "seq-fail" => |t| match t {
    MTerm::Seq(a, _) if **a == MTerm::Fail => Some(MTerm::Fail),
    _ => None,
  },
  "update-then-fail" => |t| match t {
    MTerm::Seq(a, b) if **b == MTerm::Fail && matches!(**a, MTerm::Modify(_) | MTerm::Init(_)) =>
      Some(MTerm::Fail),
    _ => None,
  },
  "condition-true" => |t| match t {
    MTerm::Condition { pred, left, .. } if pred.is_const_pred(true) => Some((**left).clone()),
    _ => None,
  },
  "condition-false" => |t| match t {
    MTerm::Condition { pred, right, .. } if pred.is_const_pred(false) => Some((**right).clone()),
    _ => None,
  },
  "condition-same" => |t| match t {
    MTerm::Condition { left, right, .. } if left == right => Some((**left).clone()),
    _ => None,
  },
  "while-false" => |t| match t {
    MTerm::While { pred, .. } if pred.is_const_pred(false) => Some(MTerm::Skip),
    _ => None,
  },
  "condition-simp" => |t| match t {
    MTerm::Condition { pred, left, right } => Some(pred.simp())
      .filter(|q| q != pred)
      .map(|pred| MTerm::Condition { pred, left: left.clone(), right: right.clone() }),
    _ => None,
  },
  "while-simp" => |t| match t {
    MTerm::While { pred, body } =>
      Some(pred.simp()).filter(|q| q != pred).map(|pred| MTerm::While { pred, body: body.clone() }),
    _ => None,
  },
};

const EXN_BASIC: &[Rule] = rules! {
  "catch-no-throw" => |t| match t {
    MTerm::Catch(body, _) if !body.may_throw() => Some((**body).clone()),
    _ => None,
  },
  "catch-throw" => |t| match t {
    MTerm::Catch(body, handler) if **body == MTerm::Throw => Some((**handler).clone()),
    _ => None,
  },
};

const EXN_OPT: &[Rule] = rules! {
  "catch-rethrow" => |t| match t {
    MTerm::Catch(body, handler) if **handler == MTerm::Throw => Some((**body).clone()),
    _ => None,
  },
  "seq-throw" => |t| match t {
    MTerm::Seq(a, _) if **a == MTerm::Throw => Some(MTerm::Throw),
    _ => None,
  },
};

impl RuleSet {
  pub fn rules(self) -> &'static [Rule] {
    match self {
      RuleSet::GuardSimp => GUARD_SIMP,
      RuleSet::Peephole => PEEPHOLE,
      RuleSet::ExnBasic => EXN_BASIC,
      RuleSet::ExnOpt => EXN_OPT,
    }
  }
}

fn map_children(t: MTerm, mut f: impl FnMut(MTerm) -> MTerm) -> MTerm {
  let mut go = |t: Box<MTerm>| Box::new(f(*t));
  match t {
    MTerm::Seq(a, b) => {
      let a = go(a);
      MTerm::Seq(a, go(b))
    }
    MTerm::Catch(a, b) => {
      let a = go(a);
      MTerm::Catch(a, go(b))
    }
    MTerm::Condition { pred, left, right } => {
      let left = go(left);
      MTerm::Condition { pred, left, right: go(right) }
    }
    MTerm::While { pred, body } => MTerm::While { pred, body: go(body) },
    MTerm::RecGuard { measure, body } => MTerm::RecGuard { measure, body: go(body) },
    t => t,
  }
}

/// Rewrite to a normal form, innermost first.
pub fn normalize(t: MTerm, rules: RuleSet, trace: &mut Option<Vec<RewriteStep>>) -> MTerm {
  stacker::maybe_grow(32 * 1024, 1024 * 1024, || {
    let t = map_children(t, |c| normalize(c, rules, trace));
    rewrite_top(t, rules.rules(), trace)
  })
}

// The children of `t` are already normal, and every rule produces either a
// subterm of its input or a node over such subterms, so only the root needs
// another look after a step.
fn rewrite_top(mut t: MTerm, rules: &[Rule], trace: &mut Option<Vec<RewriteStep>>) -> MTerm {
  'outer: loop {
    for rule in rules {
      if let Some(after) = (rule.apply)(&t) {
        crate::stat("rewrite");
        if let Some(trace) = trace {
          trace.push(RewriteStep { rule: rule.name, before: t, after: after.clone() })
        }
        t = after;
        continue 'outer
      }
    }
    return t
  }
}
