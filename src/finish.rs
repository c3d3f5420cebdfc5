//! Post-processing of a function's theorem: return-slot initialization and
//! the rewriting passes.

use crate::build::TermBuilder;
use crate::monad::MTerm;
use crate::proof::rewrite::{RewriteStep, RuleSet};
use crate::proof::{Lemma, OrProofError, Theorem};
use crate::types::Name;

/// Where to put the initialization of the return slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InitStrategy {
  /// Just inside an outermost recursion guard
  UnderRecGuard,
  /// In front of the whole term
  Prepend,
}

impl InitStrategy {
  /// Tried in this order; the first whose precondition holds is used.
  pub const ORDER: [InitStrategy; 2] = [InitStrategy::UnderRecGuard, InitStrategy::Prepend];

  pub fn applies(self, t: &MTerm) -> bool {
    match self {
      InitStrategy::UnderRecGuard => matches!(t, MTerm::RecGuard { .. }),
      InitStrategy::Prepend => true,
    }
  }

  fn lemma(self) -> Lemma {
    match self {
      InitStrategy::UnderRecGuard => Lemma::InitReturnRecGuard,
      InitStrategy::Prepend => Lemma::InitReturn,
    }
  }
}

#[derive(Clone, Debug)]
pub struct TraceRecord {
  pub label: &'static str,
  pub steps: Vec<RewriteStep>,
}

fn init_return(thm: Theorem, slot: &Name) -> OrProofError<Theorem> {
  let Some(t) = thm.mterm() else { return Ok(thm) };
  let Some(strategy) = InitStrategy::ORDER.into_iter().find(|s| s.applies(t)) else {
    return Ok(thm)
  };
  let init = TermBuilder::new(thm.env()).return_init(slot);
  thm.init_return(strategy.lemma(), init)
}

/// Clean up the theorem of a translated function. `return_slot` names the
/// state component holding the return value, if the function has one.
pub fn finish(
  thm: Theorem, return_slot: Option<&Name>, optimize: bool, trace: bool,
) -> OrProofError<(Theorem, Vec<TraceRecord>)> {
  let mut thm = match return_slot {
    Some(slot) => init_return(thm, slot)?,
    None => thm,
  };
  let mut records = vec![];
  let mut pass = |thm: Theorem, label: &'static str, rules: &[RuleSet]| -> OrProofError<Theorem> {
    let mut steps = vec![];
    let mut thm = thm;
    for &rules in rules {
      let (next, s) = thm.rewrite(rules, trace)?;
      thm = next;
      steps.extend(s)
    }
    if trace {
      records.push(TraceRecord { label, steps })
    }
    Ok(thm)
  };
  // without optimization the peephole pass is the identity
  let (peephole, exn): (&[RuleSet], &[RuleSet]) = if optimize {
    (&[RuleSet::Peephole], &[RuleSet::ExnBasic, RuleSet::ExnOpt])
  } else {
    (&[], &[RuleSet::ExnBasic])
  };
  thm = pass(thm, "guard opt", &[RuleSet::GuardSimp])?;
  thm = pass(thm, "peephole opt", peephole)?;
  thm = pass(thm, "exception opt", exn)?;
  Ok((thm, records))
}
