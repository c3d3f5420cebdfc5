//! Monotonicity of translated bodies in their measure argument.
//!
//! Every monadic construct is monotone in the measure if its parts are; a
//! call that passes `m - 1` to a member of the cluster is monotone by the
//! induction hypothesis, and anything not mentioning the measure is constant.

use super::{Lemma, OrProofError, ProofError};
use crate::monad::{CalleeRef, MTerm, MeasureArg};
use crate::types::ConstId;
use std::collections::BTreeSet;

pub(super) fn check(body: &MTerm, ih: &BTreeSet<ConstId>) -> OrProofError<()> {
  let err = |msg: String| Err(ProofError::new(Some(Lemma::Mono), msg));
  stacker::maybe_grow(32 * 1024, 1024 * 1024, || match body {
    MTerm::Call { callee, .. } => match (callee.target, callee.measure) {
      (CalleeRef::Placeholder(p), _) => err(format!("unresolved placeholder {p:?}")),
      (_, MeasureArg::Managed | MeasureArg::Unused) => Ok(()),
      (CalleeRef::Const(k), MeasureArg::Pred(_)) if ih.contains(&k) => Ok(()),
      (CalleeRef::Const(k), MeasureArg::Pred(_)) =>
        err(format!("measured call to {k:?} outside the cluster")),
    },
    _ => body.children().into_iter().try_for_each(|t| check(t, ih)),
  })
}
