use crate::ast::{Expr, ResultStore, Stmt};
use crate::build::Ctor;
use crate::error::{TranslateError, Warning};
use crate::monad::{Callee, CalleeRef, MTerm, MeasureArg};
use crate::proof::{Lemma, Recipe};
use crate::translate::Translator;
use crate::types::*;
use crate::{stat, vprintln};

/// The function a procedure constant belongs to, when the name table does not
/// know it: the constant with its `_'proc` suffix removed.
pub fn guess_function_name(proc: &str) -> Name { name(proc.strip_suffix("_'proc").unwrap_or(proc)) }

/// How a call site passes the measure, and the lemma justifying it.
pub fn classify_call(
  recursive_site: bool, target_recursive: bool, measure: MeasureVar,
) -> (MeasureArg, Lemma) {
  if recursive_site {
    (MeasureArg::Pred(measure), Lemma::CallRecursive)
  } else if target_recursive {
    (MeasureArg::Managed, Lemma::CallRecursive)
  } else {
    (MeasureArg::Unused, Lemma::CallExternal)
  }
}

impl Translator<'_> {
  pub(crate) fn translate_call(
    &mut self, stmt: &Stmt, setup: &Expr, proc: &Name, cleanup: &Expr, result: &ResultStore,
  ) -> Result<(MTerm, Recipe), TranslateError> {
    let Some((t, s, upd)) = result.canonical() else {
      return Err(self.unsupported("call result store", stmt))
    };
    let func = match self.proc_names.get(proc) {
      Some(func) => func.clone(),
      None => guess_function_name(proc),
    };
    let Some((p, entry)) = self.callees.get(&func) else {
      stat("missing callee");
      vprintln!("{}: no translation for callee {func}, using fail", self.func);
      self.warnings.push(Warning::MissingCalleeBody { func: self.func.clone(), callee: func });
      return Ok((self.b.wrap_monadic(Ctor::Fail, vec![]), Recipe::leaf(Lemma::CallUndefined)))
    };
    let (measure, lemma) = classify_call(entry.recursive, entry.target_recursive, self.measure);
    let callee = Callee { target: CalleeRef::Placeholder(p), measure };
    let handler = self.b.result_handler(t, s, upd);
    let args = vec![setup.clone().into(), callee.into(), cleanup.clone().into(), handler.into()];
    Ok((self.b.wrap_monadic(Ctor::Call, args), Recipe::apply(lemma, vec![Recipe::Hyp(p)])))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::build::TermBuilder;
  use crate::test_support::*;
  use crate::translate::{CalleeEntry, CalleeTable};
  use std::collections::HashMap;

  fn entry(func: &str, recursive: bool, target_recursive: bool) -> CalleeEntry {
    CalleeEntry { func: name(func), proc: name(&format!("{func}_'proc")), recursive, target_recursive }
  }

  #[test]
  fn call_sites_are_classified() {
    let env = env_with(&[("f_'proc", Stmt::Skip), ("g_'proc", Stmt::Skip), ("h_'proc", Stmt::Skip)]);
    let mut table = CalleeTable::new();
    table.push(entry("f", false, false)); // plain callee
    table.push(entry("g", true, true)); // sibling in the caller's cluster
    table.push(entry("h", false, true)); // recursive, but in another cluster
    let names = HashMap::new();
    let m = MeasureVar(2);
    let mut tr = Translator::new(&env, &table, &names, m, name("caller"));
    let mut site = |proc: &str| {
      let (t, recipe) = tr.translate(&call_stmt(proc)).unwrap();
      let MTerm::Call { callee, .. } = t else { panic!("expected a call, got {t:?}") };
      (callee.measure, recipe.lemmas())
    };
    assert_eq!(site("f_'proc"), (MeasureArg::Unused, vec![Lemma::CallExternal]));
    assert_eq!(site("g_'proc"), (MeasureArg::Pred(m), vec![Lemma::CallRecursive]));
    assert_eq!(site("h_'proc"), (MeasureArg::Managed, vec![Lemma::CallRecursive]));
    assert!(tr.warnings.is_empty());
  }

  #[test]
  fn missing_callee_becomes_fail_with_one_warning() {
    let env = env_with(&[]);
    let (table, names) = (CalleeTable::new(), HashMap::new());
    let mut tr = Translator::new(&env, &table, &names, MeasureVar(0), name("f"));
    let stmt = Stmt::seq(call_stmt("missing_'proc"), Stmt::Skip);
    let (t, recipe) = tr.translate(&stmt).unwrap();
    assert!(t == MTerm::seq(MTerm::Fail, MTerm::Skip));
    assert_eq!(recipe.lemmas(), [Lemma::Seq, Lemma::CallUndefined, Lemma::Skip]);
    assert_eq!(tr.warnings, [Warning::MissingCalleeBody { func: name("f"), callee: name("missing") }]);
    assert!(crate::stat_count("missing callee") >= 1);

    // and the kernel accepts the substitution
    let b = TermBuilder::new(&env);
    let goal = b.correspondence_proposition(true, &env, t, stmt);
    assert!(goal.prove(&recipe, &table.hyps(), MeasureVar(0)).is_ok());
  }

  #[test]
  fn untranslated_callee_with_body_also_becomes_fail() {
    let env = env_with(&[("g_'proc", Stmt::Skip)]);
    let (table, names) = (CalleeTable::new(), HashMap::new());
    let mut tr = Translator::new(&env, &table, &names, MeasureVar(0), name("f"));
    let stmt = call_stmt("g_'proc");
    let (t, recipe) = tr.translate(&stmt).unwrap();
    assert!(t == MTerm::Fail);
    assert_eq!(tr.warnings, [Warning::MissingCalleeBody { func: name("f"), callee: name("g") }]);
    let goal = TermBuilder::new(&env).correspondence_proposition(true, &env, t, stmt);
    assert!(goal.prove(&recipe, &table.hyps(), MeasureVar(0)).is_ok());
  }

  #[test]
  fn result_store_must_be_canonical() {
    let env = env_with(&[]);
    let (table, names) = (CalleeTable::new(), HashMap::new());
    let mut tr = Translator::new(&env, &table, &names, MeasureVar(0), name("f"));
    let Stmt::Call { setup, proc, cleanup, mut result } = call_stmt("g_'proc") else { unreachable!() };
    result.body = Box::new(Stmt::seq(Stmt::Skip, (*result.body).clone()));
    let r = tr.translate(&Stmt::Call { setup, proc, cleanup, result });
    assert!(matches!(r, Err(TranslateError::Unsupported { what: "call result store", .. })));
  }

  #[test]
  fn translated_calls_are_accepted_by_the_kernel() {
    let env = env_with(&[("g_'proc", Stmt::Skip)]);
    let mut table = CalleeTable::new();
    table.push(entry("g", false, true));
    let names = [(name("g_'proc"), name("g"))].into_iter().collect();
    let mut tr = Translator::new(&env, &table, &names, MeasureVar(0), name("f"));
    let stmt = call_stmt("g_'proc");
    let (t, recipe) = tr.translate(&stmt).unwrap();
    let goal = TermBuilder::new(&env).correspondence_proposition(false, &env, t, stmt);
    let thm = goal.prove(&recipe, &table.hyps(), MeasureVar(0)).unwrap();
    assert_eq!(thm.hyps().len(), 1);
  }
}
