//! Translation of a single function, as an explicit sequence of stages:
//! [`BodyFetched`] → [`Translated`] → [`RecursionWrapped`] → [`Assembled`].

use crate::ast::{Env, Stmt};
use crate::build::TermBuilder;
use crate::error::{TranslateError, Warning};
use crate::finish::{finish, TraceRecord};
use crate::monad::{CalleeRef, MeasureArg};
use crate::orchestrate::FunctionInfo;
use crate::proof::Theorem;
use crate::translate::{CalleeEntry, CalleeTable, Translator};
use crate::types::*;
use crate::{stat, vprintln};
use itertools::Itertools;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Everything a function translation reads.
pub struct DriverCtx<'a> {
  pub env: &'a Arc<Env>,
  pub proc_names: &'a HashMap<Name, Name>,
  /// All known functions; callees outside the current cluster are translated
  pub functions: &'a im::OrdMap<Name, FunctionInfo>,
  pub check_termination: bool,
  pub optimize: bool,
  pub trace: bool,
}

pub struct BodyFetched<'a> {
  ctx: &'a DriverCtx<'a>,
  info: &'a FunctionInfo,
  /// `None` if the procedure is declared but has no implementation
  body: Option<&'a Stmt>,
}

pub struct Translated<'a> {
  ctx: &'a DriverCtx<'a>,
  info: &'a FunctionInfo,
  /// About the body, if there is one
  thm: Option<Theorem>,
  table: CalleeTable,
  warnings: Vec<Warning>,
}

pub struct RecursionWrapped<'a>(Translated<'a>);

/// A finished function translation, still referring to its callees through
/// placeholders.
pub struct Assembled {
  pub name: Name,
  /// `corres ct Γ m (Call proc)`
  pub thm: Theorem,
  pub table: CalleeTable,
  /// The callees that really occur as recursive call sites
  pub realized_rec_callees: BTreeSet<Name>,
  pub warnings: Vec<Warning>,
  pub traces: Vec<TraceRecord>,
}

impl<'a> DriverCtx<'a> {
  pub fn fetch(&'a self, name: &str) -> Result<BodyFetched<'a>, TranslateError> {
    let not_found = || TranslateError::FunctionNotFound(crate::types::name(name));
    let info = self.functions.get(name).ok_or_else(not_found)?;
    Ok(BodyFetched { ctx: self, info, body: self.env.body(&info.proc) })
  }

  /// The placeholders for a function: one per callee that is either in the
  /// same cluster or already translated. Other callees are resolved at the
  /// call site.
  fn callee_table(&self, info: &FunctionInfo) -> CalleeTable {
    let mut table = CalleeTable::new();
    for c in &info.callees {
      let Some(ci) = self.functions.get(c) else { continue };
      let recursive = info.rec_callees.contains(c);
      if recursive || ci.translation.is_some() {
        table.push(CalleeEntry {
          func: c.clone(),
          proc: ci.proc.clone(),
          recursive,
          target_recursive: ci.measured,
        });
      }
    }
    table
  }
}

impl<'a> BodyFetched<'a> {
  pub fn translate(self, measure: MeasureVar) -> Result<Translated<'a>, TranslateError> {
    let BodyFetched { ctx, info, body } = self;
    let table = ctx.callee_table(info);
    let Some(body) = body else {
      let warnings =
        if info.wrapper { vec![] } else { vec![Warning::NoBody { func: info.name.clone() }] };
      return Ok(Translated { ctx, info, thm: None, table, warnings })
    };
    vprintln!("translating {} with {} placeholders", info.name, table.entries.len());
    let mut tr = Translator::new(ctx.env, &table, ctx.proc_names, measure, info.name.clone());
    let (mterm, recipe) = tr.translate(body)?;
    if crate::verbose() {
      let counts = recipe.lemma_counts();
      let used = counts.iter().filter(|(_, &n)| n > 0).map(|(l, n)| format!("{l} x{n}"));
      eprintln!("{}: {}", info.name, used.format(", "));
    }
    let warnings = tr.warnings;
    let goal = TermBuilder::new(ctx.env).correspondence_proposition(
      ctx.check_termination,
      ctx.env,
      mterm,
      body.clone(),
    );
    let thm = goal.prove(&recipe, &table.hyps(), measure).map_err(TranslateError::proof(&info.name))?;
    Ok(Translated { ctx, info, thm: Some(thm), table, warnings })
  }
}

impl<'a> Translated<'a> {
  /// Guard the body on the measure if the function takes one.
  pub fn wrap_recursion(mut self) -> Result<RecursionWrapped<'a>, TranslateError> {
    if self.info.measured {
      if let Some(thm) = self.thm.take() {
        self.thm = Some(thm.rec_guard().map_err(TranslateError::proof(&self.info.name))?)
      }
    }
    Ok(RecursionWrapped(self))
  }
}

impl RecursionWrapped<'_> {
  pub fn assemble(self) -> Result<Assembled, TranslateError> {
    let Translated { ctx, info, thm, table, warnings } = self.0;
    let err = TranslateError::proof(&info.name);
    let (thm, traces) = match thm {
      None => {
        let thm = Theorem::undefined_fn(ctx.check_termination, ctx.env, info.proc.clone());
        (thm.map_err(err)?, vec![])
      }
      Some(thm) => {
        let thm = thm.unfold_impl(info.proc.clone()).map_err(TranslateError::proof(&info.name))?;
        finish(thm, info.return_slot.as_ref(), ctx.optimize, ctx.trace).map_err(err)?
      }
    };
    let mut realized_rec_callees = BTreeSet::new();
    if let Some(t) = thm.mterm() {
      t.callees(&mut |c| {
        if let (CalleeRef::Placeholder(p), MeasureArg::Pred(_)) = (c.target, c.measure) {
          realized_rec_callees.insert(table.entries[p].func.clone());
        }
      })
    }
    stat("function translated");
    Ok(Assembled { name: info.name.clone(), thm, table, realized_rec_callees, warnings, traces })
  }
}

/// Run all stages for one function.
pub fn translate_function(
  ctx: &DriverCtx<'_>, name: &str, measure: MeasureVar,
) -> Result<Assembled, TranslateError> {
  ctx.fetch(name)?.translate(measure)?.wrap_recursion()?.assemble()
}
