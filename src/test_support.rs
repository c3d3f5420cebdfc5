//! Fixture constructors shared by the unit tests.

use crate::ast::{Env, Expr, ResultStore, Stmt};
use crate::types::*;
use std::sync::Arc;

pub const WORLD: &str = "globals myvars";

/// An environment over the test world type with the given implementations.
pub fn env_with(procs: &[(&str, Stmt)]) -> Arc<Env> {
  let mut env = Env::new(name(WORLD));
  for (proc, body) in procs {
    env.insert(name(proc), body.clone());
  }
  Arc::new(env)
}

/// `λs. s(|x := n|)`
pub fn set(x: &str, n: u64) -> Expr {
  let upd = Expr::Update {
    state: Box::new(Expr::var("s")),
    field: name(x),
    value: Box::new(Expr::Num(n)),
  };
  Expr::lam("s", None, upd)
}

pub fn assign(x: &str, n: u64) -> Stmt { Stmt::Assign(set(x, n)) }

/// A call of `proc` that copies the callee's `ret'` into the caller's `r`.
pub fn call_stmt(proc: &str) -> Stmt {
  let upd = Expr::Update {
    state: Box::new(Expr::var("s")),
    field: name("r"),
    value: Box::new(Expr::Field { state: Box::new(Expr::var("t")), field: name("ret'") }),
  };
  Stmt::Call {
    setup: Expr::var("setup"),
    proc: name(proc),
    cleanup: Expr::var("cleanup"),
    result: ResultStore { binders: vec![name("t"), name("s")], body: Box::new(Stmt::Assign(upd)) },
  }
}
