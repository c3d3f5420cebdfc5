//! Loading a program description from JSON.

use crate::ast::{Env, Stmt};
use crate::types::*;
use serde_derive::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Deserialize)]
struct FunctionDesc {
  name: Name,
  proc: Name,
  #[serde(default)]
  body: Option<Stmt>,
  #[serde(default)]
  return_slot: Option<Name>,
  #[serde(default)]
  wrapper: bool,
}

#[derive(Deserialize)]
struct ProgramDesc {
  file: Name,
  world: Name,
  functions: Vec<FunctionDesc>,
}

/// A function as declared by the program, without its body (which lives in
/// the environment under `proc`).
#[derive(Clone, Debug)]
pub struct FunctionDecl {
  pub name: Name,
  /// The procedure constant the body is bound to
  pub proc: Name,
  pub return_slot: Option<Name>,
  /// Deliberately has no body of its own
  pub wrapper: bool,
}

#[derive(Debug)]
pub struct Program {
  pub file: Name,
  pub env: Arc<Env>,
  pub functions: Vec<FunctionDecl>,
}

#[derive(Debug)]
pub enum ReadError {
  Io(PathBuf, std::io::Error),
  Json(serde_json::Error),
  DuplicateFunction(Name),
  DuplicateProc(Name),
}

impl std::fmt::Display for ReadError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ReadError::Io(path, e) => write!(f, "{}: {e}", path.display()),
      ReadError::Json(e) => write!(f, "malformed program: {e}"),
      ReadError::DuplicateFunction(name) => write!(f, "function {name} is declared twice"),
      ReadError::DuplicateProc(proc) => write!(f, "procedure {proc} is bound twice"),
    }
  }
}

impl std::error::Error for ReadError {}

impl ReadError {
  pub fn report(&self, file: &str) -> bool {
    eprintln!("{file}: error: {self}");
    true
  }
}

impl Program {
  pub fn parse(src: &str) -> Result<Program, ReadError> {
    let desc: ProgramDesc = serde_json::from_str(src).map_err(ReadError::Json)?;
    let mut env = Env::new(desc.world);
    let (mut names, mut procs) = (HashSet::new(), HashSet::new());
    let mut functions = vec![];
    for f in desc.functions {
      if !names.insert(f.name.clone()) {
        return Err(ReadError::DuplicateFunction(f.name))
      }
      if !procs.insert(f.proc.clone()) {
        return Err(ReadError::DuplicateProc(f.proc))
      }
      if let Some(body) = f.body {
        env.insert(f.proc.clone(), body);
      }
      functions.push(FunctionDecl {
        name: f.name,
        proc: f.proc,
        return_slot: f.return_slot,
        wrapper: f.wrapper,
      })
    }
    Ok(Program { file: desc.file, env: Arc::new(env), functions })
  }

  pub fn read(path: &Path) -> Result<Program, ReadError> {
    let src = std::fs::read_to_string(path).map_err(|e| ReadError::Io(path.to_owned(), e))?;
    Self::parse(&src)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bodies_go_into_the_environment() {
    let src = r#"{
      "file": "demo.c",
      "world": "globals myvars",
      "functions": [
        { "name": "f", "proc": "f_'proc", "body": { "Seq": ["Skip", "Throw"] }, "return_slot": "ret'" },
        { "name": "ext", "proc": "ext_'proc", "wrapper": true }
      ]
    }"#;
    let p = Program::parse(src).unwrap();
    assert_eq!(&*p.file, "demo.c");
    assert!(p.env.body("f_'proc") == Some(&Stmt::seq(Stmt::Skip, Stmt::Throw)));
    assert!(!p.env.has_body("ext_'proc"));
    assert_eq!(p.functions[0].return_slot.as_deref(), Some("ret'"));
    assert!(p.functions[1].wrapper);
  }

  #[test]
  fn duplicate_declarations_are_rejected() {
    let src = r#"{ "file": "d.c", "world": "w", "functions": [
      { "name": "f", "proc": "f_'proc" }, { "name": "f", "proc": "g_'proc" } ] }"#;
    assert!(matches!(Program::parse(src), Err(ReadError::DuplicateFunction(_))));
    assert!(matches!(Program::parse("{"), Err(ReadError::Json(_))));
  }
}
