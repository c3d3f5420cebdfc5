use crate::ast::Stmt;
use crate::proof::ProofError;
use crate::theory::StoreError;
use crate::types::Name;

#[derive(PartialEq, Eq)]
enum Severity {
  Error,
  Warning,
}

fn emit(file: &str, func: Option<&Name>, severity: Severity, msg: std::fmt::Arguments<'_>) -> bool {
  let sev = match severity {
    Severity::Error => "error",
    Severity::Warning => "warning",
  };
  match func {
    Some(func) => eprintln!("{file}: {func}: {sev}: {msg}"),
    None => eprintln!("{file}: {sev}: {msg}"),
  }
  severity == Severity::Error
}

/// A recoverable problem; the affected call site or function is still translated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Warning {
  /// A call target with no translation; the call became `fail`. `callee` is
  /// the guessed function name.
  MissingCalleeBody { func: Name, callee: Name },
  /// A function that is not a declared wrapper has no implementation.
  NoBody { func: Name },
}

impl Warning {
  pub fn func(&self) -> &Name {
    match self {
      Warning::MissingCalleeBody { func, .. } | Warning::NoBody { func } => func,
    }
  }

  pub fn report(&self, file: &str) {
    emit(file, Some(self.func()), Severity::Warning, format_args!("{self}"));
  }
}

impl std::fmt::Display for Warning {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Warning::MissingCalleeBody { callee, .. } =>
        write!(f, "no translation for callee {callee}, treating the call as failure"),
      Warning::NoBody { .. } => write!(f, "no implementation, translated as failure"),
    }
  }
}

#[derive(Debug)]
pub enum TranslateError {
  /// A fragment outside the supported grammar
  Unsupported { func: Name, what: &'static str, fragment: Box<Stmt> },
  FunctionNotFound(Name),
  /// A kernel rule refused a step: the term and its proof disagree
  Proof { func: Option<Name>, err: ProofError },
  Store(StoreError),
}

impl From<StoreError> for TranslateError {
  fn from(e: StoreError) -> Self { TranslateError::Store(e) }
}

impl TranslateError {
  pub fn proof(func: &Name) -> impl FnOnce(ProofError) -> TranslateError + '_ {
    move |err| TranslateError::Proof { func: Some(func.clone()), err }
  }

  /// Fatal errors stop the whole run; the others only abort the enclosing
  /// function and its cluster.
  pub fn is_fatal(&self) -> bool {
    matches!(self, TranslateError::Proof { .. } | TranslateError::Store(_))
  }

  pub fn func(&self) -> Option<&Name> {
    match self {
      TranslateError::Unsupported { func, .. } | TranslateError::FunctionNotFound(func) =>
        Some(func),
      TranslateError::Proof { func, .. } => func.as_ref(),
      TranslateError::Store(_) => None,
    }
  }

  /// Print the error to stderr. Returns true, as every translation error is
  /// an error-severity diagnostic.
  pub fn report(&self, file: &str) -> bool {
    emit(file, self.func(), Severity::Error, format_args!("{self}"))
  }
}

impl std::fmt::Display for TranslateError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      TranslateError::Unsupported { what, fragment, .. } =>
        write!(f, "unsupported {what}:\n{fragment:?}"),
      TranslateError::FunctionNotFound(func) => write!(f, "function {func} not found"),
      TranslateError::Proof { err, .. } => write!(f, "internal error, proof failed: {err}"),
      TranslateError::Store(err) => write!(f, "{err}"),
    }
  }
}

impl std::error::Error for TranslateError {}
