use crate::types::*;
use serde_derive::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// State-level expressions: state transformers, guard sets, relations and
/// predicates. These are never evaluated, only compared, substituted into and
/// simplified. Binder names are assumed distinct from the free variables of
/// anything substituted under them.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
  Var(Name),
  Const(Name),
  Num(u64),
  True,
  False,
  Not(Box<Expr>),
  And(Box<Expr>, Box<Expr>),
  Or(Box<Expr>, Box<Expr>),
  Eq(Box<Expr>, Box<Expr>),
  App {
    func: Box<Expr>,
    args: Vec<Expr>,
  },
  Lam {
    var: Name,
    /// Binder type; the term builder stamps state binders with the world type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ty: Option<Name>,
    body: Box<Expr>,
  },
  /// The set of all states
  Univ,
  /// The empty set of states
  Empty,
  /// `{var. body}`
  Collect {
    var: Name,
    body: Box<Expr>,
  },
  /// `elem ∈ set`
  Mem {
    elem: Box<Expr>,
    set: Box<Expr>,
  },
  /// Reading a component of a state
  Field {
    state: Box<Expr>,
    field: Name,
  },
  /// `state(|field := value|)`
  Update {
    state: Box<Expr>,
    field: Name,
    value: Box<Expr>,
  },
  /// An unspecified value of any type
  Arbitrary,
}

impl Expr {
  pub fn var(s: &str) -> Self { Expr::Var(name(s)) }

  pub fn lam(var: &str, ty: Option<Name>, body: Expr) -> Self {
    Expr::Lam { var: name(var), ty, body: Box::new(body) }
  }

  pub fn mem(elem: Expr, set: Expr) -> Self {
    Expr::Mem { elem: Box::new(elem), set: Box::new(set) }
  }

  pub fn not(self) -> Self { Expr::Not(Box::new(self)) }

  /// Substitute `val` for the free variable `x`.
  pub fn subst(&self, x: &str, val: &Expr) -> Expr {
    let go = |e: &Expr| Box::new(e.subst(x, val));
    match self {
      Expr::Var(v) if &**v == x => val.clone(),
      Expr::Var(_)
      | Expr::Const(_)
      | Expr::Num(_)
      | Expr::True
      | Expr::False
      | Expr::Univ
      | Expr::Empty
      | Expr::Arbitrary => self.clone(),
      Expr::Not(e) => Expr::Not(go(e)),
      Expr::And(a, b) => Expr::And(go(a), go(b)),
      Expr::Or(a, b) => Expr::Or(go(a), go(b)),
      Expr::Eq(a, b) => Expr::Eq(go(a), go(b)),
      Expr::App { func, args } =>
        Expr::App { func: go(func), args: args.iter().map(|a| a.subst(x, val)).collect() },
      Expr::Lam { var, .. } | Expr::Collect { var, .. } if &**var == x => self.clone(),
      Expr::Lam { var, ty, body } => Expr::Lam { var: var.clone(), ty: ty.clone(), body: go(body) },
      Expr::Collect { var, body } => Expr::Collect { var: var.clone(), body: go(body) },
      Expr::Mem { elem, set } => Expr::Mem { elem: go(elem), set: go(set) },
      Expr::Field { state, field } => Expr::Field { state: go(state), field: field.clone() },
      Expr::Update { state, field, value } =>
        Expr::Update { state: go(state), field: field.clone(), value: go(value) },
    }
  }

  /// Simplify with the boolean, membership and beta laws. This is the
  /// predicate part of the guard simplification rule set.
  pub fn simp(&self) -> Expr {
    match self {
      Expr::Not(e) => match e.simp() {
        Expr::True => Expr::False,
        Expr::False => Expr::True,
        Expr::Not(e) => *e,
        e => e.not(),
      },
      Expr::And(a, b) => match (a.simp(), b.simp()) {
        (Expr::True, e) | (e, Expr::True) => e,
        (Expr::False, _) | (_, Expr::False) => Expr::False,
        (a, b) if a == b => a,
        (a, b) => Expr::And(Box::new(a), Box::new(b)),
      },
      Expr::Or(a, b) => match (a.simp(), b.simp()) {
        (Expr::False, e) | (e, Expr::False) => e,
        (Expr::True, _) | (_, Expr::True) => Expr::True,
        (a, b) if a == b => a,
        (a, b) => Expr::Or(Box::new(a), Box::new(b)),
      },
      Expr::Eq(a, b) => match (a.simp(), b.simp()) {
        (a, b) if a == b => Expr::True,
        (Expr::Num(a), Expr::Num(b)) => if a == b { Expr::True } else { Expr::False },
        (a, b) => Expr::Eq(Box::new(a), Box::new(b)),
      },
      Expr::Mem { elem, set } => match set.simp() {
        Expr::Univ => Expr::True,
        Expr::Empty => Expr::False,
        Expr::Collect { var, body } => body.subst(&var, elem).simp(),
        set => Expr::mem(elem.simp(), set),
      },
      Expr::Collect { var, body } => match body.simp() {
        Expr::True => Expr::Univ,
        Expr::False => Expr::Empty,
        body => Expr::Collect { var: var.clone(), body: Box::new(body) },
      },
      Expr::Lam { var, ty, body } =>
        Expr::Lam { var: var.clone(), ty: ty.clone(), body: Box::new(body.simp()) },
      Expr::App { func, args } => match (func.simp(), &**args) {
        (Expr::Lam { var, body, .. }, [arg]) => body.subst(&var, &arg.simp()).simp(),
        (func, _) => Expr::App { func: Box::new(func), args: args.iter().map(Expr::simp).collect() },
      },
      Expr::Field { state, field } => match state.simp() {
        Expr::Update { field: f2, value, .. } if f2 == *field => *value,
        Expr::Update { state, field: f2, .. } if f2 != *field =>
          Expr::Field { state, field: field.clone() }.simp(),
        state => Expr::Field { state: Box::new(state), field: field.clone() },
      },
      Expr::Update { state, field, value } => Expr::Update {
        state: Box::new(state.simp()),
        field: field.clone(),
        value: Box::new(value.simp()),
      },
      _ => self.clone(),
    }
  }

  /// Is this the constant predicate `λ_. b`?
  pub fn is_const_pred(&self, b: bool) -> bool {
    let val = if b { Expr::True } else { Expr::False };
    matches!(self, Expr::Lam { body, .. } if **body == val)
  }
}

/// The result-store part of a call: `λ t s. body`, where `t` is the callee's
/// final state and `s` the caller's state at the call.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultStore {
  pub binders: Vec<Name>,
  pub body: Box<Stmt>,
}

impl ResultStore {
  /// The only supported shape: two binders wrapping a plain state update.
  /// Returns the binders and the update function.
  pub fn canonical(&self) -> Option<(&Name, &Name, &Expr)> {
    match (&*self.binders, &*self.body) {
      ([t, s], Stmt::Assign(upd)) => Some((t, s, upd)),
      _ => None,
    }
  }
}

/// A structured-statement fragment.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stmt {
  Skip,
  Seq(Box<Stmt>, Box<Stmt>),
  /// A state transformer
  Assign(Expr),
  Cond {
    guard: Expr,
    left: Box<Stmt>,
    right: Box<Stmt>,
  },
  Catch(Box<Stmt>, Box<Stmt>),
  While {
    guard: Expr,
    body: Box<Stmt>,
  },
  Throw,
  /// Partial-correctness guard: fault unless the state is in `cond`
  Guard {
    cond: Expr,
    body: Box<Stmt>,
  },
  /// Initialize a local with an unspecified value via the update function
  LocalInit(Expr),
  /// A nondeterministic step given by a state relation
  Spec(Expr),
  GuardedSpec {
    cond: Expr,
    rel: Expr,
  },
  Call {
    setup: Expr,
    /// The procedure constant of the callee
    proc: Name,
    cleanup: Expr,
    result: ResultStore,
  },
  /// A call through a procedure-valued expression
  DynCall {
    setup: Expr,
    target: Expr,
    cleanup: Expr,
    result: ResultStore,
  },
}

impl Stmt {
  pub fn seq(a: Stmt, b: Stmt) -> Self { Stmt::Seq(Box::new(a), Box::new(b)) }

  pub fn cond(guard: Expr, left: Stmt, right: Stmt) -> Self {
    Stmt::Cond { guard, left: Box::new(left), right: Box::new(right) }
  }

  /// The procedure constants called directly from this fragment.
  pub fn calls(&self) -> BTreeSet<Name> {
    let mut out = BTreeSet::new();
    self.collect_calls(&mut out);
    out
  }

  fn collect_calls(&self, out: &mut BTreeSet<Name>) {
    match self {
      Stmt::Seq(a, b) | Stmt::Catch(a, b) | Stmt::Cond { left: a, right: b, .. } => {
        a.collect_calls(out);
        b.collect_calls(out)
      }
      Stmt::While { body, .. } | Stmt::Guard { body, .. } => body.collect_calls(out),
      Stmt::Call { proc, result, .. } => {
        out.insert(proc.clone());
        result.body.collect_calls(out)
      }
      Stmt::DynCall { result, .. } => result.body.collect_calls(out),
      Stmt::Skip
      | Stmt::Assign(_)
      | Stmt::Throw
      | Stmt::LocalInit(_)
      | Stmt::Spec(_)
      | Stmt::GuardedSpec { .. } => {}
    }
  }
}

/// The global procedure environment Γ: maps procedure constants to bodies.
/// Procedures that are declared but have no implementation are absent.
#[derive(Debug)]
pub struct Env {
  /// The world (state) type every monadic term is parameterized by
  pub world: Name,
  procs: HashMap<Name, Stmt>,
}

impl Env {
  pub fn new(world: Name) -> Self { Env { world, procs: HashMap::new() } }

  pub fn insert(&mut self, proc: Name, body: Stmt) -> Option<Stmt> { self.procs.insert(proc, body) }

  pub fn body(&self, proc: &str) -> Option<&Stmt> { self.procs.get(proc) }

  pub fn has_body(&self, proc: &str) -> bool { self.procs.contains_key(proc) }
}
