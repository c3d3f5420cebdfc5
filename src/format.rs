use crate::ast::{Expr, ResultStore, Stmt};
use crate::monad::{Callee, CalleeRef, MTerm, MeasureArg};
use crate::proof::rewrite::RewriteStep;
use crate::proof::{Prop, Theorem};
use crate::types::*;
use pretty::{Arena, DocAllocator, DocBuilder};

const WIDTH: usize = 100;

struct Pretty<'a> {
  arena: &'a Arena<'a>,
  names: Option<&'a dyn Fn(ConstId) -> Option<Name>>,
}

impl Pretty<'_> {
  fn with<R>(
    names: Option<&dyn Fn(ConstId) -> Option<Name>>, f: impl for<'b> FnOnce(&'b Pretty<'b>) -> R,
  ) -> R {
    let arena = Arena::new();
    f(&Pretty { arena: &arena, names })
  }
}

impl<'a> std::ops::Deref for Pretty<'a> {
  type Target = &'a Arena<'a>;
  fn deref(&self) -> &Self::Target { &self.arena }
}

type Doc<'a> = DocBuilder<'a, Arena<'a>>;

impl<'a> Pretty<'a> {
  fn parens_if(&self, prec: bool, doc: Doc<'a>) -> Doc<'a> {
    if prec {
      doc.parens()
    } else {
      doc
    }
  }

  fn infix(&self, prec: bool, a: &Expr, op: &'static str, b: &Expr) -> Doc<'a> {
    let doc = self.expr(true, a).append(self.line()).append(op).append(" ").append(self.expr(true, b));
    self.parens_if(prec, doc.nest(2).group())
  }

  fn expr(&self, prec: bool, e: &Expr) -> Doc<'a> {
    match e {
      Expr::Var(x) | Expr::Const(x) => self.text(x.to_string()),
      Expr::Num(n) => self.text(n.to_string()),
      Expr::True => self.text("True"),
      Expr::False => self.text("False"),
      Expr::Not(e) => self.text("¬").append(self.expr(true, e)),
      Expr::And(a, b) => self.infix(prec, a, "∧", b),
      Expr::Or(a, b) => self.infix(prec, a, "∨", b),
      Expr::Eq(a, b) => self.infix(prec, a, "=", b),
      Expr::Mem { elem, set } => self.infix(prec, elem, "∈", set),
      Expr::App { func, args } => {
        let doc = self.expr(true, func);
        let doc = args.iter().fold(doc, |doc, a| doc.append(self.line()).append(self.expr(true, a)));
        self.parens_if(prec && !args.is_empty(), doc.nest(2).group())
      }
      Expr::Lam { var, ty, body } => {
        let binder = match ty {
          Some(ty) => format!("λ{var}::{ty}."),
          None => format!("λ{var}."),
        };
        let doc = self.text(binder).append(self.line()).append(self.expr(false, body));
        self.parens_if(prec, doc.nest(2).group())
      }
      Expr::Univ => self.text("UNIV"),
      Expr::Empty => self.text("{}"),
      Expr::Collect { var, body } =>
        self.text(format!("{var}.")).append(self.line()).append(self.expr(false, body)).nest(2).braces(),
      Expr::Field { state, field } => self.expr(true, state).append(format!(".{field}")),
      Expr::Update { state, field, value } => self
        .expr(true, state)
        .append(format!("(|{field} :="))
        .append(self.line())
        .append(self.expr(false, value))
        .append("|)")
        .nest(2)
        .group(),
      Expr::Arbitrary => self.text("arbitrary"),
    }
  }

  fn result_store(&self, rs: &ResultStore) -> Doc<'a> {
    let binders = rs.binders.iter().map(|b| format!("λ{b}. ")).collect::<String>();
    self.text(binders).append(self.stmt(true, &rs.body)).group()
  }

  fn stmt(&self, prec: bool, s: &Stmt) -> Doc<'a> {
    let doc = match s {
      Stmt::Skip => return self.text("SKIP"),
      Stmt::Throw => return self.text("THROW"),
      Stmt::Seq(a, b) =>
        self.stmt(true, a).append(";;").append(self.line()).append(self.stmt(true, b)).group(),
      Stmt::Assign(f) => self.text("Basic").append(self.line()).append(self.expr(true, f)),
      Stmt::Cond { guard, left, right } => self
        .text("IF ")
        .append(self.expr(false, guard))
        .append(self.line())
        .append("THEN ")
        .append(self.stmt(false, left))
        .append(self.line())
        .append("ELSE ")
        .append(self.stmt(false, right))
        .append(self.line())
        .append("FI"),
      Stmt::Catch(a, b) => self
        .text("TRY ")
        .append(self.stmt(false, a))
        .append(self.line())
        .append("CATCH ")
        .append(self.stmt(false, b))
        .append(self.line())
        .append("END"),
      Stmt::While { guard, body } => self
        .text("WHILE ")
        .append(self.expr(false, guard))
        .append(" DO")
        .append(self.line())
        .append(self.stmt(false, body))
        .append(self.line())
        .append("OD"),
      Stmt::Guard { cond, body } => self
        .text("Guard")
        .append(self.line())
        .append(self.expr(true, cond))
        .append(self.line())
        .append(self.stmt(true, body)),
      Stmt::LocalInit(f) => self.text("init").append(self.line()).append(self.expr(true, f)),
      Stmt::Spec(r) => self.text("Spec").append(self.line()).append(self.expr(true, r)),
      Stmt::GuardedSpec { cond, rel } => self
        .text("guarded_spec")
        .append(self.line())
        .append(self.expr(true, cond))
        .append(self.line())
        .append(self.expr(true, rel)),
      Stmt::Call { setup, proc, cleanup, result } => self
        .text("call")
        .append(self.line())
        .append(self.expr(true, setup))
        .append(self.line())
        .append(proc.to_string())
        .append(self.line())
        .append(self.expr(true, cleanup))
        .append(self.line())
        .append(self.result_store(result).parens()),
      Stmt::DynCall { setup, target, cleanup, result } => self
        .text("dynCall")
        .append(self.line())
        .append(self.expr(true, setup))
        .append(self.line())
        .append(self.expr(true, target))
        .append(self.line())
        .append(self.expr(true, cleanup))
        .append(self.line())
        .append(self.result_store(result).parens()),
    };
    self.parens_if(prec, doc.nest(2).group())
  }

  fn konst(&self, k: ConstId) -> Doc<'a> {
    match self.names.and_then(|names| names(k)) {
      Some(name) => self.text(name.to_string()),
      None => self.text(format!("c{}", k.0)),
    }
  }

  fn callee(&self, c: &Callee) -> Doc<'a> {
    let target = match c.target {
      CalleeRef::Placeholder(p) => self.text(format!("?f{}", p.0)),
      CalleeRef::Const(k) => self.konst(k),
    };
    let measure = match c.measure {
      MeasureArg::Pred(m) => self.text(format!("(m{} - 1)", m.0)),
      MeasureArg::Managed => self.text("measure_call"),
      MeasureArg::Unused => self.text("arbitrary"),
    };
    target.append(self.space()).append(measure).parens()
  }

  fn mterm(&self, prec: bool, t: &MTerm) -> Doc<'a> {
    let doc = match t {
      MTerm::Skip => return self.text("skip"),
      MTerm::Throw => return self.text("throw"),
      MTerm::Fail => return self.text("fail"),
      MTerm::Seq(a, b) =>
        self.mterm(true, a).append(" >>=").append(self.line()).append(self.mterm(true, b)).group(),
      MTerm::Modify(f) => self.text("modify").append(self.line()).append(self.expr(true, f)),
      MTerm::Guard(p) => self.text("guard").append(self.line()).append(self.expr(true, p)),
      MTerm::Init(f) => self.text("init").append(self.line()).append(self.expr(true, f)),
      MTerm::Spec(r) => self.text("spec").append(self.line()).append(self.expr(true, r)),
      MTerm::Condition { pred, left, right } => self
        .text("condition")
        .append(self.line())
        .append(self.expr(true, pred))
        .append(self.line())
        .append(self.mterm(true, left))
        .append(self.line())
        .append(self.mterm(true, right)),
      MTerm::Catch(a, b) => self
        .text("catch")
        .append(self.line())
        .append(self.mterm(true, a))
        .append(self.line())
        .append(self.mterm(true, b)),
      MTerm::While { pred, body } => self
        .text("while")
        .append(self.line())
        .append(self.expr(true, pred))
        .append(self.line())
        .append(self.mterm(true, body)),
      MTerm::Call { setup, callee, cleanup, result } => self
        .text("call")
        .append(self.line())
        .append(self.expr(true, setup))
        .append(self.line())
        .append(self.callee(callee))
        .append(self.line())
        .append(self.expr(true, cleanup))
        .append(self.line())
        .append(self.expr(true, result)),
      MTerm::RecGuard { measure, body } => self
        .text(format!("recguard m{}", measure.0))
        .append(self.line())
        .append(self.mterm(true, body)),
    };
    self.parens_if(prec, doc.nest(2).group())
  }

  fn prop(&self, ct: bool, prop: &Prop) -> Doc<'a> {
    let corres = |m: Doc<'a>, c: Doc<'a>| {
      self.text(format!("corres {ct} Γ")).append(self.line()).append(m).append(self.line()).append(c)
    };
    let doc = match prop {
      Prop::Corres { mterm, stmt } => corres(self.mterm(true, mterm), self.stmt(true, stmt)),
      Prop::CallCorres { mterm, proc } =>
        corres(self.mterm(true, mterm), self.text(format!("(Call {proc})"))),
      Prop::FnCorres { konst, proc } => corres(
        self.konst(*konst).append(" m").parens(),
        self.text(format!("(Call {proc})")),
      ),
      Prop::Mono { konst } => self.text("monotone").append(self.line()).append(self.konst(*konst)),
      Prop::MonoAll(ks) => {
        let docs = ks.iter().map(|&k| self.text("monotone ").append(self.konst(k)));
        self.intersperse(docs, self.text(" ∧").append(self.line()))
      }
    };
    doc.nest(2).group()
  }

  fn theorem(&self, thm: &Theorem) -> Doc<'a> {
    let hyps = thm.hyps().iter().map(|(p, h)| {
      let kind = if h.recursive { "IH" } else { "H" };
      self.text(format!("{kind} ?f{} ~ {}", p.0, h.proc))
    });
    let hyps = self.intersperse(hyps, self.text(",").append(self.line()));
    let doc = if thm.hyps().is_empty() { self.nil() } else { hyps.append(self.line()) };
    doc.append("⊢ ").append(self.prop(thm.ct(), thm.prop())).nest(2).group()
  }
}

/// Render a monadic term, naming registered constants with `names`.
pub fn render_term(t: &MTerm, names: &dyn Fn(ConstId) -> Option<Name>) -> String {
  let mut out = String::new();
  // writing to a `String` cannot fail
  let _ = Pretty::with(Some(names), |p| p.mterm(false, t).render_fmt(WIDTH, &mut out));
  out
}

impl std::fmt::Debug for Expr {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    Pretty::with(None, |p| p.expr(false, self).render_fmt(WIDTH, f))
  }
}
impl std::fmt::Debug for Stmt {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    Pretty::with(None, |p| p.stmt(false, self).render_fmt(WIDTH, f))
  }
}
impl std::fmt::Debug for ResultStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    Pretty::with(None, |p| p.result_store(self).render_fmt(WIDTH, f))
  }
}
impl std::fmt::Debug for MTerm {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    Pretty::with(None, |p| p.mterm(false, self).render_fmt(WIDTH, f))
  }
}
impl std::fmt::Debug for Prop {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    Pretty::with(None, |p| p.prop(true, self).render_fmt(WIDTH, f))
  }
}
impl std::fmt::Debug for Theorem {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    Pretty::with(None, |p| p.theorem(self).render_fmt(WIDTH, f))
  }
}
impl std::fmt::Debug for RewriteStep {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    Pretty::with(None, |p| {
      let doc = p
        .text(format!("{}:", self.rule))
        .append(p.line())
        .append(p.mterm(false, &self.before))
        .append(p.line())
        .append("~> ")
        .append(p.mterm(false, &self.after));
      doc.nest(2).group().render_fmt(WIDTH, f)
    })
  }
}
