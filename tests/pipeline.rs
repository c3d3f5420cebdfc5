use corres_lift::error::Warning;
use corres_lift::format::render_term;
use corres_lift::monad::{CalleeRef, MTerm, MeasureArg};
use corres_lift::orchestrate::{translate_all, FunctionInfo, Options, ProgramInfo, Translation};
use corres_lift::reader::Program;
use corres_lift::theory::{DefinitionStore, Theory};

const PROGRAM: &str = r#"{
  "file": "pipeline.c",
  "world": "globals myvars",
  "functions": [
    {
      "name": "straight",
      "proc": "straight_'proc",
      "body": { "Seq": [
        { "Assign": { "Lam": { "var": "s", "body":
          { "Update": { "state": { "Var": "s" }, "field": "x", "value": { "Num": 1 } } } } } },
        { "Cond": { "guard": "Univ", "left": "Throw", "right": "Skip" } }
      ] }
    },
    {
      "name": "fact",
      "proc": "fact_'proc",
      "return_slot": "ret'",
      "body": { "Cond": {
        "guard": { "Var": "positive" },
        "left": { "Call": {
          "setup": { "Var": "setup" },
          "proc": "fact_'proc",
          "cleanup": { "Var": "cleanup" },
          "result": { "binders": ["t", "s"], "body": { "Assign": { "Lam": { "var": "s", "body":
            { "Update": { "state": { "Var": "s" }, "field": "r",
              "value": { "Field": { "state": { "Var": "t" }, "field": "ret'" } } } } } } } }
        } },
        "right": "Skip"
      } }
    },
    {
      "name": "main",
      "proc": "main_'proc",
      "body": { "Seq": [
        { "Call": {
          "setup": { "Var": "setup" },
          "proc": "fact_'proc",
          "cleanup": { "Var": "cleanup" },
          "result": { "binders": ["t", "s"], "body": { "Assign": { "Var": "upd" } } }
        } },
        { "Call": {
          "setup": { "Var": "setup" },
          "proc": "ext_'proc",
          "cleanup": { "Var": "cleanup" },
          "result": { "binders": ["t", "s"], "body": { "Assign": { "Var": "upd" } } }
        } }
      ] }
    }
  ]
}"#;

fn run(optimize: bool) -> (Theory, im::OrdMap<corres_lift::types::Name, FunctionInfo>) {
  let program = Program::parse(PROGRAM).unwrap();
  let (info, current) = ProgramInfo::new(program, &im::OrdMap::new());
  let opts = Options { check_termination: true, optimize, ..Options::default() };
  let mut it = translate_all(&info, current, &im::OrdMap::new(), opts, Theory::new());
  for r in &mut it {
    assert!(r.is_ok(), "{:?}", r.err());
  }
  it.into_state()
}

fn translation<'a>(fs: &'a im::OrdMap<corres_lift::types::Name, FunctionInfo>, f: &str) -> &'a Translation {
  fs[f].translation.as_deref().unwrap()
}

#[test]
fn straight_line_code_keeps_its_shape_without_optimization() {
  let (_, fs) = run(false);
  let t = &translation(&fs, "straight").term;
  let MTerm::Seq(modify, cond) = t else { panic!("{t:?}") };
  assert!(matches!(**modify, MTerm::Modify(_)));
  let MTerm::Condition { pred, left, right } = &**cond else { panic!("{t:?}") };
  assert!(pred.is_const_pred(true));
  assert!(**left == MTerm::Throw && **right == MTerm::Skip);

  // the peephole pass drops the trivial condition
  let (_, fs) = run(true);
  let t = &translation(&fs, "straight").term;
  assert!(matches!(t, MTerm::Seq(m, th) if matches!(**m, MTerm::Modify(_)) && **th == MTerm::Throw));
}

#[test]
fn recursive_function_is_guarded_and_monotone() {
  let (thy, fs) = run(true);
  let fact = translation(&fs, "fact");
  let MTerm::RecGuard { body, .. } = &fact.term else { panic!("{:?}", fact.term) };
  assert!(matches!(&**body, MTerm::Seq(init, _) if matches!(**init, MTerm::Init(_))));
  assert!(fact.mono.is_some());
  assert!(fs["fact"].rec_callees.contains("fact"));
  assert_eq!(thy.lookup("l1_fact'"), Some(fact.konst));

  let names = |k| thy.name(k);
  let rendered = render_term(&fact.term, &names);
  assert!(rendered.contains("l1_fact'"), "{rendered}");
}

#[test]
fn callers_see_registered_constants_and_missing_callees_fail() {
  let (_, fs) = run(true);
  let main = translation(&fs, "main");
  let mut calls = vec![];
  main.term.callees(&mut |c| calls.push(*c));
  assert_eq!(calls.len(), 1, "{:?}", main.term);
  assert_eq!(calls[0].target, CalleeRef::Const(translation(&fs, "fact").konst));
  assert_eq!(calls[0].measure, MeasureArg::Managed);
  assert_eq!(main.warnings.len(), 1);
  assert!(matches!(&main.warnings[0], Warning::MissingCalleeBody { callee, .. } if &**callee == "ext"));
}
