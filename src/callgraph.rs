//! Call-graph analysis: which functions call which, and the partition into
//! clusters of mutually recursive functions, in dependency order.

use crate::ast::Env;
use crate::orchestrate::FunctionInfo;
use crate::reader::FunctionDecl;
use crate::types::*;
use petgraph::algo::{condensation, toposort};
use petgraph::graph::DiGraph;
use std::collections::{BTreeSet, HashMap};

#[derive(Clone, Debug, Default)]
pub struct CallGraph {
  /// Clusters in dependency order: every callee outside a cluster lives in an
  /// earlier cluster (or was translated before)
  pub clusters: IdxVec<ClusterId, Vec<Name>>,
  /// The earlier clusters each cluster calls into
  pub deps: IdxVec<ClusterId, Vec<ClusterId>>,
}

pub struct Analysis {
  /// procedure constant to function name, for new and prior functions
  pub proc_names: HashMap<Name, Name>,
  pub graph: CallGraph,
  /// The new functions, with translation fields empty
  pub functions: im::OrdMap<Name, FunctionInfo>,
}

pub fn analyze(
  env: &Env, decls: &[FunctionDecl], prior: &im::OrdMap<Name, FunctionInfo>,
) -> Analysis {
  let mut proc_names: HashMap<Name, Name> =
    prior.values().map(|f| (f.proc.clone(), f.name.clone())).collect();
  proc_names.extend(decls.iter().map(|d| (d.proc.clone(), d.name.clone())));

  let mut decls = decls.iter().collect::<Vec<_>>();
  decls.sort_by(|a, b| a.name.cmp(&b.name));
  let index: HashMap<&Name, usize> = decls.iter().enumerate().map(|(i, d)| (&d.name, i)).collect();
  let callees = (decls.iter())
    .map(|d| {
      let calls = env.body(&d.proc).map(|b| b.calls()).unwrap_or_default();
      (calls.iter())
        .filter_map(|proc| proc_names.get(proc))
        .filter(|f| index.contains_key(f) || prior.contains_key(*f))
        .cloned()
        .collect::<BTreeSet<Name>>()
    })
    .collect::<Vec<_>>();

  let mut g = DiGraph::<usize, ()>::new();
  let nodes = (0..decls.len()).map(|i| g.add_node(i)).collect::<Vec<_>>();
  for (i, cs) in callees.iter().enumerate() {
    for c in cs {
      if let Some(&j) = index.get(c) {
        // callee before caller
        g.add_edge(nodes[j], nodes[i], ());
      }
    }
  }
  let condensed = condensation(g, true);
  let order = toposort(&condensed, None).unwrap_or_else(|_| unreachable!("condensation is acyclic"));
  let mut cluster_of = vec![ClusterId::default(); decls.len()];
  let mut node_cluster = HashMap::new();
  let mut graph = CallGraph::default();
  for n in order {
    let mut members = condensed[n].clone();
    members.sort_unstable();
    let id = graph.clusters.push(members.iter().map(|&i| decls[i].name.clone()).collect());
    graph.deps.push(vec![]);
    members.iter().for_each(|&i| cluster_of[i] = id);
    node_cluster.insert(n, id);
  }
  for e in condensed.raw_edges() {
    graph.deps[node_cluster[&e.target()]].push(node_cluster[&e.source()])
  }
  for deps in &mut graph.deps.0 {
    deps.sort_unstable();
    deps.dedup()
  }

  let functions = (decls.iter().zip(callees))
    .enumerate()
    .map(|(i, (d, callees))| {
      let rec_callees = (callees.iter())
        .filter(|c| index.get(c).map_or(false, |&j| cluster_of[j] == cluster_of[i]))
        .cloned()
        .collect::<BTreeSet<_>>();
      let info = FunctionInfo {
        name: d.name.clone(),
        proc: d.proc.clone(),
        measured: !rec_callees.is_empty(),
        callees,
        rec_callees,
        wrapper: d.wrapper,
        return_slot: d.return_slot.clone(),
        translation: None,
      };
      (d.name.clone(), info)
    })
    .collect();
  Analysis { proc_names, graph, functions }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::Stmt;
  use crate::test_support::*;

  fn decl(f: &str) -> FunctionDecl {
    FunctionDecl { name: name(f), proc: name(&format!("{f}_'proc")), return_slot: None, wrapper: false }
  }

  #[test]
  fn clusters_come_in_dependency_order() {
    // main -> f <-> g -> leaf, plus a self-recursive r and a call to an unknown procedure
    let env = env_with(&[
      ("main_'proc", Stmt::seq(call_stmt("f_'proc"), call_stmt("r_'proc"))),
      ("f_'proc", call_stmt("g_'proc")),
      ("g_'proc", Stmt::seq(call_stmt("f_'proc"), call_stmt("leaf_'proc"))),
      ("leaf_'proc", call_stmt("unknown_'proc")),
      ("r_'proc", call_stmt("r_'proc")),
    ]);
    let decls = ["main", "f", "g", "leaf", "r"].map(decl);
    let a = analyze(&env, &decls, &im::OrdMap::new());
    let pos = |f: &str| a.graph.clusters.enum_iter().find(|(_, c)| c.iter().any(|n| &**n == f)).unwrap().0;
    assert_eq!(pos("f"), pos("g"));
    assert!(pos("leaf") < pos("f"));
    assert!(pos("f") < pos("main") && pos("r") < pos("main"));
    assert_eq!(a.graph.clusters[pos("f")], [name("f"), name("g")]);
    assert_eq!(a.graph.deps[pos("main")], {
      let mut v = vec![pos("f"), pos("r")];
      v.sort();
      v
    });

    let f = &a.functions["f"];
    assert!(f.measured && f.rec_callees.contains("g"));
    let g = &a.functions["g"];
    assert!(g.callees.contains("leaf") && !g.rec_callees.contains("leaf"));
    assert!(a.functions["r"].measured);
    assert!(!a.functions["main"].measured && !a.functions["leaf"].measured);
    assert!(a.functions["leaf"].callees.is_empty());
  }
}
