//! The definition store: the growing table of registered term constants,
//! their definitions and the theorems proved about them.

use crate::monad::MTerm;
use crate::proof::{Prop, Theorem};
use crate::types::*;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
  /// A constant of this name is already registered
  Duplicate(Name),
  NotReserved(ConstId),
  AlreadyDefined(ConstId),
  /// A theorem that is not about one of the constants being defined
  StrayTheorem(ConstId),
  NotAboutAConstant,
}

impl std::fmt::Display for StoreError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      StoreError::Duplicate(name) => write!(f, "constant {name} is already registered"),
      StoreError::NotReserved(k) => write!(f, "constant {k:?} was never reserved"),
      StoreError::AlreadyDefined(k) => write!(f, "constant {k:?} is already defined"),
      StoreError::StrayTheorem(k) => write!(f, "theorem does not belong to a definition of {k:?}"),
      StoreError::NotAboutAConstant => write!(f, "only theorems about constants can be registered"),
    }
  }
}

#[derive(Clone)]
pub struct Definition {
  pub name: Name,
  /// `None` while reserved
  pub body: Option<MTerm>,
  pub thm: Option<Theorem>,
}

/// The registration service. Constants are reserved first, so that mutually
/// recursive definitions can refer to each other, and then committed in one
/// step per cluster.
pub trait DefinitionStore {
  fn reserve(&mut self, name: Name) -> Result<ConstId, StoreError>;

  /// Define every constant in `defs` at once, recording `thms` about them.
  fn commit(&mut self, defs: Vec<(ConstId, MTerm)>, thms: Vec<Theorem>) -> Result<(), StoreError>;

  fn lookup(&self, name: &str) -> Option<ConstId>;

  fn get(&self, k: ConstId) -> Option<&Definition>;

  fn name(&self, k: ConstId) -> Option<Name> { self.get(k).map(|d| d.name.clone()) }
}

/// A persistent [`DefinitionStore`]. Cloning is cheap, so every cluster can
/// be registered into a copy and the copy kept only if registration succeeds.
#[derive(Clone, Default)]
pub struct Theory {
  consts: im::Vector<Arc<Definition>>,
  by_name: im::HashMap<Name, ConstId>,
}

impl Theory {
  pub fn new() -> Self { Self::default() }

  pub fn len(&self) -> usize { self.consts.len() }

  pub fn is_empty(&self) -> bool { self.consts.is_empty() }

  /// The defined constants, in registration order.
  pub fn defined(&self) -> impl Iterator<Item = (ConstId, &Definition)> {
    (self.consts.iter().enumerate())
      .filter(|(_, d)| d.body.is_some())
      .map(|(i, d)| (ConstId::from_usize(i), &**d))
  }
}

impl DefinitionStore for Theory {
  fn reserve(&mut self, name: Name) -> Result<ConstId, StoreError> {
    if self.by_name.contains_key(&name) {
      return Err(StoreError::Duplicate(name))
    }
    let k = ConstId::from_usize(self.consts.len());
    self.by_name.insert(name.clone(), k);
    self.consts.push_back(Arc::new(Definition { name, body: None, thm: None }));
    Ok(k)
  }

  fn commit(&mut self, defs: Vec<(ConstId, MTerm)>, thms: Vec<Theorem>) -> Result<(), StoreError> {
    let mut next = self.clone();
    for (k, body) in defs {
      let def = next.consts.get_mut(k.into_usize()).ok_or(StoreError::NotReserved(k))?;
      let def = Arc::make_mut(def);
      if def.body.is_some() {
        return Err(StoreError::AlreadyDefined(k))
      }
      def.body = Some(body)
    }
    for thm in thms {
      let konst = match thm.prop() {
        Prop::FnCorres { konst, .. } => *konst,
        _ => return Err(StoreError::NotAboutAConstant),
      };
      let def = next.consts.get_mut(konst.into_usize()).ok_or(StoreError::NotReserved(konst))?;
      let def = Arc::make_mut(def);
      if def.body.is_none() || def.thm.is_some() {
        return Err(StoreError::StrayTheorem(konst))
      }
      def.thm = Some(thm)
    }
    *self = next;
    Ok(())
  }

  fn lookup(&self, name: &str) -> Option<ConstId> { self.by_name.get(name).copied() }

  fn get(&self, k: ConstId) -> Option<&Definition> {
    self.consts.get(k.into_usize()).map(|d| &**d)
  }
}
