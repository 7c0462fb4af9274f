//! Variable identity registry.
//!
//! Every local slot, stack position and synthesized temporary maps to one
//! [`Variable`] through a deterministic id string; interning the same id
//! twice yields the same handle. Anonymous slots are interned under their
//! normalized type (sub-int primitives as int, references as
//! `java/lang/Object`) so that merged control-flow paths land on one
//! variable per position; named locals and parameters keep their exact
//! declared type.

use std::collections::HashMap;

use crate::ast::{VarId, VarOrigin, Variable};
use crate::classfile::Type;

/// Per-method variable arena. Handles are indices into `variables`.
#[derive(Debug, Default)]
pub struct VariableTable {
    variables: Vec<Variable>,
    by_id: HashMap<String, VarId>,
    next_exception: u32,
}

impl VariableTable {
    pub fn new() -> Self {
        VariableTable::default()
    }

    fn intern(
        &mut self,
        id: String,
        name: String,
        ty: Type,
        signature: Option<String>,
        origin: VarOrigin,
    ) -> VarId {
        if let Some(existing) = self.by_id.get(&id) {
            return *existing;
        }
        let handle = VarId(self.variables.len() as u32);
        self.variables.push(Variable {
            id: id.clone(),
            name,
            ty,
            signature,
            origin,
        });
        self.by_id.insert(id, handle);
        handle
    }

    /// Stack temporary at value height `height`. The variable type is the
    /// normalized form of `ty`.
    pub fn stack(&mut self, height: usize, ty: &Type) -> VarId {
        let id = format!("s_{}_{}", height, ty.normalized_tag());
        let name = id.clone();
        self.intern(id, name, ty.normalized(), None, VarOrigin::Synthetic)
    }

    /// Local slot without debug info. Normalized like stack temporaries.
    pub fn unnamed_local(&mut self, slot: u16, ty: &Type) -> VarId {
        let id = format!("l_{}_{}", slot, ty.normalized_tag());
        let name = id.clone();
        self.intern(id, name, ty.normalized(), None, VarOrigin::Synthetic)
    }

    /// Local slot covered by a LocalVariableTable entry. Keeps the exact
    /// declared type; the id tag is the full signature or descriptor so
    /// that a reused slot with a different declared type is a different
    /// variable.
    pub fn named_local(
        &mut self,
        slot: u16,
        name: &str,
        ty: Type,
        descriptor: &str,
        signature: Option<String>,
        origin: VarOrigin,
    ) -> VarId {
        let tag = signature.as_deref().unwrap_or(descriptor);
        let id = format!("{}_{}_{}", name, slot, tag);
        self.intern(id, name.to_string(), ty, signature, origin)
    }

    /// Parameter (or receiver) slot without debug info. The id carries the
    /// normalized tag, the variable keeps the exact declared type: the
    /// binding is written once at entry and never merged, and entry
    /// adaptation needs the declared booleanness.
    pub fn parameter(&mut self, slot: u16, ty: Type, origin: VarOrigin) -> VarId {
        let id = format!("p_{}_{}", slot, ty.normalized_tag());
        let name = id.clone();
        self.intern(id, name, ty, None, origin)
    }

    /// Fresh caught-exception temporary.
    pub fn exception(&mut self, ty: Type) -> VarId {
        let id = format!("e_{}", self.next_exception);
        self.next_exception += 1;
        let name = id.clone();
        self.intern(id, name, ty, None, VarOrigin::Synthetic)
    }

    /// Swap temporary for `ty`. One per normalized tag and method.
    pub fn swap_tmp(&mut self, ty: &Type) -> VarId {
        let id = format!("swap_tmp_{}", ty.normalized_tag());
        let name = id.clone();
        self.intern(id, name, ty.normalized(), None, VarOrigin::Synthetic)
    }

    pub fn var(&self, id: VarId) -> &Variable {
        &self.variables[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Handles of every interned variable, in interning order.
    pub fn ids(&self) -> impl Iterator<Item = VarId> + '_ {
        (0..self.variables.len()).map(|i| VarId(i as u32))
    }

    /// Consume the table into the backing store for a finished method.
    pub fn into_variables(self) -> Vec<Variable> {
        self.variables
    }
}
