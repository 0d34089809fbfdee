/*
Copyright 2026 The Bulkhead Authors.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
 */

//! Scopes and the arena that owns them.
//!
//! Elaboration threads a chain of nested scopes. Rather than linking
//! scopes with references, every scope lives in one append-only arena
//! and records its parent's index, so a free variable's `depth` is
//! resolved by walking parent indices; scopes are never popped within
//! a validation pass and a [`ScopeId`] stays valid until the arena is
//! dropped. The arena also owns the resource-identity allocator: ids
//! are minted monotonically and never reused, which is what makes
//! resource types generative.

use crate::decls::Sort;
use crate::error::ErrorKind;
use crate::itypes::{
    ComponentType, CoreFuncType, CoreModuleType, CoreValType, DefType, ExternDecl, ExternDesc,
    FuncType, ResourceId, TypeBound, ValType,
};

/// Bounds on how much context one validation pass may build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// How deeply scopes may nest.
    pub max_scope_depth: u32,
    /// How many entries one scope may hold across all its index
    /// spaces.
    pub max_scope_entries: u32,
}

impl Limits {
    /// Far deeper than any sane declaration list nests.
    pub const DEFAULT_MAX_SCOPE_DEPTH: u32 = 64;
    /// Generous; a scope entry is one declarator's worth of output.
    pub const DEFAULT_MAX_SCOPE_ENTRIES: u32 = 1 << 16;

    pub fn new(max_scope_depth: u32, max_scope_entries: u32) -> Self {
        Limits {
            max_scope_depth,
            max_scope_entries,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits::new(
            Limits::DEFAULT_MAX_SCOPE_DEPTH,
            Limits::DEFAULT_MAX_SCOPE_ENTRIES,
        )
    }
}

/// Index of a scope in its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(pub(crate) u32);

/// A universal variable: an abstract type this scope may use but not
/// inspect. `imported` distinguishes variables introduced by import
/// declarators (closed over when the component type is finished) from
/// ones released by instantiations (re-abstracted on the export side).
#[derive(Debug, Clone)]
pub struct UvarEntry<'a> {
    pub bound: TypeBound<'a>,
    pub imported: bool,
}

/// An existential variable: an abstract type this scope defines.
/// `resolved` is filled in either at introduction (a resource minted
/// at an export declarator) or by a matching step discovering the
/// witness; local resolution reads through it.
#[derive(Debug, Clone)]
pub struct EvarEntry<'a> {
    pub bound: TypeBound<'a>,
    pub resolved: Option<DefType<'a>>,
}

/// A resource allocated in this scope, with the representation the
/// canonical builtins need.
#[derive(Debug, Clone, Copy)]
pub struct ResourceInfo {
    pub id: ResourceId,
    pub rep: CoreValType,
    pub dtor: Option<u32>,
}

/// A concrete instance. Its export list shares the scope's own frame
/// (the existentials were opened when it was made). Value- and
/// instance-sorted exports are linear: aliasing one marks it consumed
/// here.
#[derive(Debug, Clone)]
pub struct InstanceEntry<'a> {
    pub exports: Vec<ExternDecl<'a>>,
    pub alive: bool,
    pub consumed: Vec<&'a str>,
}

#[derive(Debug, Clone)]
pub struct ValueEntry<'a> {
    pub ty: ValType<'a>,
    pub alive: bool,
}

/// One scope's worth of context: quantifier entries plus the index
/// spaces declarators append to.
#[derive(Debug, Clone, Default)]
pub struct Scope<'a> {
    pub(crate) parent: Option<ScopeId>,
    /// Crossing this scope with an outer alias forces concreteness.
    pub(crate) boundary: bool,
    pub(crate) depth: u32,
    pub uvars: Vec<UvarEntry<'a>>,
    pub evars: Vec<EvarEntry<'a>>,
    pub resources: Vec<ResourceInfo>,
    pub types: Vec<DefType<'a>>,
    pub funcs: Vec<FuncType<'a>>,
    pub components: Vec<ComponentType<'a>>,
    pub core_modules: Vec<CoreModuleType<'a>>,
    pub core_funcs: Vec<CoreFuncType>,
    pub instances: Vec<InstanceEntry<'a>>,
    pub values: Vec<ValueEntry<'a>>,
}

impl<'a> Scope<'a> {
    pub fn entry_count(&self) -> usize {
        self.uvars.len()
            + self.evars.len()
            + self.resources.len()
            + self.types.len()
            + self.funcs.len()
            + self.components.len()
            + self.core_modules.len()
            + self.core_funcs.len()
            + self.instances.len()
            + self.values.len()
    }
}

/// The arena. All engine operations hang off this type, each taking
/// the scope they run in by id.
#[derive(Debug, Default)]
pub struct ScopeArena<'a> {
    scopes: Vec<Scope<'a>>,
    next_resource: u32,
    pub limits: Limits,
}

impl<'a> ScopeArena<'a> {
    pub fn new(limits: Limits) -> Self {
        ScopeArena {
            scopes: Vec::new(),
            next_resource: 0,
            limits,
        }
    }

    pub fn push_scope(
        &mut self,
        parent: Option<ScopeId>,
        boundary: bool,
    ) -> Result<ScopeId, ErrorKind<'a>> {
        let depth = match parent {
            None => 0,
            Some(p) => self.at(p).depth + 1,
        };
        if depth >= self.limits.max_scope_depth {
            return Err(ErrorKind::ScopeDepthExceeded {
                limit: self.limits.max_scope_depth,
            });
        }
        let id = ScopeId(self.scopes.len() as u32);
        tracing::trace!(id = id.0, depth, boundary, "push scope");
        self.scopes.push(Scope {
            parent,
            boundary,
            depth,
            ..Scope::default()
        });
        Ok(id)
    }

    pub fn at(&self, id: ScopeId) -> &Scope<'a> {
        &self.scopes[id.0 as usize]
    }

    pub fn at_mut(&mut self, id: ScopeId) -> &mut Scope<'a> {
        &mut self.scopes[id.0 as usize]
    }

    pub fn depth_of(&self, id: ScopeId) -> u32 {
        self.at(id).depth
    }

    pub fn is_boundary(&self, id: ScopeId) -> bool {
        self.at(id).boundary
    }

    /// The scope exactly `depth` parent links up, or `None` if the
    /// chain is shorter than that.
    pub fn ancestor(&self, from: ScopeId, depth: u32) -> Option<ScopeId> {
        let mut cur = from;
        for _ in 0..depth {
            cur = self.at(cur).parent?;
        }
        Some(cur)
    }

    /// This scope and all its ancestors, innermost first.
    pub fn chain(&self, from: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        let mut cur = Some(from);
        std::iter::from_fn(move || {
            let id = cur?;
            cur = self.at(id).parent;
            Some(id)
        })
    }

    /// Mint a resource identity. Identities are unique across the
    /// whole arena, so two constructors with identical shape still
    /// make two different types.
    pub fn fresh_resource(
        &mut self,
        at: ScopeId,
        rep: CoreValType,
        dtor: Option<u32>,
    ) -> ResourceId {
        let id = ResourceId {
            id: self.next_resource,
        };
        self.next_resource += 1;
        tracing::trace!(id = id.id, scope = at.0, "fresh resource");
        self.at_mut(at).resources.push(ResourceInfo { id, rep, dtor });
        id
    }

    /// Look for a locally allocated resource anywhere on the scope
    /// chain. The canonical builtins need its representation.
    pub fn local_resource(&self, at: ScopeId, id: ResourceId) -> Option<ResourceInfo> {
        self.chain(at)
            .flat_map(|s| self.at(s).resources.iter())
            .find(|r| r.id == id)
            .copied()
    }

    pub fn room_for_entry(&self, at: ScopeId) -> Result<(), ErrorKind<'a>> {
        if self.at(at).entry_count() >= self.limits.max_scope_entries as usize {
            return Err(ErrorKind::ScopeEntriesExceeded {
                limit: self.limits.max_scope_entries,
            });
        }
        Ok(())
    }

    // Index-space lookups. Every declarator reference goes through
    // one of these; an out-of-range index is a validation error, not
    // a panic, because the input is not trusted to be prevalidated.

    pub fn func(&self, at: ScopeId, index: u32) -> Result<&FuncType<'a>, ErrorKind<'a>> {
        self.at(at).funcs.get(index as usize).ok_or(ErrorKind::UnknownIndex {
            sort: Sort::Func,
            index,
        })
    }

    pub fn def_type(&self, at: ScopeId, index: u32) -> Result<&DefType<'a>, ErrorKind<'a>> {
        self.at(at).types.get(index as usize).ok_or(ErrorKind::UnknownIndex {
            sort: Sort::Type,
            index,
        })
    }

    pub fn component(&self, at: ScopeId, index: u32) -> Result<&ComponentType<'a>, ErrorKind<'a>> {
        self.at(at)
            .components
            .get(index as usize)
            .ok_or(ErrorKind::UnknownIndex {
                sort: Sort::Component,
                index,
            })
    }

    pub fn core_module(
        &self,
        at: ScopeId,
        index: u32,
    ) -> Result<&CoreModuleType<'a>, ErrorKind<'a>> {
        self.at(at)
            .core_modules
            .get(index as usize)
            .ok_or(ErrorKind::UnknownIndex {
                sort: Sort::CoreModule,
                index,
            })
    }

    pub fn core_func(&self, at: ScopeId, index: u32) -> Result<&CoreFuncType, ErrorKind<'a>> {
        // Core funcs have no public sort; report them as funcs.
        self.at(at)
            .core_funcs
            .get(index as usize)
            .ok_or(ErrorKind::UnknownIndex {
                sort: Sort::Func,
                index,
            })
    }

    pub fn instance(&self, at: ScopeId, index: u32) -> Result<&InstanceEntry<'a>, ErrorKind<'a>> {
        self.at(at)
            .instances
            .get(index as usize)
            .ok_or(ErrorKind::UnknownIndex {
                sort: Sort::Instance,
                index,
            })
    }

    pub fn value(&self, at: ScopeId, index: u32) -> Result<&ValueEntry<'a>, ErrorKind<'a>> {
        self.at(at)
            .values
            .get(index as usize)
            .ok_or(ErrorKind::UnknownIndex {
                sort: Sort::Value,
                index,
            })
    }

    // Linearity. Values and whole instances are consumed at most
    // once; so is each value/instance export projected out of an
    // instance.

    pub fn consume_value(&mut self, at: ScopeId, index: u32) -> Result<ValType<'a>, ErrorKind<'a>> {
        let entry = self
            .at_mut(at)
            .values
            .get_mut(index as usize)
            .ok_or(ErrorKind::UnknownIndex {
                sort: Sort::Value,
                index,
            })?;
        if !entry.alive {
            return Err(ErrorKind::AlreadyConsumed {
                sort: Sort::Value,
                index,
            });
        }
        entry.alive = false;
        Ok(entry.ty.clone())
    }

    pub fn consume_instance(
        &mut self,
        at: ScopeId,
        index: u32,
    ) -> Result<Vec<ExternDecl<'a>>, ErrorKind<'a>> {
        let entry = self
            .at_mut(at)
            .instances
            .get_mut(index as usize)
            .ok_or(ErrorKind::UnknownIndex {
                sort: Sort::Instance,
                index,
            })?;
        if !entry.alive {
            return Err(ErrorKind::AlreadyConsumed {
                sort: Sort::Instance,
                index,
            });
        }
        entry.alive = false;
        Ok(entry.exports.clone())
    }

    /// Project one export out of an instance, consuming it if it is
    /// of a linear sort. The instance itself stays alive: projecting
    /// does not use up the whole bundle.
    pub fn project_export(
        &mut self,
        at: ScopeId,
        index: u32,
        name: &'a str,
    ) -> Result<ExternDesc<'a>, ErrorKind<'a>> {
        let entry = self
            .at_mut(at)
            .instances
            .get_mut(index as usize)
            .ok_or(ErrorKind::UnknownIndex {
                sort: Sort::Instance,
                index,
            })?;
        if !entry.alive {
            return Err(ErrorKind::AlreadyConsumed {
                sort: Sort::Instance,
                index,
            });
        }
        let ed = entry
            .exports
            .iter()
            .find(|ed| ed.name == name)
            .ok_or(ErrorKind::UnknownExport(name))?;
        let desc = ed.desc.clone();
        let linear = matches!(desc, ExternDesc::Value(_) | ExternDesc::Instance(_));
        if linear {
            if entry.consumed.contains(&name) {
                return Err(ErrorKind::ExportConsumed(name));
            }
            entry.consumed.push(name);
        }
        Ok(desc)
    }
}
