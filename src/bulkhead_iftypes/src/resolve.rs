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

//! Type variable resolution.

use crate::error::ErrorKind;
use crate::itypes::{DefType, FreeVar, ResourceRef, TypeBound, Tyvar};
use crate::scope::{EvarEntry, ScopeArena, ScopeId, UvarEntry};
use crate::subst::Subst;

/// Everything the scope chain can say about one type variable.
pub enum Resolution<'a> {
    /// Invariant: the head of this [`DefType`] is not [`DefType::Var`].
    Definite(DefType<'a>),
    /// A variable still under its binder has no scope entry to read.
    #[allow(unused)]
    Bound(u32),
    /// Invariant: the `TypeBound` is not `TypeBound::Eq`.
    Evar(u32, u32, TypeBound<'a>),
    /// Invariant: the `TypeBound` is not `TypeBound::Eq`.
    Uvar(u32, u32, TypeBound<'a>),
}

impl<'a> ScopeArena<'a> {
    /// Look up a universal variable, panicking if it doesn't exist.
    fn lookup_uvar(&self, at: ScopeId, o: u32, i: u32) -> &UvarEntry<'a> {
        // A depth that overruns the chain is a phrasing bug, not user
        // input.
        let scope = self.ancestor(at, o).unwrap();
        &self.at(scope).uvars[i as usize]
    }

    /// Look up an existential variable, panicking if it doesn't exist.
    fn lookup_evar(&self, at: ScopeId, o: u32, i: u32) -> &EvarEntry<'a> {
        // A depth that overruns the chain is a phrasing bug, not user
        // input.
        let scope = self.ancestor(at, o).unwrap();
        &self.at(scope).evars[i as usize]
    }

    /// Find the declared bound for a free tyvar. Panics on a bound
    /// var; those never name a scope entry.
    pub fn var_bound(&self, at: ScopeId, tv: Tyvar) -> &TypeBound<'a> {
        match tv {
            Tyvar::Bound(_) => panic!("requested bound for a bound tyvar"),
            Tyvar::Free(FreeVar::Uvar(o, i)) => &self.lookup_uvar(at, o, i).bound,
            Tyvar::Free(FreeVar::Evar(o, i)) => &self.lookup_evar(at, o, i).bound,
        }
    }

    /// Resolve a tyvar as far as the scope chain allows: to a
    /// definite type if equality bounds and filled-in existential
    /// definitions lead to one, otherwise to the abstract variable at
    /// the end of the chain with its bound. The result is phrased for
    /// `at` even when the chain passes through outer frames. Chains
    /// are finite because an entry's content can only mention entries
    /// made before it.
    pub fn resolve_tyvar(&self, at: ScopeId, tv: Tyvar) -> Resolution<'a> {
        match tv {
            Tyvar::Bound(i) => Resolution::Bound(i),
            Tyvar::Free(FreeVar::Evar(o, i)) => {
                let entry = self.lookup_evar(at, o, i);
                match (&entry.bound, &entry.resolved) {
                    (TypeBound::Eq(dt), _) => self.chase(at, o, dt),
                    (_, Some(dt)) => self.chase(at, o, dt),
                    (tb, _) => Resolution::Evar(o, i, tb.clone()),
                }
            }
            Tyvar::Free(FreeVar::Uvar(o, i)) => {
                let entry = self.lookup_uvar(at, o, i);
                match &entry.bound {
                    TypeBound::Eq(dt) => self.chase(at, o, dt),
                    tb => Resolution::Uvar(o, i, tb.clone()),
                }
            }
        }
    }

    /// One chase step. Entry content lives `o` links above `at` and
    /// is phrased for the scope that owns it, so its free depths are
    /// hoisted by `o` before the next lookup or the final answer.
    fn chase(&self, at: ScopeId, o: u32, dt: &DefType<'a>) -> Resolution<'a> {
        match hoist(dt, o) {
            DefType::Var(tv) => self.resolve_tyvar(at, tv),
            dt => Resolution::Definite(dt),
        }
    }

    /// Check that a defined type denotes a resource and say which
    /// one: either a concrete id or the canonical abstract variable
    /// its chain of equalities ends at.
    pub fn resource_ref(&self, at: ScopeId, dt: &DefType<'a>) -> Result<ResourceRef, ErrorKind<'a>> {
        let err = || ErrorKind::NotResource(dt.clone());
        match dt {
            DefType::Resource(id) => Ok(ResourceRef::Id(*id)),
            DefType::Var(tv) => match self.resolve_tyvar(at, *tv) {
                Resolution::Definite(DefType::Resource(id)) => Ok(ResourceRef::Id(id)),
                Resolution::Evar(o, i, TypeBound::SubResource) => {
                    Ok(ResourceRef::Var(Tyvar::Free(FreeVar::Evar(o, i))))
                }
                Resolution::Uvar(o, i, TypeBound::SubResource) => {
                    Ok(ResourceRef::Var(Tyvar::Free(FreeVar::Uvar(o, i))))
                }
                _ => Err(err()),
            },
            _ => Err(err()),
        }
    }

    /// Like [`ScopeArena::resource_ref`], but without looking through
    /// a variable's filled-in definition. Handle types built by
    /// declarators keep this face: a scope that minted a resource
    /// behind an existential knows its identity, but the types it
    /// publishes must still name the variable, or closing cannot
    /// re-bind them and two instantiations of the component would
    /// share one resource identity. Equality bounds stay transparent.
    pub fn handle_ref(&self, at: ScopeId, dt: &DefType<'a>) -> Result<ResourceRef, ErrorKind<'a>> {
        let err = || ErrorKind::NotResource(dt.clone());
        match dt {
            DefType::Resource(id) => Ok(ResourceRef::Id(*id)),
            DefType::Var(Tyvar::Free(fv)) => {
                let tv = Tyvar::Free(*fv);
                let (FreeVar::Uvar(o, _) | FreeVar::Evar(o, _)) = *fv;
                match self.var_bound(at, tv) {
                    TypeBound::Eq(dt2) => {
                        let dt2 = hoist(dt2, o);
                        self.handle_ref(at, &dt2)
                    }
                    TypeBound::SubResource => Ok(ResourceRef::Var(tv)),
                }
            }
            _ => Err(err()),
        }
    }

    /// Append a binder frame's variables to a scope's existential
    /// list and compute the substitution that replaces bound
    /// references to them with free ones. Bounds telescope, so each
    /// is opened under the variables already appended.
    pub fn open_evars<'c>(
        &mut self,
        at: ScopeId,
        bounds: &[TypeBound<'a>],
    ) -> Result<Subst<'c, 'a>, ErrorKind<'a>> {
        let base = self.at(at).evars.len() as u32;
        for (j, tb) in bounds.iter().enumerate() {
            self.room_for_entry(at)?;
            let sub = Subst::opening(false, base, j as u32);
            let bound = sub.type_bound(tb)?;
            self.at_mut(at).evars.push(EvarEntry {
                bound,
                resolved: None,
            });
        }
        Ok(Subst::opening(false, base, bounds.len() as u32))
    }

    /// Like [`ScopeArena::open_evars`] for the universal list.
    /// `imported` marks variables a component instantiation must
    /// supply, as opposed to ones invented for its fresh exports.
    pub fn open_uvars<'c>(
        &mut self,
        at: ScopeId,
        bounds: &[TypeBound<'a>],
        imported: bool,
    ) -> Result<Subst<'c, 'a>, ErrorKind<'a>> {
        let base = self.at(at).uvars.len() as u32;
        for (j, tb) in bounds.iter().enumerate() {
            self.room_for_entry(at)?;
            let sub = Subst::opening(true, base, j as u32);
            let bound = sub.type_bound(tb)?;
            self.at_mut(at).uvars.push(UvarEntry { bound, imported });
        }
        Ok(Subst::opening(true, base, bounds.len() as u32))
    }
}

/// Re-phrase entry content for a scope `o` links below the one that
/// owns the entry.
fn hoist<'a>(dt: &DefType<'a>, o: u32) -> DefType<'a> {
    if o == 0 {
        return dt.clone();
    }
    // A bare depth shift maps variables to variables and has nothing
    // to reject.
    Subst::shift(o).def_type(dt).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::itypes::ValType;

    fn evar_ref(o: u32, i: u32) -> DefType<'static> {
        DefType::Var(Tyvar::Free(FreeVar::Evar(o, i)))
    }

    #[test]
    fn opening_telescopes_bounds() {
        let mut arena = ScopeArena::default();
        let root = arena.push_scope(None, true).unwrap();
        // Second bound refers to the first variable of the frame.
        let bounds = [
            TypeBound::SubResource,
            TypeBound::Eq(DefType::Var(Tyvar::Bound(0))),
        ];
        arena.open_evars(root, &bounds).unwrap();
        match &arena.at(root).evars[1].bound {
            TypeBound::Eq(DefType::Var(Tyvar::Free(FreeVar::Evar(0, 0)))) => {}
            other => panic!("expected opened reference to slot 0, got {other:?}"),
        }
    }

    #[test]
    fn resolution_chases_equality_chains() {
        let mut arena = ScopeArena::default();
        let root = arena.push_scope(None, true).unwrap();
        arena
            .open_evars(
                root,
                &[
                    TypeBound::Eq(DefType::Val(ValType::Char)),
                    TypeBound::Eq(DefType::Var(Tyvar::Bound(0))),
                ],
            )
            .unwrap();
        // Slot 1 is equal to slot 0, which is equal to char.
        match arena.resolve_tyvar(root, Tyvar::Free(FreeVar::Evar(0, 1))) {
            Resolution::Definite(DefType::Val(ValType::Char)) => {}
            _ => panic!("expected definite char"),
        }
    }

    #[test]
    fn resolution_uses_filled_definitions() {
        let mut arena = ScopeArena::default();
        let root = arena.push_scope(None, true).unwrap();
        arena.open_evars(root, &[TypeBound::SubResource]).unwrap();
        match arena.resolve_tyvar(root, Tyvar::Free(FreeVar::Evar(0, 0))) {
            Resolution::Evar(0, 0, TypeBound::SubResource) => {}
            _ => panic!("expected abstract evar"),
        }
        let id = arena.fresh_resource(root, crate::itypes::CoreValType::I32, None);
        arena.at_mut(root).evars[0].resolved = Some(DefType::Resource(id));
        match arena.resolve_tyvar(root, Tyvar::Free(FreeVar::Evar(0, 0))) {
            Resolution::Definite(DefType::Resource(got)) => assert_eq!(got, id),
            _ => panic!("expected definite resource"),
        }
    }

    #[test]
    fn resolution_walks_parent_links() {
        let mut arena = ScopeArena::default();
        let root = arena.push_scope(None, true).unwrap();
        arena
            .open_evars(root, &[TypeBound::Eq(DefType::Val(ValType::Bool))])
            .unwrap();
        let child = arena.push_scope(Some(root), false).unwrap();
        // Depth one from the child is the root's frame.
        match arena.resolve_tyvar(child, Tyvar::Free(FreeVar::Evar(1, 0))) {
            Resolution::Definite(DefType::Val(ValType::Bool)) => {}
            _ => panic!("expected definite bool through parent link"),
        }
    }

    #[test]
    fn resolution_rephrases_outer_chains() {
        let mut arena = ScopeArena::default();
        let root = arena.push_scope(None, true).unwrap();
        arena
            .open_evars(
                root,
                &[
                    TypeBound::SubResource,
                    TypeBound::Eq(DefType::Var(Tyvar::Bound(0))),
                ],
            )
            .unwrap();
        let child = arena.push_scope(Some(root), false).unwrap();
        // Slot 1's equality is written in the root's phrasing; read
        // from the child, the chain's end comes back one link deeper.
        match arena.resolve_tyvar(child, Tyvar::Free(FreeVar::Evar(1, 1))) {
            Resolution::Evar(1, 0, TypeBound::SubResource) => {}
            _ => panic!("expected the canonical slot rephrased to depth one"),
        }
    }

    #[test]
    fn resolution_rephrases_definite_content() {
        let mut arena = ScopeArena::default();
        let root = arena.push_scope(None, true).unwrap();
        arena
            .open_evars(
                root,
                &[
                    TypeBound::SubResource,
                    TypeBound::Eq(DefType::Val(ValType::Own(ResourceRef::Var(
                        Tyvar::Bound(0),
                    )))),
                ],
            )
            .unwrap();
        let child = arena.push_scope(Some(root), false).unwrap();
        match arena.resolve_tyvar(child, Tyvar::Free(FreeVar::Evar(1, 1))) {
            Resolution::Definite(DefType::Val(ValType::Own(ResourceRef::Var(
                Tyvar::Free(FreeVar::Evar(1, 0)),
            )))) => {}
            _ => panic!("expected the handle target rephrased to depth one"),
        }
    }

    #[test]
    fn handle_ref_rephrases_outer_equalities() {
        let mut arena = ScopeArena::default();
        let root = arena.push_scope(None, true).unwrap();
        arena
            .open_evars(
                root,
                &[
                    TypeBound::SubResource,
                    TypeBound::Eq(DefType::Var(Tyvar::Bound(0))),
                ],
            )
            .unwrap();
        let child = arena.push_scope(Some(root), false).unwrap();
        let got = arena.handle_ref(child, &evar_ref(1, 1)).unwrap();
        assert_eq!(got, ResourceRef::Var(Tyvar::Free(FreeVar::Evar(1, 0))));
    }

    #[test]
    fn handle_ref_keeps_the_abstract_face() {
        let mut arena = ScopeArena::default();
        let root = arena.push_scope(None, true).unwrap();
        arena.open_evars(root, &[TypeBound::SubResource]).unwrap();
        let id = arena.fresh_resource(root, crate::itypes::CoreValType::I32, None);
        arena.at_mut(root).evars[0].resolved = Some(DefType::Resource(id));
        // The chasing lookup sees the identity, the handle face does
        // not.
        let chased = arena.resource_ref(root, &evar_ref(0, 0)).unwrap();
        assert_eq!(chased, ResourceRef::Id(id));
        let face = arena.handle_ref(root, &evar_ref(0, 0)).unwrap();
        assert_eq!(face, ResourceRef::Var(Tyvar::Free(FreeVar::Evar(0, 0))));
    }

    #[test]
    fn resource_ref_normalizes_to_canonical_var() {
        let mut arena = ScopeArena::default();
        let root = arena.push_scope(None, true).unwrap();
        arena
            .open_evars(
                root,
                &[TypeBound::SubResource, TypeBound::Eq(DefType::Var(Tyvar::Bound(0)))],
            )
            .unwrap();
        // A handle to slot 1 normalizes to slot 0, the chain's end.
        let got = arena.resource_ref(root, &evar_ref(0, 1)).unwrap();
        assert_eq!(got, ResourceRef::Var(Tyvar::Free(FreeVar::Evar(0, 0))));
        let not = arena.resource_ref(root, &DefType::Val(ValType::String));
        assert!(matches!(not, Err(ErrorKind::NotResource(_))));
    }
}
