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

//! # Signature matching
//!
//! Existential elimination: checking a concrete export list against a
//! quantified `∃ ᾱ. {exports}` means discovering what each `α` must
//! be. An `Eq`-bounded quantifier carries its own answer; an abstract
//! (resource-bounded) one can only be discovered through a leaf type
//! export that declares literally `α`, because nothing else in the
//! body pins the variable down. The search walks the quantified side's
//! exports depth-first in declaration order, into nested instance
//! descs, and the first such leaf whose name the concrete side also
//! exports wins; later candidates are not consulted, and any
//! disagreement they cause surfaces as an ordinary subtype failure
//! afterwards.
//!
//! Discovered witnesses are not substituted through the body
//! eagerly. They are written into the opened variables' `resolved`
//! slots, and resolution (which every variable comparison goes
//! through) reads them back, which is equivalent and keeps the body
//! shared.
//!
//! Instance and component subtyping reduce to matching by opening one
//! side's quantifier as fresh rigid variables in a throwaway child
//! scope.

use tracing::instrument;

use crate::error::ErrorKind;
use crate::itypes::{
    ComponentType, DefType, ExternDecl, ExternDesc, FreeVar, InstanceType, TypeBound, Tyvar,
};
use crate::scope::{ScopeArena, ScopeId};
use crate::subst::{FreeAction, Subst};

/// Find the concrete type standing where the quantified side declares
/// `target` as a leaf type export. Both lists must be phrased in the
/// same scope.
fn find_witness<'a>(
    expected: &[ExternDecl<'a>],
    actual: &[ExternDecl<'a>],
    target: Tyvar,
) -> Option<DefType<'a>> {
    for ed in expected {
        match &ed.desc {
            ExternDesc::Type(DefType::Var(tv)) if *tv == target => {
                if let Some(a) = actual.iter().find(|a| a.name == ed.name) {
                    if let ExternDesc::Type(dt) = &a.desc {
                        return Some(dt.clone());
                    }
                }
            }
            ExternDesc::Instance(inner) => {
                if let Some(a) = actual.iter().find(|a| a.name == ed.name) {
                    if let ExternDesc::Instance(inner_actual) = &a.desc {
                        if let Some(dt) = find_witness(inner, inner_actual, target) {
                            return Some(dt);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    None
}

impl<'a> ScopeArena<'a> {
    /// Check `actual <: ∃ ᾱ. {exports}` and return what each `α` was
    /// discovered to be, phrased in `at`. Both arguments must be
    /// phrased in `at` as well.
    #[instrument(skip_all, fields(exports = actual.len(), evars = expected.evars.len()))]
    pub fn match_exports(
        &mut self,
        at: ScopeId,
        actual: &[ExternDecl<'a>],
        expected: &InstanceType<'a>,
    ) -> Result<Vec<DefType<'a>>, ErrorKind<'a>> {
        // Everything moves into a fresh child scope, where the
        // quantifier is opened as that scope's own existentials.
        let expected = Subst::deepen().instance_type(expected)?;
        let actual = Subst::deepen().extern_decls(actual)?;
        let child = self.push_scope(Some(at), false)?;
        let sub = self.open_evars(child, &expected.evars)?;
        let opened = sub.extern_decls(&expected.exports)?;

        let n = expected.evars.len() as u32;
        for i in 0..n {
            if !matches!(
                self.at(child).evars[i as usize].bound,
                TypeBound::SubResource
            ) {
                continue;
            }
            let target = Tyvar::Free(FreeVar::Evar(0, i));
            let witness = find_witness(&opened, &actual, target)
                .ok_or(ErrorKind::UnmatchedExistential { index: i })?;
            // The quantifier promised a resource; the witness has to
            // keep that promise before it lands in the slot.
            self.resource_ref(child, &witness)?;
            tracing::debug!(index = i, ?witness, "existential witnessed");
            self.at_mut(child).evars[i as usize].resolved = Some(witness);
        }

        // With every variable accounted for, the rest is structural.
        self.match_extern_decls(child, &actual, &opened)?;

        // Phrase the bindings back for the caller. Telescoping means
        // a binding may mention earlier slots, so those are rewritten
        // through the answers already collected.
        let mut done: Vec<DefType<'a>> = Vec::with_capacity(n as usize);
        for i in 0..n {
            let entry = &self.at(child).evars[i as usize];
            let raw = match (&entry.bound, &entry.resolved) {
                (TypeBound::Eq(dt), _) => dt.clone(),
                (_, Some(dt)) => dt.clone(),
                _ => unreachable!("unwitnessed quantifier survived matching"),
            };
            let sub = Subst {
                evars: vec![done.iter().cloned().map(Some).collect()],
                on_evar: FreeAction::Promote,
                on_uvar: FreeAction::Promote,
                ..Subst::identity()
            };
            done.push(sub.def_type(&raw)?);
        }
        Ok(done)
    }

    /// Width-permissive, order-insensitive export matching: every
    /// declaration the expected side names must be present with a
    /// subtype desc; extras on the actual side are fine.
    pub fn match_extern_decls(
        &mut self,
        at: ScopeId,
        actual: &[ExternDecl<'a>],
        expected: &[ExternDecl<'a>],
    ) -> Result<(), ErrorKind<'a>> {
        for e in expected {
            let a = actual
                .iter()
                .find(|a| a.name == e.name)
                .ok_or(ErrorKind::MissingExport(e.name))?;
            self.subtype_extern_desc(at, &a.desc, &e.desc)?;
        }
        Ok(())
    }

    pub fn subtype_extern_desc(
        &mut self,
        at: ScopeId,
        d1: &ExternDesc<'a>,
        d2: &ExternDesc<'a>,
    ) -> Result<(), ErrorKind<'a>> {
        match (d1, d2) {
            (ExternDesc::CoreModule(m1), ExternDesc::CoreModule(m2)) => {
                self.subtype_core_module(m1, m2)
            }
            (ExternDesc::Func(f1), ExternDesc::Func(f2)) => self.subtype_func(at, f1, f2),
            (ExternDesc::Value(v1), ExternDesc::Value(v2)) => self.subtype_value(at, v1, v2),
            // Type exports are aliases, and aliases are
            // interchangeable: the judgment holds both ways.
            (ExternDesc::Type(t1), ExternDesc::Type(t2)) => {
                self.subtype_def_type(at, t1, t2)?;
                self.subtype_def_type(at, t2, t1)
            }
            (ExternDesc::Instance(eds1), ExternDesc::Instance(eds2)) => {
                self.match_extern_decls(at, eds1, eds2)
            }
            (ExternDesc::Component(c1), ExternDesc::Component(c2)) => {
                self.subtype_component(at, c1, c2)
            }
            _ => Err(ErrorKind::SortMismatch {
                expected: d2.sort(),
                found: d1.sort(),
            }),
        }
    }

    /// `I1 <: I2`. `I1`'s existentials become fresh rigid variables
    /// (the subtype must work for whatever they turn out to be), and
    /// the resulting concrete export list is matched against `I2`.
    #[instrument(skip_all)]
    pub fn subtype_instance(
        &mut self,
        at: ScopeId,
        it1: &InstanceType<'a>,
        it2: &InstanceType<'a>,
    ) -> Result<(), ErrorKind<'a>> {
        let it1 = Subst::deepen().instance_type(it1)?;
        let it2 = Subst::deepen().instance_type(it2)?;
        let child = self.push_scope(Some(at), false)?;
        let sub = self.open_uvars(child, &it1.evars, false)?;
        let opened = sub.extern_decls(&it1.exports)?;
        self.match_exports(child, &opened, &it2)?;
        Ok(())
    }

    /// `C1 <: C2`. `C2`'s universals are opened as rigid variables
    /// standing for whatever a future instantiation supplies; its now
    /// concrete import list must satisfy `C1`'s imports (existential
    /// elimination against `C1`'s quantifier; imports run backwards),
    /// and the discovered bindings discharge `C1`'s export side for an
    /// ordinary instance check.
    #[instrument(skip_all)]
    pub fn subtype_component(
        &mut self,
        at: ScopeId,
        ct1: &ComponentType<'a>,
        ct2: &ComponentType<'a>,
    ) -> Result<(), ErrorKind<'a>> {
        let ct1 = Subst::deepen().component_type(ct1)?;
        let ct2 = Subst::deepen().component_type(ct2)?;
        let child = self.push_scope(Some(at), false)?;
        let sub = self.open_uvars(child, &ct2.uvars, true)?;
        let ct2_imports = sub.extern_decls(&ct2.imports)?;
        let ct2_exports = sub.instance_type(&ct2.exports)?;

        let ct1_sig = InstanceType {
            evars: ct1.uvars.clone(),
            exports: ct1.imports.clone(),
        };
        let bindings = self.match_exports(child, &ct2_imports, &ct1_sig)?;
        let ct1_exports = Subst::fill_bound(&bindings).instance_type(&ct1.exports)?;
        self.subtype_instance(child, &ct1_exports, &ct2_exports)
    }

    /// Discover what a component's universals must be for the given
    /// arguments to satisfy its imports. This is the instantiation
    /// front door: the import side of `∀ ū. {imports} → …` is exactly
    /// an existential signature from the supplier's point of view.
    pub fn match_component_imports(
        &mut self,
        at: ScopeId,
        args: &[ExternDecl<'a>],
        ct: &ComponentType<'a>,
    ) -> Result<Vec<DefType<'a>>, ErrorKind<'a>> {
        let sig = InstanceType {
            evars: ct.uvars.clone(),
            exports: ct.imports.clone(),
        };
        self.match_exports(at, args, &sig)
    }
}
