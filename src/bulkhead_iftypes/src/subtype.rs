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

//! # Structural subtyping
//!
//! The shape-directed half of the subtype judgment: values, functions,
//! handles, core module types, and defined types whose heads are
//! already concrete. Quantified instance and component types go
//! through matching (see [`crate::sigmatch`]), which opens binder
//! frames as fresh scope entries; that is why the judgment takes the
//! arena mutably even though most arms only read it.
//!
//! There is no partial failure: a judgment either holds or reports the
//! first offending pair of shapes.

use crate::error::ErrorKind;
use crate::itypes::{
    CoreExternDesc, CoreModuleType, DefType, FuncType, ResourceRef, TypeList, Tyvar, ValType,
};
use crate::resolve::Resolution;
use crate::scope::{ScopeArena, ScopeId};

fn type_list_shapes_match(a: &TypeList, b: &TypeList) -> bool {
    match (a, b) {
        (TypeList::Anon(_), TypeList::Anon(_)) => true,
        (TypeList::Named(xs), TypeList::Named(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|((n1, _), (n2, _))| n1 == n2)
        }
        _ => false,
    }
}

fn subtype_core_desc<'a>(
    d1: &CoreExternDesc,
    d2: &CoreExternDesc,
) -> Result<(), ErrorKind<'a>> {
    use CoreExternDesc::*;
    let err = || ErrorKind::MismatchedCoreDesc(d1.clone(), d2.clone());
    match (d1, d2) {
        (Func(f1), Func(f2)) if f1 == f2 => Ok(()),
        (Table(t1), Table(t2)) if t1.element == t2.element && t1.limits.fits_within(&t2.limits) => {
            Ok(())
        }
        (Memory(m1), Memory(m2)) if m1.shared == m2.shared && m1.limits.fits_within(&m2.limits) => {
            Ok(())
        }
        // Globals are invariant: a mutable global is read-write on
        // both sides and an immutable one is baked in at link time.
        (Global(g1), Global(g2)) if g1 == g2 => Ok(()),
        _ => Err(err()),
    }
}

impl<'a> ScopeArena<'a> {
    pub fn subtype_value(
        &mut self,
        at: ScopeId,
        vt1: &ValType<'a>,
        vt2: &ValType<'a>,
    ) -> Result<(), ErrorKind<'a>> {
        use ValType::*;
        match (vt1, vt2) {
            (Bool, Bool) => Ok(()),
            (S(w1), S(w2)) if w1 == w2 => Ok(()),
            (U(w1), U(w2)) if w1 == w2 => Ok(()),
            (F(w1), F(w2)) if w1 == w2 => Ok(()),
            (Char, Char) => Ok(()),
            (String, String) => Ok(()),
            (List(vt1), List(vt2)) => self.subtype_value(at, vt1, vt2),
            (Record(rfs1), Record(rfs2)) => {
                for rf2 in rfs2.iter() {
                    match rfs1.iter().find(|rf| rf2.name == rf.name) {
                        None => return Err(ErrorKind::MissingRecordField(rf2.name)),
                        Some(rf1) => self.subtype_value(at, &rf1.ty, &rf2.ty)?,
                    }
                }
                Ok(())
            }
            (Tuple(vts1), Tuple(vts2)) => {
                // No width subtyping for positional types: an extra
                // component changes the arity, it does not refine it.
                if vts1.len() != vts2.len() {
                    return Err(ErrorKind::MismatchedTupleArity(vts1.len(), vts2.len()));
                }
                vts1.iter()
                    .zip(vts2.iter())
                    .try_for_each(|(vt1, vt2)| self.subtype_value(at, vt1, vt2))
            }
            (Flags(ns1), Flags(ns2)) => ns2
                .iter()
                .find(|n2| !ns1.iter().any(|n1| n1 == *n2))
                .map_or(Ok(()), |n| Err(ErrorKind::MissingFlag(*n))),
            (Variant(vcs1), Variant(vcs2)) => {
                for (i1, vc1) in vcs1.iter().enumerate() {
                    // A case the supertype lacks is still fine if its
                    // default chain reaches a case the supertype has.
                    // The chain only ever steps to earlier siblings,
                    // so it cannot loop.
                    let mut pi = i1;
                    let mut probe = vc1;
                    let vc2 = loop {
                        match vcs2.iter().find(|vc| vc.name == probe.name) {
                            Some(found) => break found,
                            None => match probe.defaults {
                                Some(j) if (j as usize) < pi => {
                                    pi = j as usize;
                                    probe = &vcs1[pi];
                                }
                                _ => return Err(ErrorKind::MissingVariantCase(vc1.name)),
                            },
                        }
                    };
                    self.subtype_value_option(at, &vc1.ty, &vc2.ty)?;
                }
                Ok(())
            }
            (Enum(ns1), Enum(ns2)) => ns1
                .iter()
                .find(|n1| !ns2.iter().any(|n2| n2 == *n1))
                .map_or(Ok(()), |n| Err(ErrorKind::MissingEnumCase(*n))),
            (Option(vt1), Option(vt2)) => self.subtype_value(at, vt1, vt2),
            (Result(ok1, err1), Result(ok2, err2)) => {
                self.subtype_value_option(at, ok1, ok2)?;
                self.subtype_value_option(at, err1, err2)
            }
            (Own(r1), Own(r2)) | (Borrow(r1), Borrow(r2)) => {
                self.subtype_resource_ref(at, r1, r2)
            }
            // An owned handle may be lent where only a borrow is
            // expected; the converse would forge ownership.
            (Own(r1), Borrow(r2)) => self.subtype_resource_ref(at, r1, r2),
            _ => Err(ErrorKind::MismatchedValue(vt1.clone(), vt2.clone())),
        }
    }

    pub fn subtype_value_option(
        &mut self,
        at: ScopeId,
        vt1: &Option<ValType<'a>>,
        vt2: &Option<ValType<'a>>,
    ) -> Result<(), ErrorKind<'a>> {
        match (vt1, vt2) {
            (None, None) => Ok(()),
            (None, Some(vt2)) => Err(ErrorKind::MissingValue(vt2.clone())),
            (Some(_), None) => Ok(()),
            (Some(vt1), Some(vt2)) => self.subtype_value(at, vt1, vt2),
        }
    }

    /// Two abstract variables agree only if they denote the exact same
    /// slot after resolution; two resolved ones fall back to the
    /// structural judgment.
    pub fn subtype_var_var(
        &mut self,
        at: ScopeId,
        v1: Tyvar,
        v2: Tyvar,
    ) -> Result<(), ErrorKind<'a>> {
        match (self.resolve_tyvar(at, v1), self.resolve_tyvar(at, v2)) {
            (Resolution::Definite(dt1), Resolution::Definite(dt2)) => {
                self.subtype_def_type(at, &dt1, &dt2)
            }
            (Resolution::Evar(o1, i1, _), Resolution::Evar(o2, i2, _)) if o1 == o2 && i1 == i2 => {
                Ok(())
            }
            (Resolution::Uvar(o1, i1, _), Resolution::Uvar(o2, i2, _)) if o1 == o2 && i1 == i2 => {
                Ok(())
            }
            (Resolution::Bound(_), _) | (_, Resolution::Bound(_)) => {
                panic!("internal invariant violation: stray bound var in subtype_var_var")
            }
            _ => Err(ErrorKind::MismatchedVars(v1, v2)),
        }
    }

    pub fn subtype_resource_ref(
        &mut self,
        at: ScopeId,
        r1: &ResourceRef,
        r2: &ResourceRef,
    ) -> Result<(), ErrorKind<'a>> {
        match (r1, r2) {
            (ResourceRef::Id(a), ResourceRef::Id(b)) => {
                if a == b {
                    Ok(())
                } else {
                    Err(ErrorKind::MismatchedResources(*a, *b))
                }
            }
            (ResourceRef::Var(v1), ResourceRef::Var(v2)) => self.subtype_var_var(at, *v1, *v2),
            (ResourceRef::Var(v), ResourceRef::Id(b)) | (ResourceRef::Id(b), ResourceRef::Var(v)) => {
                match self.resolve_tyvar(at, *v) {
                    Resolution::Definite(DefType::Resource(a)) if a == *b => Ok(()),
                    _ => Err(ErrorKind::MismatchedResourceVar(*v, *b)),
                }
            }
        }
    }

    /// Parameters are contravariant and results covariant, but the
    /// named/unnamed shape and the names themselves must line up
    /// exactly; a shape difference is a hard error, not a near-miss.
    pub fn subtype_func(
        &mut self,
        at: ScopeId,
        ft1: &FuncType<'a>,
        ft2: &FuncType<'a>,
    ) -> Result<(), ErrorKind<'a>> {
        if !type_list_shapes_match(&ft1.params, &ft2.params)
            || !type_list_shapes_match(&ft1.results, &ft2.results)
        {
            return Err(ErrorKind::MismatchedFuncShapes(ft1.clone(), ft2.clone()));
        }
        for (p1, p2) in ft1.params.types().zip(ft2.params.types()) {
            self.subtype_value(at, p2, p1)?;
        }
        for (r1, r2) in ft1.results.types().zip(ft2.results.types()) {
            self.subtype_value(at, r1, r2)?;
        }
        Ok(())
    }

    /// A module standing in for another must export at least as much
    /// and import no more.
    pub fn subtype_core_module(
        &self,
        cmt1: &CoreModuleType<'a>,
        cmt2: &CoreModuleType<'a>,
    ) -> Result<(), ErrorKind<'a>> {
        for ex2 in &cmt2.exports {
            let ex1 = cmt1
                .exports
                .iter()
                .find(|e| e.name == ex2.name)
                .ok_or(ErrorKind::MissingCoreExport(ex2.name))?;
            subtype_core_desc(&ex1.desc, &ex2.desc)?;
        }
        for im1 in &cmt1.imports {
            let im2 = cmt2
                .imports
                .iter()
                .find(|i| i.module == im1.module && i.name == im1.name)
                .ok_or(ErrorKind::MissingCoreImport {
                    module: im1.module,
                    name: im1.name,
                })?;
            subtype_core_desc(&im2.desc, &im1.desc)?;
        }
        Ok(())
    }

    pub fn subtype_def_type(
        &mut self,
        at: ScopeId,
        dt1: &DefType<'a>,
        dt2: &DefType<'a>,
    ) -> Result<(), ErrorKind<'a>> {
        match (dt1, dt2) {
            (DefType::Var(v1), DefType::Var(v2)) => self.subtype_var_var(at, *v1, *v2),
            (DefType::Var(v), dt2) => match self.resolve_tyvar(at, *v) {
                Resolution::Definite(dt1) => self.subtype_def_type(at, &dt1, dt2),
                _ => Err(ErrorKind::MismatchedDefined(dt1.clone(), dt2.clone())),
            },
            (dt1, DefType::Var(v)) => match self.resolve_tyvar(at, *v) {
                Resolution::Definite(dt2) => self.subtype_def_type(at, dt1, &dt2),
                _ => Err(ErrorKind::MismatchedDefined(dt1.clone(), dt2.clone())),
            },
            (DefType::Resource(a), DefType::Resource(b)) => {
                if a == b {
                    Ok(())
                } else {
                    Err(ErrorKind::MismatchedResources(*a, *b))
                }
            }
            (DefType::Val(vt1), DefType::Val(vt2)) => self.subtype_value(at, vt1, vt2),
            (DefType::Func(ft1), DefType::Func(ft2)) => self.subtype_func(at, ft1, ft2),
            (DefType::Instance(it1), DefType::Instance(it2)) => {
                self.subtype_instance(at, it1, it2)
            }
            (DefType::Component(ct1), DefType::Component(ct2)) => {
                self.subtype_component(at, ct1, ct2)
            }
            _ => Err(ErrorKind::MismatchedDefined(dt1.clone(), dt2.clone())),
        }
    }
}
