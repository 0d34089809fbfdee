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

//! Well-formedness of finished types.
//!
//! Runs over whole published types rather than declarator by
//! declarator: a type is checked when a body closes over it, or when
//! an outer alias carries it across a boundary. The checks are
//! position-sensitive. Export position forbids a concrete resource
//! id from surfacing bare (abstraction is the whole point of the
//! published type); parameter position is the only place a borrowed
//! handle may appear, since a borrow must not outlive the call that
//! lent it.

use itertools::Itertools;

use crate::error::ErrorKind;
use crate::itypes::{
    ComponentType, CoreModuleType, DefType, ExternDecl, ExternDesc, FuncType, InstanceType,
    ResourceRef, TypeBound, ValType,
};
use crate::scope::{ScopeArena, ScopeId};
use crate::subst::Subst;

/// Where a defined type sits in the type being checked.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DefPos {
    pub(crate) export: bool,
}

impl DefPos {
    pub(crate) fn internal() -> Self {
        DefPos { export: false }
    }

    pub(crate) fn export() -> Self {
        DefPos { export: true }
    }
}

/// Where a value type sits: inside a parameter list or not, on top
/// of the defined-type position it is embedded in.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ValPos {
    pub(crate) param: bool,
    pub(crate) dp: DefPos,
}

fn wf_core_module<'a>(cmt: &CoreModuleType<'a>) -> Result<(), ErrorKind<'a>> {
    if let Some(e) = cmt.exports.iter().duplicates_by(|e| e.name).next() {
        return Err(ErrorKind::DuplicateCoreExport(e.name));
    }
    Ok(())
}

impl<'a> ScopeArena<'a> {
    pub(crate) fn wf_def_type(
        &mut self,
        at: ScopeId,
        dt: &DefType<'a>,
        p: DefPos,
    ) -> Result<(), ErrorKind<'a>> {
        match dt {
            // A variable is as good as its bound; a transparent one
            // re-checks what it stands for at the same position.
            DefType::Var(tv) => {
                let tb = self.var_bound(at, *tv).clone();
                self.wf_type_bound(at, &tb, p)
            }
            DefType::Resource(id) => {
                if p.export {
                    Err(ErrorKind::BareResourceExport(*id))
                } else {
                    Ok(())
                }
            }
            DefType::Val(vt) => self.wf_val_type(at, vt, ValPos { param: false, dp: p }),
            DefType::Func(ft) => self.wf_func_type(at, ft, p),
            DefType::Instance(it) => self.wf_instance_type(at, it, p),
            DefType::Component(ct) => self.wf_component_type(at, ct, p),
        }
    }

    fn wf_type_bound(
        &mut self,
        at: ScopeId,
        tb: &TypeBound<'a>,
        p: DefPos,
    ) -> Result<(), ErrorKind<'a>> {
        match tb {
            TypeBound::Eq(dt) => self.wf_def_type(at, dt, p),
            TypeBound::SubResource => Ok(()),
        }
    }

    fn wf_val_type(
        &mut self,
        at: ScopeId,
        vt: &ValType<'a>,
        vp: ValPos,
    ) -> Result<(), ErrorKind<'a>> {
        match vt {
            ValType::Bool
            | ValType::S(_)
            | ValType::U(_)
            | ValType::F(_)
            | ValType::Char
            | ValType::String => Ok(()),
            ValType::List(t) | ValType::Option(t) => self.wf_val_type(at, t, vp),
            ValType::Record(fields) => {
                if let Some(f) = fields.iter().duplicates_by(|f| f.name).next() {
                    return Err(ErrorKind::DuplicateRecordField(f.name));
                }
                fields
                    .iter()
                    .try_for_each(|f| self.wf_val_type(at, &f.ty, vp))
            }
            ValType::Tuple(ts) => ts.iter().try_for_each(|t| self.wf_val_type(at, t, vp)),
            ValType::Flags(names) => {
                if let Some(n) = names.iter().duplicates().next() {
                    return Err(ErrorKind::DuplicateFlag(*n));
                }
                Ok(())
            }
            ValType::Variant(vcs) => {
                if let Some(c) = vcs.iter().duplicates_by(|c| c.name).next() {
                    return Err(ErrorKind::DuplicateVariantCase(c.name));
                }
                for vc in vcs {
                    if let Some(t) = &vc.ty {
                        self.wf_val_type(at, t, vp)?;
                    }
                    if let Some(target) = vc.defaults {
                        let tc = vcs.get(target as usize).ok_or(ErrorKind::BadCaseDefault {
                            case: vc.name,
                            target,
                        })?;
                        self.subtype_value_option(at, &vc.ty, &tc.ty)?;
                    }
                }
                Ok(())
            }
            ValType::Enum(names) => {
                if let Some(n) = names.iter().duplicates().next() {
                    return Err(ErrorKind::DuplicateEnumCase(*n));
                }
                Ok(())
            }
            ValType::Result(ok, err) => {
                if let Some(t) = ok.as_ref() {
                    self.wf_val_type(at, t, vp)?;
                }
                if let Some(t) = err.as_ref() {
                    self.wf_val_type(at, t, vp)?;
                }
                Ok(())
            }
            ValType::Own(rr) => self.wf_resource_ref(at, *rr, vp.dp),
            ValType::Borrow(rr) => {
                if !vp.param {
                    return Err(ErrorKind::BorrowOutsideParam);
                }
                self.wf_resource_ref(at, *rr, vp.dp)
            }
        }
    }

    fn wf_resource_ref(
        &mut self,
        at: ScopeId,
        rr: ResourceRef,
        p: DefPos,
    ) -> Result<(), ErrorKind<'a>> {
        match rr {
            ResourceRef::Id(id) if p.export => Err(ErrorKind::BareResourceExport(id)),
            ResourceRef::Id(_) => Ok(()),
            // The variable itself is the published face; it only has
            // to be provable as a resource, whatever it resolves to.
            ResourceRef::Var(tv) => self.resource_ref(at, &DefType::Var(tv)).map(|_| ()),
        }
    }

    fn wf_func_type(
        &mut self,
        at: ScopeId,
        ft: &FuncType<'a>,
        p: DefPos,
    ) -> Result<(), ErrorKind<'a>> {
        for t in ft.params.types() {
            self.wf_val_type(at, t, ValPos { param: true, dp: p })?;
        }
        for t in ft.results.types() {
            self.wf_val_type(at, t, ValPos { param: false, dp: p })?;
        }
        Ok(())
    }

    fn wf_extern_decls(
        &mut self,
        at: ScopeId,
        eds: &[ExternDecl<'a>],
        p: DefPos,
    ) -> Result<(), ErrorKind<'a>> {
        if let Some(ed) = eds.iter().duplicates_by(|ed| ed.name).next() {
            return Err(ErrorKind::DuplicateExternName(ed.name));
        }
        for ed in eds {
            self.wf_extern_desc(at, &ed.desc, p)?;
        }
        Ok(())
    }

    fn wf_extern_desc(
        &mut self,
        at: ScopeId,
        desc: &ExternDesc<'a>,
        p: DefPos,
    ) -> Result<(), ErrorKind<'a>> {
        match desc {
            ExternDesc::CoreModule(cmt) => wf_core_module(cmt),
            ExternDesc::Func(ft) => self.wf_func_type(at, ft, p),
            ExternDesc::Value(vt) => self.wf_val_type(at, vt, ValPos { param: false, dp: p }),
            ExternDesc::Type(dt) => self.wf_def_type(at, dt, p),
            ExternDesc::Instance(eds) => self.wf_extern_decls(at, eds, p),
            ExternDesc::Component(ct) => self.wf_component_type(at, ct, p),
        }
    }

    /// Check a closed instance type by opening its existential frame
    /// in a throwaway child scope and walking the opened body.
    pub(crate) fn wf_instance_type(
        &mut self,
        at: ScopeId,
        it: &InstanceType<'a>,
        p: DefPos,
    ) -> Result<(), ErrorKind<'a>> {
        // The type arrives phrased at `at` and is walked one scope
        // deeper, so it moves down a link first.
        let it = Subst::deepen().instance_type(it)?;
        let probe = self.push_scope(Some(at), false)?;
        let sub = self.open_evars(probe, &it.evars)?;
        // open_evars already rebased each bound against the probe
        // scope, so the recorded entries are the bounds to check.
        for j in 0..self.at(probe).evars.len() {
            let tb = self.at(probe).evars[j].bound.clone();
            self.wf_type_bound(probe, &tb, p)?;
        }
        let eds = sub.extern_decls(&it.exports)?;
        self.wf_extern_decls(probe, &eds, p)
    }

    /// Check a closed component type: imports are internal-position
    /// inputs, the export side carries the position the whole type
    /// sits in.
    pub(crate) fn wf_component_type(
        &mut self,
        at: ScopeId,
        ct: &ComponentType<'a>,
        p: DefPos,
    ) -> Result<(), ErrorKind<'a>> {
        let ct = Subst::deepen().component_type(ct)?;
        let probe = self.push_scope(Some(at), false)?;
        let sub = self.open_uvars(probe, &ct.uvars, true)?;
        for j in 0..self.at(probe).uvars.len() {
            let tb = self.at(probe).uvars[j].bound.clone();
            self.wf_type_bound(probe, &tb, DefPos::internal())?;
        }
        let imports = sub.extern_decls(&ct.imports)?;
        self.wf_extern_decls(probe, &imports, DefPos::internal())?;
        let inst = sub.instance_type(&ct.exports)?;
        self.wf_instance_type(probe, &inst, p)
    }
}
