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

//! Declarator elaboration: turning a declaration list into a closed
//! [`ComponentType`].
//!
//! Each declarator appends to the index spaces of the scope it runs
//! in; import and export declarators additionally open quantifier
//! entries (universal for imports, existential for exports) so that
//! the rest of the body can refer to the abstract types they
//! introduce as free variables. When a body ends, its quantifier
//! entries are folded back into binder frames. That closing is the
//! only place free variables become bound again, and the only place
//! an ill-scoped reference (a local abstract type leaking into an
//! import, or out of the component entirely) can be detected, which
//! is why finished types are checked for well-formedness as a whole
//! rather than declarator by declarator.

use std::collections::BTreeSet;

use itertools::Itertools;
use tracing::instrument;

use crate::decls::{
    AliasDef, CanonDef, ComponentTypeDecl, Decl, ExportDef, ExternDef, FuncDef, InstanceDef,
    InstanceTypeDecl, IoDef, Prim, ResourceDef, Sort, StartDef, TypeDef, TypeRefDef, ValDef,
    ValRef,
};
use crate::error::{Error, ErrorKind, Loc};
use crate::itypes::{
    ComponentType, CoreFuncType, CoreModuleType, CoreValType, DefType, ExternDecl, ExternDesc,
    FreeVar, FuncType, InstanceType, RecordField, ResourceId, ResourceRef, TypeBound, TypeList,
    Tyvar, ValType, VariantCase,
};
use crate::resolve::Resolution;
use crate::scope::{InstanceEntry, Limits, ResourceInfo, ScopeArena, ScopeId, ValueEntry};
use crate::subst::{FreeAction, Subst};
use crate::wf::DefPos;

/// Validate a component definition and compute its type.
///
/// The declaration list is walked in order in a fresh root scope;
/// the result is the component's universally quantified import
/// signature over its existentially quantified export signature,
/// with no free variables. Errors carry the scope depth and
/// declarator index they arose at.
#[instrument(skip_all, err)]
pub fn validate_component<'a>(
    decls: &'a [Decl<'a>],
    limits: &Limits,
) -> Result<ComponentType<'a>, Error<'a>> {
    let mut arena = ScopeArena::new(*limits);
    let root = arena
        .push_scope(None, true)
        .map_err(|e| e.at(Loc { depth: 0, index: 0 }))?;
    let out = arena.elab_concrete_body(root, decls)?;
    arena.finish_component(root, out, decls.len() as u32)
}

/// Import and export declarations accumulated while walking one
/// component body.
#[derive(Default)]
struct BodyOut<'a> {
    imports: Vec<ExternDecl<'a>>,
    exports: Vec<ExternDecl<'a>>,
}

impl<'a> ScopeArena<'a> {
    fn elab_concrete_body(
        &mut self,
        at: ScopeId,
        decls: &'a [Decl<'a>],
    ) -> Result<BodyOut<'a>, Error<'a>> {
        let mut out = BodyOut::default();
        for (i, d) in decls.iter().enumerate() {
            let loc = Loc {
                depth: self.depth_of(at),
                index: i as u32,
            };
            tracing::trace!(index = i, kind = decl_kind(d), "declarator");
            self.room_for_entry(at).map_err(|e| e.at(loc))?;
            match d {
                Decl::CoreModule(cmt) => self.elab_core_module(at, cmt).map_err(|e| e.at(loc))?,
                Decl::Type(td) => self.elab_type_def(at, td, loc)?,
                Decl::Alias(ad) => self.elab_alias(at, ad, loc)?,
                Decl::Import { name, def } => {
                    let ed = self.elab_import(at, name, *def, loc)?;
                    out.imports.push(ed);
                }
                Decl::Export { name, what } => {
                    let ed = self.elab_export_concrete(at, name, what, loc)?;
                    out.exports.push(ed);
                }
                Decl::Instance(idef) => self.elab_instance_def(at, idef, loc)?,
                Decl::Component(body) => {
                    let child = self.push_scope(Some(at), true).map_err(|e| e.at(loc))?;
                    let inner = self.elab_concrete_body(child, body)?;
                    let ct = self.finish_component(child, inner, body.len() as u32)?;
                    self.at_mut(at).components.push(ct);
                }
                Decl::Canon(cd) => self.elab_canon(at, cd, loc)?,
                Decl::Start(sd) => self.elab_start(at, sd, loc)?,
            }
        }
        Ok(out)
    }

    /// An instance-type body: exports only, closed existentially.
    fn elab_instance_type(
        &mut self,
        at: ScopeId,
        body: &'a [InstanceTypeDecl<'a>],
        loc: Loc,
    ) -> Result<InstanceType<'a>, Error<'a>> {
        let child = self.push_scope(Some(at), false).map_err(|e| e.at(loc))?;
        let mut exports = Vec::new();
        for (i, d) in body.iter().enumerate() {
            let dloc = Loc {
                depth: self.depth_of(child),
                index: i as u32,
            };
            tracing::trace!(index = i, kind = instance_decl_kind(d), "declarator");
            self.room_for_entry(child).map_err(|e| e.at(dloc))?;
            match d {
                InstanceTypeDecl::CoreModule(cmt) => {
                    self.elab_core_module(child, cmt).map_err(|e| e.at(dloc))?
                }
                InstanceTypeDecl::Type(td) => self.elab_type_def(child, td, dloc)?,
                InstanceTypeDecl::Alias(ad) => self.elab_alias(child, ad, dloc)?,
                InstanceTypeDecl::Export { name, def } => {
                    let ed = self.elab_export_def(child, name, *def, dloc)?;
                    exports.push(ed);
                }
            }
        }
        let close = Loc {
            depth: self.depth_of(child),
            index: body.len() as u32,
        };
        self.finish_instance(child, exports).map_err(|e| e.at(close))
    }

    /// A component-type body: both sides, closed universally over the
    /// imports and existentially over the exports.
    fn elab_component_type(
        &mut self,
        at: ScopeId,
        body: &'a [ComponentTypeDecl<'a>],
        loc: Loc,
    ) -> Result<ComponentType<'a>, Error<'a>> {
        let child = self.push_scope(Some(at), false).map_err(|e| e.at(loc))?;
        let mut out = BodyOut::default();
        for (i, d) in body.iter().enumerate() {
            let dloc = Loc {
                depth: self.depth_of(child),
                index: i as u32,
            };
            tracing::trace!(index = i, kind = component_decl_kind(d), "declarator");
            self.room_for_entry(child).map_err(|e| e.at(dloc))?;
            match d {
                ComponentTypeDecl::CoreModule(cmt) => {
                    self.elab_core_module(child, cmt).map_err(|e| e.at(dloc))?
                }
                ComponentTypeDecl::Type(td) => self.elab_type_def(child, td, dloc)?,
                ComponentTypeDecl::Alias(ad) => self.elab_alias(child, ad, dloc)?,
                ComponentTypeDecl::Import { name, def } => {
                    let ed = self.elab_import(child, name, *def, dloc)?;
                    out.imports.push(ed);
                }
                ComponentTypeDecl::Export { name, def } => {
                    let ed = self.elab_export_def(child, name, *def, dloc)?;
                    out.exports.push(ed);
                }
            }
        }
        self.finish_component(child, out, body.len() as u32)
    }

    fn elab_core_module(
        &mut self,
        at: ScopeId,
        cmt: &CoreModuleType<'a>,
    ) -> Result<(), ErrorKind<'a>> {
        if let Some(e) = cmt.exports.iter().duplicates_by(|e| e.name).next() {
            return Err(ErrorKind::DuplicateCoreExport(e.name));
        }
        self.at_mut(at).core_modules.push(cmt.clone());
        Ok(())
    }

    fn elab_type_def(
        &mut self,
        at: ScopeId,
        td: &'a TypeDef<'a>,
        loc: Loc,
    ) -> Result<(), Error<'a>> {
        let dt = match td {
            TypeDef::Val(vd) => {
                DefType::Val(self.elab_val_def(at, vd).map_err(|e| e.at(loc))?)
            }
            TypeDef::Func(fd) => {
                DefType::Func(self.elab_func_def(at, fd).map_err(|e| e.at(loc))?)
            }
            TypeDef::Instance(body) => DefType::Instance(self.elab_instance_type(at, body, loc)?),
            TypeDef::Component(body) => {
                DefType::Component(self.elab_component_type(at, body, loc)?)
            }
            TypeDef::Resource(_) => {
                return Err(ErrorKind::BareResourceOutsideExtern.at(loc));
            }
        };
        self.at_mut(at).types.push(dt);
        Ok(())
    }

    fn elab_alias(&mut self, at: ScopeId, ad: &'a AliasDef<'a>, loc: Loc) -> Result<(), Error<'a>> {
        match ad {
            AliasDef::Export {
                instance,
                name,
                sort,
            } => {
                let desc = self
                    .project_export(at, *instance, name)
                    .map_err(|e| e.at(loc))?;
                if desc.sort() != *sort {
                    return Err(ErrorKind::SortMismatch {
                        expected: *sort,
                        found: desc.sort(),
                    }
                    .at(loc));
                }
                self.register_extern_desc(at, &desc);
                Ok(())
            }
            AliasDef::Outer { count, index, sort } => {
                self.elab_outer_alias(at, *count, *index, *sort, loc)
            }
        }
    }

    /// Copy an entry from `count` scopes up into this one. Each hop
    /// over an ordinary scope pushes free-variable depths one deeper;
    /// a hop into a boundary scope instead forces the type concrete
    /// against the scope it is phrased in, because an abstract type
    /// must not travel between unrelated instantiations. A type that
    /// crossed a boundary is rechecked well-formed for export
    /// position, so a concrete resource id cannot surface bare.
    fn elab_outer_alias(
        &mut self,
        at: ScopeId,
        count: u32,
        index: u32,
        sort: Sort,
        loc: Loc,
    ) -> Result<(), Error<'a>> {
        if self.ancestor(at, count).is_none() {
            return Err(ErrorKind::OuterDepthOutOfRange {
                count,
                available: self.depth_of(at),
            }
            .at(loc));
        }
        let mut hops: Vec<ScopeId> = self.chain(at).take(count as usize + 1).collect();
        hops.reverse();
        let target = hops[0];
        match sort {
            Sort::Type => {
                let mut dt = self.def_type(target, index).map_err(|e| e.at(loc))?.clone();
                let mut crossed = false;
                for pair in hops.windows(2) {
                    let (outer, inner) = (pair[0], pair[1]);
                    dt = if self.is_boundary(inner) {
                        crossed = true;
                        Subst::concretize(&*self, outer).def_type(&dt)
                    } else {
                        Subst::deepen().def_type(&dt)
                    }
                    .map_err(|e| e.at(loc))?;
                }
                if crossed {
                    self.wf_def_type(at, &dt, DefPos::export())
                        .map_err(|e| e.at(loc))?;
                }
                self.at_mut(at).types.push(dt);
                Ok(())
            }
            Sort::Component => {
                let mut ct = self
                    .component(target, index)
                    .map_err(|e| e.at(loc))?
                    .clone();
                let mut crossed = false;
                for pair in hops.windows(2) {
                    let (outer, inner) = (pair[0], pair[1]);
                    ct = if self.is_boundary(inner) {
                        crossed = true;
                        Subst::concretize(&*self, outer).component_type(&ct)
                    } else {
                        Subst::deepen().component_type(&ct)
                    }
                    .map_err(|e| e.at(loc))?;
                }
                if crossed {
                    self.wf_component_type(at, &ct, DefPos::export())
                        .map_err(|e| e.at(loc))?;
                }
                self.at_mut(at).components.push(ct);
                Ok(())
            }
            // Core module types have no type variables to adjust.
            Sort::CoreModule => {
                let cmt = self
                    .core_module(target, index)
                    .map_err(|e| e.at(loc))?
                    .clone();
                self.at_mut(at).core_modules.push(cmt);
                Ok(())
            }
            _ => Err(ErrorKind::SortMismatch {
                expected: Sort::Type,
                found: sort,
            }
            .at(loc)),
        }
    }

    fn elab_import(
        &mut self,
        at: ScopeId,
        name: &'a str,
        def: ExternDef,
        loc: Loc,
    ) -> Result<ExternDecl<'a>, Error<'a>> {
        let (bounds, desc, _) = self.elab_extern_def(at, def).map_err(|e| e.at(loc))?;
        let sub = self.open_uvars(at, &bounds, true).map_err(|e| e.at(loc))?;
        let desc = sub.extern_desc(&desc).map_err(|e| e.at(loc))?;
        self.register_extern_desc(at, &desc);
        Ok(ExternDecl { name, desc })
    }

    /// An export declarator in a type body. The declared bounds open
    /// as existentials; a resource minted here gets its identity
    /// written into the resolution slot, so local declarators see
    /// through the abstraction the published type keeps.
    fn elab_export_def(
        &mut self,
        at: ScopeId,
        name: &'a str,
        def: ExternDef,
        loc: Loc,
    ) -> Result<ExternDecl<'a>, Error<'a>> {
        let (bounds, desc, minted) = self.elab_extern_def(at, def).map_err(|e| e.at(loc))?;
        let sub = self.open_evars(at, &bounds).map_err(|e| e.at(loc))?;
        if let Some(id) = minted {
            let slot = self.at(at).evars.len() - 1;
            self.at_mut(at).evars[slot].resolved = Some(DefType::Resource(id));
        }
        let desc = sub.extern_desc(&desc).map_err(|e| e.at(loc))?;
        self.register_extern_desc(at, &desc);
        Ok(ExternDecl { name, desc })
    }

    fn elab_export_concrete(
        &mut self,
        at: ScopeId,
        name: &'a str,
        what: &'a ExportDef,
        loc: Loc,
    ) -> Result<ExternDecl<'a>, Error<'a>> {
        let desc = match what {
            ExportDef::Def { sort, index } => self
                .sorted_entry(at, *sort, *index)
                .map_err(|e| e.at(loc))?,
            ExportDef::FreshResource(rd) => {
                let id = self.mint_resource(at, *rd).map_err(|e| e.at(loc))?;
                let sub = self
                    .open_evars(at, &[TypeBound::SubResource])
                    .map_err(|e| e.at(loc))?;
                let slot = self.at(at).evars.len() - 1;
                self.at_mut(at).evars[slot].resolved = Some(DefType::Resource(id));
                let dt = sub
                    .def_type(&DefType::Var(Tyvar::Bound(0)))
                    .map_err(|e| e.at(loc))?;
                self.at_mut(at).types.push(dt.clone());
                ExternDesc::Type(dt)
            }
        };
        Ok(ExternDecl { name, desc })
    }

    /// Resolve what an import or export declaration says, as a list
    /// of quantifier bounds (not yet opened) plus a declaration body
    /// phrased against them, plus the identity of a resource minted
    /// here if the declaration brought one into being.
    fn elab_extern_def(
        &mut self,
        at: ScopeId,
        def: ExternDef,
    ) -> Result<(Vec<TypeBound<'a>>, ExternDesc<'a>, Option<ResourceId>), ErrorKind<'a>> {
        Ok(match def {
            ExternDef::CoreModule(i) => (
                Vec::new(),
                ExternDesc::CoreModule(self.core_module(at, i)?.clone()),
                None,
            ),
            ExternDef::Func(i) => (
                Vec::new(),
                ExternDesc::Func(self.func_def_type(at, i)?),
                None,
            ),
            ExternDef::Value(vr) => (
                Vec::new(),
                ExternDesc::Value(self.elab_val_ref(at, &vr)?),
                None,
            ),
            // Transparent: the declaration carries the type itself
            // and no quantifier is introduced.
            ExternDef::Type(TypeRefDef::Eq(i)) => (
                Vec::new(),
                ExternDesc::Type(self.def_type(at, i)?.clone()),
                None,
            ),
            ExternDef::Type(TypeRefDef::SubResource) => (
                vec![TypeBound::SubResource],
                ExternDesc::Type(DefType::Var(Tyvar::Bound(0))),
                None,
            ),
            ExternDef::Type(TypeRefDef::Fresh(rd)) => {
                let id = self.mint_resource(at, rd)?;
                (
                    vec![TypeBound::SubResource],
                    ExternDesc::Type(DefType::Var(Tyvar::Bound(0))),
                    Some(id),
                )
            }
            // An instance declaration splices the instance type's
            // existential frame into this scope's quantifier list;
            // the declaration body is the bare export list.
            ExternDef::Instance(i) => {
                let it = self.instance_def_type(at, i)?;
                (it.evars, ExternDesc::Instance(it.exports), None)
            }
            ExternDef::Component(i) => (
                Vec::new(),
                ExternDesc::Component(self.component_def_type(at, i)?),
                None,
            ),
        })
    }

    fn mint_resource(&mut self, at: ScopeId, rd: ResourceDef) -> Result<ResourceId, ErrorKind<'a>> {
        if let Some(dtor) = rd.dtor {
            self.core_func(at, dtor)?;
        }
        Ok(self.fresh_resource(at, rd.rep, rd.dtor))
    }

    /// File a declaration body into the index space its sort lives
    /// in, so later declarators can refer to it.
    fn register_extern_desc(&mut self, at: ScopeId, desc: &ExternDesc<'a>) {
        let scope = self.at_mut(at);
        match desc {
            ExternDesc::CoreModule(cmt) => scope.core_modules.push(cmt.clone()),
            ExternDesc::Func(ft) => scope.funcs.push(ft.clone()),
            ExternDesc::Value(vt) => scope.values.push(ValueEntry {
                ty: vt.clone(),
                alive: true,
            }),
            ExternDesc::Type(dt) => scope.types.push(dt.clone()),
            ExternDesc::Instance(eds) => scope.instances.push(InstanceEntry {
                exports: eds.clone(),
                alive: true,
                consumed: Vec::new(),
            }),
            ExternDesc::Component(ct) => scope.components.push(ct.clone()),
        }
    }

    /// Read one local entry out by sort, consuming it if its sort is
    /// linear. Used for instantiation arguments, from-exports
    /// packing, and concrete export declarators alike: all three
    /// pass the entry somewhere else.
    fn sorted_entry(
        &mut self,
        at: ScopeId,
        sort: Sort,
        index: u32,
    ) -> Result<ExternDesc<'a>, ErrorKind<'a>> {
        Ok(match sort {
            Sort::CoreModule => ExternDesc::CoreModule(self.core_module(at, index)?.clone()),
            Sort::Func => ExternDesc::Func(self.func(at, index)?.clone()),
            Sort::Value => ExternDesc::Value(self.consume_value(at, index)?),
            Sort::Type => ExternDesc::Type(self.def_type(at, index)?.clone()),
            Sort::Instance => ExternDesc::Instance(self.consume_instance(at, index)?),
            Sort::Component => ExternDesc::Component(self.component(at, index)?.clone()),
        })
    }

    fn elab_instance_def(
        &mut self,
        at: ScopeId,
        idef: &'a InstanceDef<'a>,
        loc: Loc,
    ) -> Result<(), Error<'a>> {
        let exports = match idef {
            InstanceDef::Instantiate { component, args } => {
                let ct = self.component(at, *component).map_err(|e| e.at(loc))?.clone();
                if let Some(a) = args.iter().duplicates_by(|a| a.name).next() {
                    return Err(ErrorKind::DuplicateArg(a.name).at(loc));
                }
                let mut actuals = Vec::with_capacity(args.len());
                for a in args {
                    let desc = self
                        .sorted_entry(at, a.sort, a.index)
                        .map_err(|e| e.at(loc))?;
                    actuals.push(ExternDecl { name: a.name, desc });
                }
                if let Some(im) = ct
                    .imports
                    .iter()
                    .find(|im| !actuals.iter().any(|a| a.name == im.name))
                {
                    return Err(ErrorKind::MissingImport(im.name).at(loc));
                }
                let bindings = self
                    .match_component_imports(at, &actuals, &ct)
                    .map_err(|e| e.at(loc))?;
                let inst = Subst::fill_bound(&bindings)
                    .instance_type(&ct.exports)
                    .map_err(|e| e.at(loc))?;
                // Each instantiation re-opens the export existentials
                // as fresh rigid variables: two instantiations of one
                // component never share an abstract type.
                let sub = self
                    .open_uvars(at, &inst.evars, false)
                    .map_err(|e| e.at(loc))?;
                let exports = sub.extern_decls(&inst.exports).map_err(|e| e.at(loc))?;
                tracing::debug!(
                    component = *component,
                    exports = exports.len(),
                    "instantiated"
                );
                exports
            }
            InstanceDef::FromExports(items) => {
                if let Some(x) = items.iter().duplicates_by(|x| x.name).next() {
                    return Err(ErrorKind::DuplicateExternName(x.name).at(loc));
                }
                let mut exports = Vec::with_capacity(items.len());
                for x in items {
                    let desc = self
                        .sorted_entry(at, x.sort, x.index)
                        .map_err(|e| e.at(loc))?;
                    exports.push(ExternDecl { name: x.name, desc });
                }
                exports
            }
        };
        self.at_mut(at).instances.push(InstanceEntry {
            exports,
            alive: true,
            consumed: Vec::new(),
        });
        Ok(())
    }

    fn elab_canon(&mut self, at: ScopeId, cd: &'a CanonDef, loc: Loc) -> Result<(), Error<'a>> {
        match cd {
            // The core side of lift and lower is ABI; nothing past
            // index validity is checked here.
            CanonDef::Lift { core_func, ty } => {
                self.core_func(at, *core_func).map_err(|e| e.at(loc))?;
                let ft = self.func_def_type(at, *ty).map_err(|e| e.at(loc))?;
                self.at_mut(at).funcs.push(ft);
            }
            CanonDef::Lower { func, core_ty } => {
                self.func(at, *func).map_err(|e| e.at(loc))?;
                self.at_mut(at).core_funcs.push(core_ty.clone());
            }
            CanonDef::ResourceNew { ty } => {
                let info = self.canon_local_resource(at, *ty).map_err(|e| e.at(loc))?;
                self.at_mut(at).core_funcs.push(CoreFuncType {
                    params: vec![info.rep],
                    results: vec![CoreValType::I32],
                });
            }
            CanonDef::ResourceDrop { ty } => {
                let dt = self.def_type(at, *ty).map_err(|e| e.at(loc))?.clone();
                self.resource_ref(at, &dt).map_err(|e| e.at(loc))?;
                self.at_mut(at).core_funcs.push(CoreFuncType {
                    params: vec![CoreValType::I32],
                    results: Vec::new(),
                });
            }
            CanonDef::ResourceRep { ty } => {
                let info = self.canon_local_resource(at, *ty).map_err(|e| e.at(loc))?;
                self.at_mut(at).core_funcs.push(CoreFuncType {
                    params: vec![CoreValType::I32],
                    results: vec![info.rep],
                });
            }
        }
        Ok(())
    }

    /// `resource.new` and `resource.rep` need the representation
    /// type, which only the allocating component knows; an abstract
    /// resource has no reachable representation.
    fn canon_local_resource(
        &self,
        at: ScopeId,
        index: u32,
    ) -> Result<ResourceInfo, ErrorKind<'a>> {
        let dt = self.def_type(at, index)?.clone();
        match self.resource_ref(at, &dt)? {
            ResourceRef::Id(id) => self
                .local_resource(at, id)
                .ok_or(ErrorKind::NotLocalResource(dt)),
            ResourceRef::Var(_) => Err(ErrorKind::NotLocalResource(dt)),
        }
    }

    fn elab_start(&mut self, at: ScopeId, sd: &'a StartDef, loc: Loc) -> Result<(), Error<'a>> {
        let ft = self.func(at, sd.func).map_err(|e| e.at(loc))?.clone();
        if ft.params.len() != sd.args.len() {
            return Err(ErrorKind::StartArity {
                want: ft.params.len(),
                got: sd.args.len(),
            }
            .at(loc));
        }
        for (arg, want) in sd.args.iter().zip(ft.params.types()) {
            let got = self.consume_value(at, *arg).map_err(|e| e.at(loc))?;
            self.subtype_value(at, &got, want).map_err(|e| e.at(loc))?;
        }
        if ft.results.len() != sd.results as usize {
            return Err(ErrorKind::StartResultArity {
                want: ft.results.len(),
                got: sd.results,
            }
            .at(loc));
        }
        for vt in ft.results.types() {
            self.room_for_entry(at).map_err(|e| e.at(loc))?;
            self.at_mut(at).values.push(ValueEntry {
                ty: vt.clone(),
                alive: true,
            });
        }
        Ok(())
    }

    fn elab_val_ref(&self, at: ScopeId, vr: &ValRef) -> Result<ValType<'a>, ErrorKind<'a>> {
        match vr {
            ValRef::Prim(p) => Ok(prim_val(*p)),
            ValRef::Idx(i) => {
                let dt = self.def_type(at, *i)?;
                match dt {
                    DefType::Val(vt) => Ok(vt.clone()),
                    DefType::Var(tv) => match self.resolve_tyvar(at, *tv) {
                        Resolution::Definite(DefType::Val(vt)) => Ok(vt),
                        _ => Err(ErrorKind::NotAValueType(dt.clone())),
                    },
                    _ => Err(ErrorKind::NotAValueType(dt.clone())),
                }
            }
        }
    }

    fn elab_val_def(&mut self, at: ScopeId, vd: &'a ValDef<'a>) -> Result<ValType<'a>, ErrorKind<'a>> {
        Ok(match vd {
            ValDef::Prim(p) => prim_val(*p),
            ValDef::List(vr) => ValType::List(Box::new(self.elab_val_ref(at, vr)?)),
            ValDef::Record(fields) => {
                if let Some(f) = fields.iter().duplicates_by(|f| f.name).next() {
                    return Err(ErrorKind::DuplicateRecordField(f.name));
                }
                ValType::Record(
                    fields
                        .iter()
                        .map(|f| {
                            Ok(RecordField {
                                name: f.name,
                                ty: self.elab_val_ref(at, &f.ty)?,
                            })
                        })
                        .collect::<Result<_, ErrorKind<'a>>>()?,
                )
            }
            ValDef::Tuple(vrs) => ValType::Tuple(
                vrs.iter()
                    .map(|vr| self.elab_val_ref(at, vr))
                    .collect::<Result<_, _>>()?,
            ),
            ValDef::Flags(names) => {
                if let Some(n) = names.iter().duplicates().next() {
                    return Err(ErrorKind::DuplicateFlag(n));
                }
                ValType::Flags(names.clone())
            }
            ValDef::Variant(cases) => {
                if let Some(c) = cases.iter().duplicates_by(|c| c.name).next() {
                    return Err(ErrorKind::DuplicateVariantCase(c.name));
                }
                let vcs: Vec<VariantCase<'a>> = cases
                    .iter()
                    .map(|c| {
                        Ok(VariantCase {
                            name: c.name,
                            ty: c.ty.as_ref().map(|vr| self.elab_val_ref(at, vr)).transpose()?,
                            defaults: c.defaults,
                        })
                    })
                    .collect::<Result<_, ErrorKind<'a>>>()?;
                // A defaulting case must name a real target and carry
                // a payload the target can absorb.
                for vc in &vcs {
                    if let Some(target) = vc.defaults {
                        let tc = vcs.get(target as usize).ok_or(ErrorKind::BadCaseDefault {
                            case: vc.name,
                            target,
                        })?;
                        self.subtype_value_option(at, &vc.ty, &tc.ty)?;
                    }
                }
                ValType::Variant(vcs)
            }
            ValDef::Enum(names) => {
                if let Some(n) = names.iter().duplicates().next() {
                    return Err(ErrorKind::DuplicateEnumCase(n));
                }
                ValType::Enum(names.clone())
            }
            ValDef::Option(vr) => ValType::Option(Box::new(self.elab_val_ref(at, vr)?)),
            ValDef::Result { ok, err } => ValType::Result(
                Box::new(ok.as_ref().map(|vr| self.elab_val_ref(at, vr)).transpose()?),
                Box::new(err.as_ref().map(|vr| self.elab_val_ref(at, vr)).transpose()?),
            ),
            // Handles keep the abstract face even when this scope
            // knows the identity behind it; see
            // [`ScopeArena::handle_ref`].
            ValDef::Own(i) => {
                let dt = self.def_type(at, *i)?.clone();
                ValType::Own(self.handle_ref(at, &dt)?)
            }
            ValDef::Borrow(i) => {
                let dt = self.def_type(at, *i)?.clone();
                ValType::Borrow(self.handle_ref(at, &dt)?)
            }
        })
    }

    fn elab_func_def(&mut self, at: ScopeId, fd: &'a FuncDef<'a>) -> Result<FuncType<'a>, ErrorKind<'a>> {
        Ok(FuncType {
            params: self.elab_io_def(at, &fd.params)?,
            results: self.elab_io_def(at, &fd.results)?,
        })
    }

    fn elab_io_def(&mut self, at: ScopeId, io: &'a IoDef<'a>) -> Result<TypeList<'a>, ErrorKind<'a>> {
        Ok(match io {
            IoDef::Anon(vr) => TypeList::Anon(self.elab_val_ref(at, vr)?),
            IoDef::Named(nrs) => TypeList::Named(
                nrs.iter()
                    .map(|nr| Ok((nr.name, self.elab_val_ref(at, &nr.ty)?)))
                    .collect::<Result<_, ErrorKind<'a>>>()?,
            ),
        })
    }

    /// A type index that must denote a func type, possibly through a
    /// transparent variable.
    fn func_def_type(&self, at: ScopeId, index: u32) -> Result<FuncType<'a>, ErrorKind<'a>> {
        let dt = self.def_type(at, index)?;
        match dt {
            DefType::Func(ft) => Ok(ft.clone()),
            DefType::Var(tv) => match self.resolve_tyvar(at, *tv) {
                Resolution::Definite(DefType::Func(ft)) => Ok(ft),
                _ => Err(ErrorKind::SortMismatch {
                    expected: Sort::Func,
                    found: def_sort(dt),
                }),
            },
            _ => Err(ErrorKind::SortMismatch {
                expected: Sort::Func,
                found: def_sort(dt),
            }),
        }
    }

    fn instance_def_type(&self, at: ScopeId, index: u32) -> Result<InstanceType<'a>, ErrorKind<'a>> {
        let dt = self.def_type(at, index)?;
        match dt {
            DefType::Instance(it) => Ok(it.clone()),
            DefType::Var(tv) => match self.resolve_tyvar(at, *tv) {
                Resolution::Definite(DefType::Instance(it)) => Ok(it),
                _ => Err(ErrorKind::SortMismatch {
                    expected: Sort::Instance,
                    found: def_sort(dt),
                }),
            },
            _ => Err(ErrorKind::SortMismatch {
                expected: Sort::Instance,
                found: def_sort(dt),
            }),
        }
    }

    fn component_def_type(
        &self,
        at: ScopeId,
        index: u32,
    ) -> Result<ComponentType<'a>, ErrorKind<'a>> {
        let dt = self.def_type(at, index)?;
        match dt {
            DefType::Component(ct) => Ok(ct.clone()),
            DefType::Var(tv) => match self.resolve_tyvar(at, *tv) {
                Resolution::Definite(DefType::Component(ct)) => Ok(ct),
                _ => Err(ErrorKind::SortMismatch {
                    expected: Sort::Component,
                    found: def_sort(dt),
                }),
            },
            _ => Err(ErrorKind::SortMismatch {
                expected: Sort::Component,
                found: def_sort(dt),
            }),
        }
    }

    /// Fold a finished instance-type body's existential entries back
    /// into a binder frame over its exports. Bound `j` may only name
    /// entries before it, so it closes under a `j`-deep frame.
    fn finish_instance(
        &mut self,
        at: ScopeId,
        exports: Vec<ExternDecl<'a>>,
    ) -> Result<InstanceType<'a>, ErrorKind<'a>> {
        let entries = self.at(at).evars.clone();
        let n = entries.len() as u32;
        let mut evars = Vec::with_capacity(entries.len());
        for (j, e) in entries.iter().enumerate() {
            let sub = Subst {
                evars: vec![close_row(j as u32)],
                on_evar: FreeAction::Promote,
                on_uvar: FreeAction::Promote,
                ..Subst::identity()
            };
            evars.push(sub.type_bound(&e.bound)?);
        }
        let sub = Subst {
            evars: vec![close_row(n)],
            on_evar: FreeAction::Promote,
            on_uvar: FreeAction::Promote,
            ..Subst::identity()
        };
        let exports = sub.extern_decls(&exports)?;
        let it = InstanceType { evars, exports };
        let wf_at = self.wf_parent(at)?;
        self.wf_instance_type(wf_at, &it, DefPos::internal())?;
        Ok(it)
    }

    fn finish_component(
        &mut self,
        at: ScopeId,
        out: BodyOut<'a>,
        close_index: u32,
    ) -> Result<ComponentType<'a>, Error<'a>> {
        let close = Loc {
            depth: self.depth_of(at),
            index: close_index,
        };
        let ct = self.close_component(at, out).map_err(|e| e.at(close))?;
        let wf_at = self.wf_parent(at).map_err(|e| e.at(close))?;
        self.wf_component_type(wf_at, &ct, DefPos::internal())
            .map_err(|e| e.at(close))?;
        Ok(ct)
    }

    /// Close a component body in three passes.
    ///
    /// 1. Imports must not name local existentials: an import's
    ///    meaning cannot depend on a type this component made up.
    /// 2. Exports close existentially over every local evar plus
    ///    every instantiation-born (non-imported) universal the
    ///    exports still name, the latter re-abstracted into the same
    ///    frame in slot order.
    /// 3. Both sides then close universally over the imported
    ///    universals, compactly renumbered; a non-imported universal
    ///    surviving on the import side at this point has leaked out
    ///    of its instantiation.
    fn close_component(
        &mut self,
        at: ScopeId,
        out: BodyOut<'a>,
    ) -> Result<ComponentType<'a>, ErrorKind<'a>> {
        let BodyOut { imports, exports } = out;
        let evar_entries = self.at(at).evars.clone();
        let uvar_entries = self.at(at).uvars.clone();
        let ne = evar_entries.len() as u32;

        let sub = Subst {
            on_evar: FreeAction::Promote,
            ..Subst::identity()
        };
        let imports: Vec<ExternDecl<'a>> = imports
            .iter()
            .map(|ed| sub.extern_decl(ed))
            .collect::<Result<_, _>>()?;

        let mut named = BTreeSet::new();
        note_uvar_refs_decls(&exports, &mut named);
        for e in &evar_entries {
            note_uvar_refs_bound(&e.bound, &mut named);
        }
        let mut reab_set: BTreeSet<u32> = BTreeSet::new();
        let mut queue: Vec<u32> = named.into_iter().collect();
        while let Some(i) = queue.pop() {
            let entry = uvar_entries
                .get(i as usize)
                .ok_or(ErrorKind::UvarEscapes { index: i })?;
            if entry.imported || !reab_set.insert(i) {
                continue;
            }
            let mut more = BTreeSet::new();
            note_uvar_refs_bound(&entry.bound, &mut more);
            queue.extend(more);
        }
        let reab: Vec<u32> = reab_set.into_iter().collect();

        let m = ne + reab.len() as u32;
        let rank = |slot: u32| reab.iter().position(|s| *s == slot);
        let evar_row: Vec<Option<DefType<'a>>> = (0..ne)
            .map(|i| Some(DefType::Var(Tyvar::Bound(m - 1 - i))))
            .collect();
        let uvar_row: Vec<Option<DefType<'a>>> = (0..uvar_entries.len() as u32)
            .map(|i| rank(i).map(|r| DefType::Var(Tyvar::Bound(m - 1 - (ne + r as u32)))))
            .collect();
        let sub = Subst {
            evars: vec![evar_row],
            uvars: vec![uvar_row],
            on_evar: FreeAction::Promote,
            on_uvar: FreeAction::Keep,
            ..Subst::identity()
        };
        let closed_exports = sub.extern_decls(&exports)?;

        let mut evars = Vec::with_capacity(m as usize);
        for p in 0..m {
            let src = if p < ne {
                evar_entries[p as usize].bound.clone()
            } else {
                uvar_entries[reab[(p - ne) as usize] as usize].bound.clone()
            };
            let evar_row: Vec<Option<DefType<'a>>> = (0..ne.min(p))
                .map(|i| Some(DefType::Var(Tyvar::Bound(p - 1 - i))))
                .collect();
            let uvar_row: Vec<Option<DefType<'a>>> = (0..uvar_entries.len() as u32)
                .map(|i| match rank(i) {
                    Some(r) if ne + (r as u32) < p => {
                        Some(DefType::Var(Tyvar::Bound(p - 1 - (ne + r as u32))))
                    }
                    _ => None,
                })
                .collect();
            let sub = Subst {
                evars: vec![evar_row],
                uvars: vec![uvar_row],
                on_evar: FreeAction::Promote,
                on_uvar: FreeAction::Keep,
                ..Subst::identity()
            };
            evars.push(sub.type_bound(&src)?);
        }
        let inst = InstanceType {
            evars,
            exports: closed_exports,
        };

        let ni = uvar_entries.iter().filter(|u| u.imported).count();
        let uvar_row: Vec<Option<DefType<'a>>> = (0..uvar_entries.len())
            .map(|i| {
                if uvar_entries[i].imported {
                    let after = uvar_entries[i..].iter().filter(|u| u.imported).count() as u32;
                    Some(DefType::Var(Tyvar::Bound(after - 1)))
                } else {
                    None
                }
            })
            .collect();
        let sub = Subst {
            uvars: vec![uvar_row],
            on_evar: FreeAction::Keep,
            on_uvar: FreeAction::Promote,
            ..Subst::identity()
        };
        let imports: Vec<ExternDecl<'a>> = imports
            .iter()
            .map(|ed| sub.extern_decl(ed))
            .collect::<Result<_, _>>()?;
        let inst = sub.instance_type(&inst)?;

        let mut uvars = Vec::with_capacity(ni);
        for (i, u) in uvar_entries.iter().enumerate() {
            if !u.imported {
                continue;
            }
            let row: Vec<Option<DefType<'a>>> = (0..i)
                .map(|s| {
                    if uvar_entries[s].imported {
                        let idx =
                            uvar_entries[s..i].iter().filter(|v| v.imported).count() as u32 - 1;
                        Some(DefType::Var(Tyvar::Bound(idx)))
                    } else {
                        None
                    }
                })
                .collect();
            let sub = Subst {
                uvars: vec![row],
                on_evar: FreeAction::Promote,
                on_uvar: FreeAction::Promote,
                ..Subst::identity()
            };
            uvars.push(sub.type_bound(&u.bound)?);
        }
        Ok(ComponentType {
            uvars,
            imports,
            exports: inst,
        })
    }

    fn wf_parent(&mut self, at: ScopeId) -> Result<ScopeId, ErrorKind<'a>> {
        match self.at(at).parent {
            Some(p) => Ok(p),
            // The root has no enclosing scope; check against an empty
            // stand-in.
            None => self.push_scope(None, false),
        }
    }
}

fn def_sort(dt: &DefType<'_>) -> Sort {
    match dt {
        DefType::Var(_) | DefType::Resource(_) | DefType::Val(_) => Sort::Type,
        DefType::Func(_) => Sort::Func,
        DefType::Instance(_) => Sort::Instance,
        DefType::Component(_) => Sort::Component,
    }
}

// Labels for the per-declarator trace events.

fn decl_kind(d: &Decl<'_>) -> &'static str {
    match d {
        Decl::CoreModule(_) => "core module",
        Decl::Type(_) => "type",
        Decl::Alias(_) => "alias",
        Decl::Import { .. } => "import",
        Decl::Export { .. } => "export",
        Decl::Instance(_) => "instance",
        Decl::Component(_) => "component",
        Decl::Canon(_) => "canon",
        Decl::Start(_) => "start",
    }
}

fn instance_decl_kind(d: &InstanceTypeDecl<'_>) -> &'static str {
    match d {
        InstanceTypeDecl::CoreModule(_) => "core module",
        InstanceTypeDecl::Type(_) => "type",
        InstanceTypeDecl::Alias(_) => "alias",
        InstanceTypeDecl::Export { .. } => "export",
    }
}

fn component_decl_kind(d: &ComponentTypeDecl<'_>) -> &'static str {
    match d {
        ComponentTypeDecl::CoreModule(_) => "core module",
        ComponentTypeDecl::Type(_) => "type",
        ComponentTypeDecl::Alias(_) => "alias",
        ComponentTypeDecl::Import { .. } => "import",
        ComponentTypeDecl::Export { .. } => "export",
    }
}

fn prim_val(p: Prim) -> ValType<'static> {
    use crate::itypes::{FloatSize, IntSize};
    match p {
        Prim::Bool => ValType::Bool,
        Prim::S8 => ValType::S(IntSize::I8),
        Prim::S16 => ValType::S(IntSize::I16),
        Prim::S32 => ValType::S(IntSize::I32),
        Prim::S64 => ValType::S(IntSize::I64),
        Prim::U8 => ValType::U(IntSize::I8),
        Prim::U16 => ValType::U(IntSize::I16),
        Prim::U32 => ValType::U(IntSize::I32),
        Prim::U64 => ValType::U(IntSize::I64),
        Prim::F32 => ValType::F(FloatSize::F32),
        Prim::F64 => ValType::F(FloatSize::F64),
        Prim::Char => ValType::Char,
        Prim::String => ValType::String,
    }
}

/// Levels for closing a binder frame: slot `i`, read where `avail`
/// binders are in scope, becomes de Bruijn index `avail - 1 - i`.
fn close_row(avail: u32) -> Vec<Option<DefType<'static>>> {
    (0..avail)
        .map(|i| Some(DefType::Var(Tyvar::Bound(avail - 1 - i))))
        .collect()
}

// Occurrence scan for universals of the scope being closed. Free
// depths are scope-relative, not frame-relative, so depth 0 means
// "this scope" at any nesting depth and no frame bookkeeping is
// needed.

fn note_uvar_refs_tyvar(tv: Tyvar, into: &mut BTreeSet<u32>) {
    if let Tyvar::Free(FreeVar::Uvar(0, i)) = tv {
        into.insert(i);
    }
}

fn note_uvar_refs_rref(rr: ResourceRef, into: &mut BTreeSet<u32>) {
    if let ResourceRef::Var(tv) = rr {
        note_uvar_refs_tyvar(tv, into);
    }
}

fn note_uvar_refs_val(vt: &ValType<'_>, into: &mut BTreeSet<u32>) {
    match vt {
        ValType::Bool
        | ValType::S(_)
        | ValType::U(_)
        | ValType::F(_)
        | ValType::Char
        | ValType::String
        | ValType::Flags(_)
        | ValType::Enum(_) => {}
        ValType::List(t) | ValType::Option(t) => note_uvar_refs_val(t, into),
        ValType::Record(fs) => fs.iter().for_each(|f| note_uvar_refs_val(&f.ty, into)),
        ValType::Tuple(ts) => ts.iter().for_each(|t| note_uvar_refs_val(t, into)),
        ValType::Variant(cs) => cs
            .iter()
            .filter_map(|c| c.ty.as_ref())
            .for_each(|t| note_uvar_refs_val(t, into)),
        ValType::Result(ok, err) => {
            if let Some(t) = ok.as_ref() {
                note_uvar_refs_val(t, into);
            }
            if let Some(t) = err.as_ref() {
                note_uvar_refs_val(t, into);
            }
        }
        ValType::Own(rr) | ValType::Borrow(rr) => note_uvar_refs_rref(*rr, into),
    }
}

fn note_uvar_refs_func(ft: &FuncType<'_>, into: &mut BTreeSet<u32>) {
    ft.params.types().for_each(|t| note_uvar_refs_val(t, into));
    ft.results.types().for_each(|t| note_uvar_refs_val(t, into));
}

fn note_uvar_refs_bound(tb: &TypeBound<'_>, into: &mut BTreeSet<u32>) {
    match tb {
        TypeBound::Eq(dt) => note_uvar_refs_def(dt, into),
        TypeBound::SubResource => {}
    }
}

fn note_uvar_refs_def(dt: &DefType<'_>, into: &mut BTreeSet<u32>) {
    match dt {
        DefType::Var(tv) => note_uvar_refs_tyvar(*tv, into),
        DefType::Resource(_) => {}
        DefType::Val(vt) => note_uvar_refs_val(vt, into),
        DefType::Func(ft) => note_uvar_refs_func(ft, into),
        DefType::Instance(it) => {
            it.evars.iter().for_each(|b| note_uvar_refs_bound(b, into));
            note_uvar_refs_decls(&it.exports, into);
        }
        DefType::Component(ct) => {
            ct.uvars.iter().for_each(|b| note_uvar_refs_bound(b, into));
            note_uvar_refs_decls(&ct.imports, into);
            ct.exports
                .evars
                .iter()
                .for_each(|b| note_uvar_refs_bound(b, into));
            note_uvar_refs_decls(&ct.exports.exports, into);
        }
    }
}

fn note_uvar_refs_desc(desc: &ExternDesc<'_>, into: &mut BTreeSet<u32>) {
    match desc {
        ExternDesc::CoreModule(_) => {}
        ExternDesc::Func(ft) => note_uvar_refs_func(ft, into),
        ExternDesc::Value(vt) => note_uvar_refs_val(vt, into),
        ExternDesc::Type(dt) => note_uvar_refs_def(dt, into),
        ExternDesc::Instance(eds) => note_uvar_refs_decls(eds, into),
        ExternDesc::Component(ct) => {
            note_uvar_refs_def(&DefType::Component(ct.clone()), into)
        }
    }
}

fn note_uvar_refs_decls(eds: &[ExternDecl<'_>], into: &mut BTreeSet<u32>) {
    eds.iter().for_each(|ed| note_uvar_refs_desc(&ed.desc, into));
}
