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

//! Capture-avoiding substitution.
//!
//! One substitution value carries three variable channels: bound
//! (by de Bruijn level), existential and universal (by depth and
//! index), plus a per-class fallback for free variables nothing
//! covers. Opening a binder frame, closing a scope, pushing a type
//! one scope deeper, and forcing concreteness across a boundary are
//! all just different channel/fallback configurations of the same
//! walker.
//!
//! Capture avoidance: recursing under a binder frame of `n` variables
//! raises the walker's level cutoff by `n`, so the frame's own bound
//! variables pass through untouched, queries into the bound channel
//! are re-based, and anything a channel emits is level-shifted back
//! up by the cutoff. Free-variable depths are scope-relative, not
//! frame-relative, so they are unaffected by binder entry.

use crate::error::ErrorKind;
use crate::itypes::{
    ComponentType, DefType, ExternDecl, ExternDesc, FreeVar, FuncType, InstanceType, RecordField,
    ResourceRef, TypeBound, TypeList, Tyvar, ValType, VariantCase,
};
use crate::scope::{ScopeArena, ScopeId};

/// What to do with a free variable no channel covers.
#[derive(Clone, Copy)]
pub enum FreeAction<'c, 'a> {
    /// Leave it as it is.
    Keep,
    /// The type is moving this many scope links deeper; depth goes up
    /// accordingly.
    Deepen(u32),
    /// The scope it counted from is going away; depth goes down by
    /// one, and a depth-zero variable has nowhere to go: it is a
    /// local type escaping its scope.
    Promote,
    /// The type is crossing an outer boundary: the variable must
    /// resolve to something fully concrete in the scope it was
    /// phrased in.
    Require(&'c ScopeArena<'a>, ScopeId),
}

/// The bound-variable channel: either a per-level mapping or a
/// uniform upward shift of every level past the cutoff.
#[derive(Clone, Default)]
pub enum BoundChannel<'a> {
    #[default]
    Empty,
    Map(Vec<Option<DefType<'a>>>),
    Shift(u32),
}

pub struct Subst<'c, 'a> {
    pub bound: BoundChannel<'a>,
    /// `evars[depth][index]`; a `None` entry falls through to
    /// `on_evar`, which is how a closing distinguishes "renumber
    /// this one" from "this one may not appear".
    pub evars: Vec<Vec<Option<DefType<'a>>>>,
    pub uvars: Vec<Vec<Option<DefType<'a>>>>,
    pub on_evar: FreeAction<'c, 'a>,
    pub on_uvar: FreeAction<'c, 'a>,
}

fn free(universal: bool, o: u32, i: u32) -> DefType<'static> {
    let fv = if universal {
        FreeVar::Uvar(o, i)
    } else {
        FreeVar::Evar(o, i)
    };
    DefType::Var(Tyvar::Free(fv))
}

impl<'c, 'a> Subst<'c, 'a> {
    pub fn identity() -> Self {
        Subst {
            bound: BoundChannel::Empty,
            evars: vec![],
            uvars: vec![],
            on_evar: FreeAction::Keep,
            on_uvar: FreeAction::Keep,
        }
    }

    /// Replace a frame of `count` bound variables with free ones
    /// appended to a scope's variable list starting at `base`.
    /// Bound indices count inside-out and scope lists grow
    /// outside-in, so `Bound(i)` maps to slot `base + count - i - 1`.
    pub fn opening(universal: bool, base: u32, count: u32) -> Self {
        let mut levels = Vec::with_capacity(count as usize);
        for i in 0..count {
            levels.push(Some(free(universal, 0, base + count - i - 1)));
        }
        Subst {
            bound: BoundChannel::Map(levels),
            ..Subst::identity()
        }
    }

    /// Like [`Subst::opening`], but for opening into a freshly pushed
    /// child scope: free variables that referred to the old current
    /// scope now live one link further away.
    pub fn opening_deeper(universal: bool, base: u32, count: u32) -> Self {
        Subst {
            on_evar: FreeAction::Deepen(1),
            on_uvar: FreeAction::Deepen(1),
            ..Subst::opening(universal, base, count)
        }
    }

    /// Push a type one scope deeper without touching any binder.
    pub fn deepen() -> Self {
        Subst::shift(1)
    }

    /// Re-phrase a type read from `by` scope links above the scope it
    /// is about to be used in: free depths go up by `by`, binders are
    /// untouched.
    pub fn shift(by: u32) -> Self {
        Subst {
            on_evar: FreeAction::Deepen(by),
            on_uvar: FreeAction::Deepen(by),
            ..Subst::identity()
        }
    }

    /// Carry a type across an outer boundary: every free variable
    /// must resolve concretely in `at`, the scope the type was
    /// phrased in.
    pub fn concretize(arena: &'c ScopeArena<'a>, at: ScopeId) -> Self {
        Subst {
            on_evar: FreeAction::Require(arena, at),
            on_uvar: FreeAction::Require(arena, at),
            ..Subst::identity()
        }
    }

    /// Substitute a binder frame's bound variables with concrete
    /// types (discharging a quantifier with matching's bindings).
    /// `bindings` is in scope-list order, outside-in, so it is
    /// reversed into level order here.
    pub fn fill_bound(bindings: &[DefType<'a>]) -> Self {
        Subst {
            bound: BoundChannel::Map(bindings.iter().rev().cloned().map(Some).collect()),
            ..Subst::identity()
        }
    }

    fn bvar(&self, level: u32, frames: u32) -> Result<Option<DefType<'a>>, ErrorKind<'a>> {
        if level < frames {
            return Ok(None);
        }
        let l = level - frames;
        let hit = match &self.bound {
            BoundChannel::Empty => None,
            BoundChannel::Map(levels) => levels.get(l as usize).cloned().flatten(),
            BoundChannel::Shift(by) => Some(DefType::Var(Tyvar::Bound(l + by))),
        };
        match hit {
            Some(dt) => Ok(Some(shift_out(dt, frames)?)),
            None => Ok(None),
        }
    }

    fn fvar(&self, fv: FreeVar, frames: u32) -> Result<Option<DefType<'a>>, ErrorKind<'a>> {
        let (universal, o, i, channel, action) = match fv {
            FreeVar::Evar(o, i) => (false, o, i, &self.evars, self.on_evar),
            FreeVar::Uvar(o, i) => (true, o, i, &self.uvars, self.on_uvar),
        };
        let hit = channel
            .get(o as usize)
            .and_then(|frame| frame.get(i as usize).cloned().flatten());
        if let Some(dt) = hit {
            return Ok(Some(shift_out(dt, frames)?));
        }
        match action {
            FreeAction::Keep => Ok(None),
            FreeAction::Deepen(by) => Ok(Some(free(universal, o + by, i))),
            FreeAction::Promote => {
                if o > 0 {
                    Ok(Some(free(universal, o - 1, i)))
                } else if universal {
                    Err(ErrorKind::UvarEscapes { index: i })
                } else {
                    Err(ErrorKind::EvarEscapes { index: i })
                }
            }
            FreeAction::Require(arena, at) => {
                use crate::resolve::Resolution;
                let tv = Tyvar::Free(fv);
                match arena.resolve_tyvar(at, tv) {
                    // What the variable resolves to was phrased for
                    // the same scope, so it gets the same treatment.
                    Resolution::Definite(dt) => Ok(Some(shift_out(self.def_type(&dt)?, frames)?)),
                    _ => Err(ErrorKind::AbstractAcrossBoundary(tv)),
                }
            }
        }
    }

    fn var(&self, tv: Tyvar, frames: u32) -> Result<Option<DefType<'a>>, ErrorKind<'a>> {
        match tv {
            Tyvar::Bound(i) => self.bvar(i, frames),
            Tyvar::Free(fv) => self.fvar(fv, frames),
        }
    }

    // Public entry points apply at the outermost frame.

    pub fn def_type(&self, dt: &DefType<'a>) -> Result<DefType<'a>, ErrorKind<'a>> {
        self.def_type_at(dt, 0)
    }

    pub fn val_type(&self, vt: &ValType<'a>) -> Result<ValType<'a>, ErrorKind<'a>> {
        self.val_type_at(vt, 0)
    }

    pub fn func_type(&self, ft: &FuncType<'a>) -> Result<FuncType<'a>, ErrorKind<'a>> {
        self.func_type_at(ft, 0)
    }

    pub fn type_bound(&self, tb: &TypeBound<'a>) -> Result<TypeBound<'a>, ErrorKind<'a>> {
        self.type_bound_at(tb, 0)
    }

    pub fn extern_desc(&self, desc: &ExternDesc<'a>) -> Result<ExternDesc<'a>, ErrorKind<'a>> {
        self.extern_desc_at(desc, 0)
    }

    pub fn extern_decl(&self, ed: &ExternDecl<'a>) -> Result<ExternDecl<'a>, ErrorKind<'a>> {
        self.extern_decl_at(ed, 0)
    }

    pub fn extern_decls(&self, eds: &[ExternDecl<'a>]) -> Result<Vec<ExternDecl<'a>>, ErrorKind<'a>> {
        eds.iter().map(|ed| self.extern_decl_at(ed, 0)).collect()
    }

    pub fn instance_type(&self, it: &InstanceType<'a>) -> Result<InstanceType<'a>, ErrorKind<'a>> {
        self.instance_type_at(it, 0)
    }

    pub fn component_type(
        &self,
        ct: &ComponentType<'a>,
    ) -> Result<ComponentType<'a>, ErrorKind<'a>> {
        self.component_type_at(ct, 0)
    }

    fn def_type_at(&self, dt: &DefType<'a>, frames: u32) -> Result<DefType<'a>, ErrorKind<'a>> {
        Ok(match dt {
            DefType::Var(tv) => match self.var(*tv, frames)? {
                Some(dt) => dt,
                None => DefType::Var(*tv),
            },
            DefType::Resource(id) => DefType::Resource(*id),
            DefType::Val(vt) => DefType::Val(self.val_type_at(vt, frames)?),
            DefType::Func(ft) => DefType::Func(self.func_type_at(ft, frames)?),
            DefType::Instance(it) => DefType::Instance(self.instance_type_at(it, frames)?),
            DefType::Component(ct) => DefType::Component(self.component_type_at(ct, frames)?),
        })
    }

    fn resource_ref_at(
        &self,
        rr: &ResourceRef,
        frames: u32,
    ) -> Result<ResourceRef, ErrorKind<'a>> {
        match rr {
            ResourceRef::Id(id) => Ok(ResourceRef::Id(*id)),
            ResourceRef::Var(tv) => match self.var(*tv, frames)? {
                None => Ok(ResourceRef::Var(*tv)),
                Some(DefType::Var(tv)) => Ok(ResourceRef::Var(tv)),
                Some(DefType::Resource(id)) => Ok(ResourceRef::Id(id)),
                Some(_) => {
                    panic!("internal invariant violation: handle variable is not a resource")
                }
            },
        }
    }

    fn val_type_at(&self, vt: &ValType<'a>, frames: u32) -> Result<ValType<'a>, ErrorKind<'a>> {
        Ok(match vt {
            ValType::Bool => ValType::Bool,
            ValType::S(w) => ValType::S(*w),
            ValType::U(w) => ValType::U(*w),
            ValType::F(w) => ValType::F(*w),
            ValType::Char => ValType::Char,
            ValType::String => ValType::String,
            ValType::List(vt) => ValType::List(Box::new(self.val_type_at(vt, frames)?)),
            ValType::Record(rfs) => ValType::Record(
                rfs.iter()
                    .map(|rf| {
                        Ok(RecordField {
                            name: rf.name,
                            ty: self.val_type_at(&rf.ty, frames)?,
                        })
                    })
                    .collect::<Result<_, ErrorKind<'a>>>()?,
            ),
            ValType::Tuple(vts) => ValType::Tuple(
                vts.iter()
                    .map(|vt| self.val_type_at(vt, frames))
                    .collect::<Result<_, _>>()?,
            ),
            ValType::Flags(ns) => ValType::Flags(ns.clone()),
            ValType::Enum(ns) => ValType::Enum(ns.clone()),
            ValType::Variant(vcs) => ValType::Variant(
                vcs.iter()
                    .map(|vc| {
                        Ok(VariantCase {
                            name: vc.name,
                            ty: self.val_type_option_at(&vc.ty, frames)?,
                            defaults: vc.defaults,
                        })
                    })
                    .collect::<Result<_, ErrorKind<'a>>>()?,
            ),
            ValType::Option(vt) => ValType::Option(Box::new(self.val_type_at(vt, frames)?)),
            ValType::Result(ok, err) => ValType::Result(
                Box::new(self.val_type_option_at(ok, frames)?),
                Box::new(self.val_type_option_at(err, frames)?),
            ),
            ValType::Own(rr) => ValType::Own(self.resource_ref_at(rr, frames)?),
            ValType::Borrow(rr) => ValType::Borrow(self.resource_ref_at(rr, frames)?),
        })
    }

    fn val_type_option_at(
        &self,
        vt: &Option<ValType<'a>>,
        frames: u32,
    ) -> Result<Option<ValType<'a>>, ErrorKind<'a>> {
        vt.as_ref().map(|vt| self.val_type_at(vt, frames)).transpose()
    }

    fn type_list_at(&self, tl: &TypeList<'a>, frames: u32) -> Result<TypeList<'a>, ErrorKind<'a>> {
        Ok(match tl {
            TypeList::Anon(vt) => TypeList::Anon(self.val_type_at(vt, frames)?),
            TypeList::Named(tys) => TypeList::Named(
                tys.iter()
                    .map(|(n, vt)| Ok((*n, self.val_type_at(vt, frames)?)))
                    .collect::<Result<_, ErrorKind<'a>>>()?,
            ),
        })
    }

    fn func_type_at(&self, ft: &FuncType<'a>, frames: u32) -> Result<FuncType<'a>, ErrorKind<'a>> {
        Ok(FuncType {
            params: self.type_list_at(&ft.params, frames)?,
            results: self.type_list_at(&ft.results, frames)?,
        })
    }

    fn type_bound_at(
        &self,
        tb: &TypeBound<'a>,
        frames: u32,
    ) -> Result<TypeBound<'a>, ErrorKind<'a>> {
        Ok(match tb {
            TypeBound::Eq(dt) => TypeBound::Eq(self.def_type_at(dt, frames)?),
            TypeBound::SubResource => TypeBound::SubResource,
        })
    }

    fn extern_desc_at(
        &self,
        desc: &ExternDesc<'a>,
        frames: u32,
    ) -> Result<ExternDesc<'a>, ErrorKind<'a>> {
        Ok(match desc {
            ExternDesc::CoreModule(cmt) => ExternDesc::CoreModule(cmt.clone()),
            ExternDesc::Func(ft) => ExternDesc::Func(self.func_type_at(ft, frames)?),
            ExternDesc::Value(vt) => ExternDesc::Value(self.val_type_at(vt, frames)?),
            ExternDesc::Type(dt) => ExternDesc::Type(self.def_type_at(dt, frames)?),
            // A bare export list shares the enclosing frame.
            ExternDesc::Instance(eds) => ExternDesc::Instance(
                eds.iter()
                    .map(|ed| self.extern_decl_at(ed, frames))
                    .collect::<Result<_, _>>()?,
            ),
            ExternDesc::Component(ct) => ExternDesc::Component(self.component_type_at(ct, frames)?),
        })
    }

    fn extern_decl_at(
        &self,
        ed: &ExternDecl<'a>,
        frames: u32,
    ) -> Result<ExternDecl<'a>, ErrorKind<'a>> {
        Ok(ExternDecl {
            name: ed.name,
            desc: self.extern_desc_at(&ed.desc, frames)?,
        })
    }

    /// Quantifier bounds telescope: the bound of variable `j` may
    /// refer to variables `0..j`, so it is processed under `j`
    /// binders, and the body under all of them.
    fn instance_type_at(
        &self,
        it: &InstanceType<'a>,
        frames: u32,
    ) -> Result<InstanceType<'a>, ErrorKind<'a>> {
        let evars = it
            .evars
            .iter()
            .enumerate()
            .map(|(j, tb)| self.type_bound_at(tb, frames + j as u32))
            .collect::<Result<Vec<_>, _>>()?;
        let inner = frames + it.evars.len() as u32;
        let exports = it
            .exports
            .iter()
            .map(|ed| self.extern_decl_at(ed, inner))
            .collect::<Result<_, _>>()?;
        Ok(InstanceType { evars, exports })
    }

    fn component_type_at(
        &self,
        ct: &ComponentType<'a>,
        frames: u32,
    ) -> Result<ComponentType<'a>, ErrorKind<'a>> {
        let uvars = ct
            .uvars
            .iter()
            .enumerate()
            .map(|(j, tb)| self.type_bound_at(tb, frames + j as u32))
            .collect::<Result<Vec<_>, _>>()?;
        let inner = frames + ct.uvars.len() as u32;
        let imports = ct
            .imports
            .iter()
            .map(|ed| self.extern_decl_at(ed, inner))
            .collect::<Result<_, _>>()?;
        let exports = self.instance_type_at(&ct.exports, inner)?;
        Ok(ComponentType {
            uvars,
            imports,
            exports,
        })
    }
}

/// Shift every bound level that escapes `dt` up by `frames`, so a
/// channel output phrased at the substitution's own frame stays
/// correct under the binders the walker has entered.
fn shift_out<'a>(dt: DefType<'a>, frames: u32) -> Result<DefType<'a>, ErrorKind<'a>> {
    if frames == 0 {
        return Ok(dt);
    }
    let sub = Subst {
        bound: BoundChannel::Shift(frames),
        ..Subst::identity()
    };
    sub.def_type(&dt)
}
