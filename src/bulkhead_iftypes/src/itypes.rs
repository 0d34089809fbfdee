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

//! Semantic interface types.
//!
//! These are the elaborated forms that the rest of the crate computes
//! with: structural value types, function types, and the quantified
//! instance/component types. They borrow all names from the input
//! declaration list, so a full elaboration allocates very little.

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum IntSize {
    I8,
    I16,
    I32,
    I64,
}

impl IntSize {
    pub fn bits(self) -> u8 {
        match self {
            IntSize::I8 => 8,
            IntSize::I16 => 16,
            IntSize::I32 => 32,
            IntSize::I64 => 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum FloatSize {
    F32,
    F64,
}

impl FloatSize {
    pub fn bits(self) -> u8 {
        match self {
            FloatSize::F32 => 32,
            FloatSize::F64 => 64,
        }
    }
}

/// A generative resource identity. Two resource types are the same
/// type exactly when their identities are equal; shape plays no part.
/// Identities are handed out by [`crate::scope::ScopeArena`] and are
/// never reused within one validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceId {
    pub(crate) id: u32,
}

/// A free type variable, pointing `depth` scopes up the parent chain
/// and then at slot `index` of that scope's universal or existential
/// list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeVar {
    Uvar(u32, u32),
    Evar(u32, u32),
}

impl FreeVar {
    pub fn depth(self) -> u32 {
        match self {
            FreeVar::Uvar(o, _) | FreeVar::Evar(o, _) => o,
        }
    }
}

/// A type variable: either bound within the binder frame currently
/// under construction (a de Bruijn level into that frame) or free,
/// addressed through the scope chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tyvar {
    Bound(u32),
    Free(FreeVar),
}

/// The shapes that can denote a resource in a handle position: a
/// variable (which must resolve to something resource-like) or a
/// concrete identity. Keeping this separate from [`DefType`] makes
/// "own/borrow of a non-resource" unrepresentable after elaboration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceRef {
    Var(Tyvar),
    Id(ResourceId),
}

#[derive(Debug, Clone)]
pub struct RecordField<'a> {
    pub name: &'a str,
    pub ty: ValType<'a>,
}

/// A variant case. `defaults`, when present, is the position of a
/// sibling case whose payload this case's absence is read as.
#[derive(Debug, Clone)]
pub struct VariantCase<'a> {
    pub name: &'a str,
    pub ty: Option<ValType<'a>>,
    pub defaults: Option<u32>,
}

/// Structural value types.
#[derive(Debug, Clone)]
pub enum ValType<'a> {
    Bool,
    S(IntSize),
    U(IntSize),
    F(FloatSize),
    Char,
    String,
    List(Box<ValType<'a>>),
    Record(Vec<RecordField<'a>>),
    Tuple(Vec<ValType<'a>>),
    Flags(Vec<&'a str>),
    Variant(Vec<VariantCase<'a>>),
    Enum(Vec<&'a str>),
    Option(Box<ValType<'a>>),
    Result(Box<Option<ValType<'a>>>, Box<Option<ValType<'a>>>),
    Own(ResourceRef),
    Borrow(ResourceRef),
}

/// One side of a function type: a single unnamed type or a named
/// sequence. The two shapes never subtype each other.
#[derive(Debug, Clone)]
pub enum TypeList<'a> {
    Anon(ValType<'a>),
    Named(Vec<(&'a str, ValType<'a>)>),
}

impl<'a> TypeList<'a> {
    pub fn len(&self) -> usize {
        match self {
            TypeList::Anon(_) => 1,
            TypeList::Named(tys) => tys.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The types in order, names stripped.
    pub fn types(&self) -> impl Iterator<Item = &ValType<'a>> {
        let (anon, named) = match self {
            TypeList::Anon(vt) => (Some(vt), [].iter()),
            TypeList::Named(tys) => (None, tys.iter()),
        };
        anon.into_iter().chain(named.map(|(_, vt)| vt))
    }
}

#[derive(Debug, Clone)]
pub struct FuncType<'a> {
    pub params: TypeList<'a>,
    pub results: TypeList<'a>,
}

/// What an abstract type is allowed to stand for.
#[derive(Debug, Clone)]
pub enum TypeBound<'a> {
    /// Transparent: structurally equal to the given type.
    Eq(DefType<'a>),
    /// Abstract: some resource type.
    SubResource,
}

/// The result of elaborating something instantiable:
/// `∃ evars. {exports}`.
#[derive(Debug, Clone)]
pub struct InstanceType<'a> {
    pub evars: Vec<TypeBound<'a>>,
    pub exports: Vec<ExternDecl<'a>>,
}

/// `∀ uvars. {imports} → ∃ …. {exports}`. Instantiating one of these
/// discharges the universals by matching the supplied arguments and
/// releases the export side's existentials as fresh abstract types.
#[derive(Debug, Clone)]
pub struct ComponentType<'a> {
    pub uvars: Vec<TypeBound<'a>>,
    pub imports: Vec<ExternDecl<'a>>,
    pub exports: InstanceType<'a>,
}

/// Any defined type: the payload of a type import/export and the
/// denotation of every entry in a scope's type space.
#[derive(Debug, Clone)]
pub enum DefType<'a> {
    Var(Tyvar),
    Resource(ResourceId),
    Val(ValType<'a>),
    Func(FuncType<'a>),
    Instance(InstanceType<'a>),
    Component(ComponentType<'a>),
}

/// A named import or export.
#[derive(Debug, Clone)]
pub struct ExternDecl<'a> {
    pub name: &'a str,
    pub desc: ExternDesc<'a>,
}

/// What an import/export is. An `Instance` desc is a bare export
/// list: inside a quantified type the enclosing binder frame already
/// owns its variables, so no fresh quantifier appears here. A full
/// [`InstanceType`] shows up only behind a `Type` desc.
#[derive(Debug, Clone)]
pub enum ExternDesc<'a> {
    CoreModule(CoreModuleType<'a>),
    Func(FuncType<'a>),
    Value(ValType<'a>),
    Type(DefType<'a>),
    Instance(Vec<ExternDecl<'a>>),
    Component(ComponentType<'a>),
}

impl<'a> ExternDesc<'a> {
    pub fn sort(&self) -> crate::decls::Sort {
        use crate::decls::Sort;
        match self {
            ExternDesc::CoreModule(_) => Sort::CoreModule,
            ExternDesc::Func(_) => Sort::Func,
            ExternDesc::Value(_) => Sort::Value,
            ExternDesc::Type(_) => Sort::Type,
            ExternDesc::Instance(_) => Sort::Instance,
            ExternDesc::Component(_) => Sort::Component,
        }
    }
}

// Core (module-level) types. These only ever appear as opaque-ish
// interface payloads: core linking itself is the embedder's problem.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreValType {
    I32,
    I64,
    F32,
    F64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreFuncType {
    pub params: Vec<CoreValType>,
    pub results: Vec<CoreValType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreRefType {
    Func,
    Extern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreLimits {
    pub min: u32,
    pub max: Option<u32>,
}

impl CoreLimits {
    /// Standard limits subtyping: at least as many guaranteed, no
    /// more than permitted.
    pub fn fits_within(&self, other: &CoreLimits) -> bool {
        self.min >= other.min
            && match (self.max, other.max) {
                (_, None) => true,
                (Some(m1), Some(m2)) => m1 <= m2,
                (None, Some(_)) => false,
            }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreTableType {
    pub element: CoreRefType,
    pub limits: CoreLimits,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreMemoryType {
    pub limits: CoreLimits,
    pub shared: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreGlobalType {
    pub ty: CoreValType,
    pub mutable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreExternDesc {
    Func(CoreFuncType),
    Table(CoreTableType),
    Memory(CoreMemoryType),
    Global(CoreGlobalType),
}

#[derive(Debug, Clone)]
pub struct CoreImport<'a> {
    pub module: &'a str,
    pub name: &'a str,
    pub desc: CoreExternDesc,
}

#[derive(Debug, Clone)]
pub struct CoreExport<'a> {
    pub name: &'a str,
    pub desc: CoreExternDesc,
}

/// A core module's interface: what it needs and what it provides.
#[derive(Debug, Clone)]
pub struct CoreModuleType<'a> {
    pub imports: Vec<CoreImport<'a>>,
    pub exports: Vec<CoreExport<'a>>,
}
