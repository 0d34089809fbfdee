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

//! The canonical declaration list.
//!
//! This is the elaborator's input: a desugared, name-resolved sequence
//! in which every reference is an explicit index into one of the index
//! spaces built by the preceding declarators. A front end (not this
//! crate) is responsible for producing it.

use crate::itypes::{CoreFuncType, CoreModuleType, CoreValType};

/// The index spaces a declarator can point into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    CoreModule,
    Func,
    Value,
    Type,
    Instance,
    Component,
}

/// Primitive value types, usable inline wherever a type reference is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prim {
    Bool,
    S8,
    S16,
    S32,
    S64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Char,
    String,
}

/// A reference to a value type: a primitive inline, or an index into
/// the type space (which must hold a value type after resolution).
#[derive(Debug, Clone, Copy)]
pub enum ValRef {
    Prim(Prim),
    Idx(u32),
}

#[derive(Debug, Clone)]
pub struct NamedRef<'a> {
    pub name: &'a str,
    pub ty: ValRef,
}

#[derive(Debug, Clone)]
pub struct CaseDef<'a> {
    pub name: &'a str,
    pub ty: Option<ValRef>,
    pub defaults: Option<u32>,
}

/// Value-type constructors. Composites appear only as type
/// declarators; their operands are references.
#[derive(Debug, Clone)]
pub enum ValDef<'a> {
    Prim(Prim),
    List(ValRef),
    Record(Vec<NamedRef<'a>>),
    Tuple(Vec<ValRef>),
    Flags(Vec<&'a str>),
    Variant(Vec<CaseDef<'a>>),
    Enum(Vec<&'a str>),
    Option(ValRef),
    Result {
        ok: Option<ValRef>,
        err: Option<ValRef>,
    },
    /// Handle to the resource the type at this index denotes.
    Own(u32),
    Borrow(u32),
}

#[derive(Debug, Clone)]
pub enum IoDef<'a> {
    Anon(ValRef),
    Named(Vec<NamedRef<'a>>),
}

#[derive(Debug, Clone)]
pub struct FuncDef<'a> {
    pub params: IoDef<'a>,
    pub results: IoDef<'a>,
}

/// A resource constructor: representation plus optional destructor
/// (an index into the local core function space). Only legal inside an
/// import/export declarator.
#[derive(Debug, Clone, Copy)]
pub struct ResourceDef {
    pub rep: CoreValType,
    pub dtor: Option<u32>,
}

/// Payload of a type declarator.
#[derive(Debug, Clone)]
pub enum TypeDef<'a> {
    Val(ValDef<'a>),
    Func(FuncDef<'a>),
    Instance(Vec<InstanceTypeDecl<'a>>),
    Component(Vec<ComponentTypeDecl<'a>>),
    /// Always an error here; resources are born at boundaries.
    Resource(ResourceDef),
}

/// How a type import/export describes its subject.
#[derive(Debug, Clone, Copy)]
pub enum TypeRefDef {
    /// Transparent: exactly the type at this index.
    Eq(u32),
    /// Abstract: some resource type.
    SubResource,
    /// A fresh resource, allocated at this declarator.
    Fresh(ResourceDef),
}

/// What an import (or a type-body export) declares.
#[derive(Debug, Clone, Copy)]
pub enum ExternDef {
    CoreModule(u32),
    Func(u32),
    Value(ValRef),
    Type(TypeRefDef),
    Instance(u32),
    Component(u32),
}

#[derive(Debug, Clone, Copy)]
pub enum AliasDef<'a> {
    /// Project one export out of a local instance.
    Export {
        instance: u32,
        name: &'a str,
        sort: Sort,
    },
    /// Reach `count` scopes up and copy an entry from there.
    Outer { count: u32, index: u32, sort: Sort },
}

#[derive(Debug, Clone)]
pub enum InstanceTypeDecl<'a> {
    CoreModule(CoreModuleType<'a>),
    Type(TypeDef<'a>),
    Alias(AliasDef<'a>),
    Export { name: &'a str, def: ExternDef },
}

#[derive(Debug, Clone)]
pub enum ComponentTypeDecl<'a> {
    CoreModule(CoreModuleType<'a>),
    Type(TypeDef<'a>),
    Alias(AliasDef<'a>),
    Import { name: &'a str, def: ExternDef },
    Export { name: &'a str, def: ExternDef },
}

#[derive(Debug, Clone, Copy)]
pub struct NamedIndex<'a> {
    pub name: &'a str,
    pub sort: Sort,
    pub index: u32,
}

/// Concrete instance construction.
#[derive(Debug, Clone)]
pub enum InstanceDef<'a> {
    Instantiate {
        component: u32,
        args: Vec<NamedIndex<'a>>,
    },
    FromExports(Vec<NamedIndex<'a>>),
}

/// Canonical-function declarators. The representation-level side is
/// the ABI's business; here only the indices and resource locality
/// are checked.
#[derive(Debug, Clone)]
pub enum CanonDef {
    Lift { core_func: u32, ty: u32 },
    Lower { func: u32, core_ty: CoreFuncType },
    ResourceNew { ty: u32 },
    ResourceDrop { ty: u32 },
    ResourceRep { ty: u32 },
}

#[derive(Debug, Clone)]
pub struct StartDef {
    pub func: u32,
    pub args: Vec<u32>,
    pub results: u32,
}

/// A concrete export: a prior definition by sort and index, or a
/// fresh resource minted right here at the boundary.
#[derive(Debug, Clone, Copy)]
pub enum ExportDef {
    Def { sort: Sort, index: u32 },
    FreshResource(ResourceDef),
}

/// One declarator in a concrete component body.
#[derive(Debug, Clone)]
pub enum Decl<'a> {
    CoreModule(CoreModuleType<'a>),
    Type(TypeDef<'a>),
    Alias(AliasDef<'a>),
    Import { name: &'a str, def: ExternDef },
    Export { name: &'a str, what: ExportDef },
    Instance(InstanceDef<'a>),
    Component(Vec<Decl<'a>>),
    Canon(CanonDef),
    Start(StartDef),
}
