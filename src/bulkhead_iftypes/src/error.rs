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

//! Validation errors.
//!
//! Everything that can go wrong is one tagged sum. The engines return
//! a bare [`ErrorKind`]; the elaborator wraps it with the location of
//! the declarator being processed. Validation is fail-fast: the first
//! error unwinds to the caller, there is no recovery or partial
//! acceptance.

use thiserror::Error;

use crate::decls::Sort;
use crate::itypes::{CoreExternDesc, DefType, FuncType, ResourceId, Tyvar, ValType};

/// Where an error happened: how deep in the scope chain, and which
/// declarator in that scope's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loc {
    pub depth: u32,
    pub index: u32,
}

impl std::fmt::Display for Loc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "declarator {} at scope depth {}", self.index, self.depth)
    }
}

/// The ways validation can fail. Mismatch variants carry both
/// compared shapes so a diagnostics layer can render them.
#[derive(Debug, Error)]
pub enum ErrorKind<'a> {
    #[error("No {sort:?} at index {index}")]
    UnknownIndex { sort: Sort, index: u32 },
    #[error("Instance has no export named {0:?}")]
    UnknownExport(&'a str),
    #[error("Outer alias reaches {count} scopes up but only {available} enclose this one")]
    OuterDepthOutOfRange { count: u32, available: u32 },
    #[error("Expected a {expected:?} but the target is a {found:?}")]
    SortMismatch { expected: Sort, found: Sort },

    #[error("Duplicate import/export name {0:?}")]
    DuplicateExternName(&'a str),
    #[error("Duplicate record field {0:?}")]
    DuplicateRecordField(&'a str),
    #[error("Duplicate variant case {0:?}")]
    DuplicateVariantCase(&'a str),
    #[error("Duplicate flag {0:?}")]
    DuplicateFlag(&'a str),
    #[error("Duplicate enum case {0:?}")]
    DuplicateEnumCase(&'a str),
    #[error("Duplicate core module export {0:?}")]
    DuplicateCoreExport(&'a str),
    #[error("Duplicate instantiation argument {0:?}")]
    DuplicateArg(&'a str),

    #[error("{sort:?} {index} was already consumed")]
    AlreadyConsumed { sort: Sort, index: u32 },
    #[error("Export {0:?} of this instance was already consumed")]
    ExportConsumed(&'a str),

    #[error("Expected a value where none was present: {0:?}")]
    MissingValue(ValType<'a>),
    #[error("Missing record field {0:?}")]
    MissingRecordField(&'a str),
    #[error("Missing variant case {0:?}")]
    MissingVariantCase(&'a str),
    #[error("Missing flag {0:?}")]
    MissingFlag(&'a str),
    #[error("Missing enum case {0:?}")]
    MissingEnumCase(&'a str),
    #[error("Tuple arities differ: {0} vs {1}")]
    MismatchedTupleArity(usize, usize),
    #[error("Value type {0:?} is not a subtype of {1:?}")]
    MismatchedValue(ValType<'a>, ValType<'a>),
    #[error("Defined type {0:?} is not a subtype of {1:?}")]
    MismatchedDefined(DefType<'a>, DefType<'a>),
    #[error("Resource {0:?} is not resource {1:?}")]
    MismatchedResources(ResourceId, ResourceId),
    #[error("Type variable {0:?} does not denote the same type as {1:?}")]
    MismatchedVars(Tyvar, Tyvar),
    #[error("Abstract type {0:?} cannot be the concrete resource {1:?}")]
    MismatchedResourceVar(Tyvar, ResourceId),
    #[error("Handle to something that is not a resource: {0:?}")]
    NotResource(DefType<'a>),
    #[error("Function shapes do not line up: {0:?} vs {1:?}")]
    MismatchedFuncShapes(FuncType<'a>, FuncType<'a>),
    #[error("Missing export {0:?}")]
    MissingExport(&'a str),
    #[error("No argument supplied for import {0:?}")]
    MissingImport(&'a str),
    #[error("Core module is missing export {0:?}")]
    MissingCoreExport(&'a str),
    #[error("Core module does not declare import {module:?} {name:?}")]
    MissingCoreImport { module: &'a str, name: &'a str },
    #[error("Core type {0:?} is not a subtype of {1:?}")]
    MismatchedCoreDesc(CoreExternDesc, CoreExternDesc),

    #[error("No witness for existential quantifier {index}")]
    UnmatchedExistential { index: u32 },

    #[error("Resource constructor outside an import/export declarator")]
    BareResourceOutsideExtern,
    #[error("Concrete resource {0:?} cannot appear bare in an export")]
    BareResourceExport(ResourceId),
    #[error("Type variable {0:?} is not concrete across an outer boundary")]
    AbstractAcrossBoundary(Tyvar),
    #[error("Existential {index} escapes the scope being closed")]
    EvarEscapes { index: u32 },
    #[error("Universal {index} escapes the scope being closed")]
    UvarEscapes { index: u32 },
    #[error("Borrow handle outside a function parameter")]
    BorrowOutsideParam,
    #[error("Case {case:?} defaults to nonexistent case {target}")]
    BadCaseDefault { case: &'a str, target: u32 },
    #[error("Type is not usable as a value type: {0:?}")]
    NotAValueType(DefType<'a>),
    #[error("Not a locally defined resource: {0:?}")]
    NotLocalResource(DefType<'a>),
    #[error("Start function takes {want} arguments, {got} supplied")]
    StartArity { want: usize, got: usize },
    #[error("Start function yields {want} results, {got} declared")]
    StartResultArity { want: usize, got: u32 },

    #[error("Scope nesting exceeds the configured limit {limit}")]
    ScopeDepthExceeded { limit: u32 },
    #[error("Scope entry count exceeds the configured limit {limit}")]
    ScopeEntriesExceeded { limit: u32 },
}

impl<'a> ErrorKind<'a> {
    pub fn at(self, loc: Loc) -> Error<'a> {
        Error { loc, kind: self }
    }
}

/// An [`ErrorKind`] with the declarator it arose at.
#[derive(Debug, Error)]
#[error("{loc}: {kind}")]
pub struct Error<'a> {
    pub loc: Loc,
    pub kind: ErrorKind<'a>,
}
