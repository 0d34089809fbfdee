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

//! This crate contains the semantic analysis used on Bulkhead interface
//! definitions: elaboration of declaration sequences into inferred
//! instance and component types, structural subtyping, and signature
//! matching for instantiation.

#![cfg_attr(not(any(test, debug_assertions)), warn(clippy::panic))]
#![cfg_attr(not(any(test, debug_assertions)), warn(clippy::expect_used))]
#![cfg_attr(not(any(test, debug_assertions)), warn(clippy::unwrap_used))]
// "Needless" lifetimes are useful for clarity
#![allow(clippy::needless_lifetimes)]

/// The declaration language: what authors write down
pub mod decls;
/// Elaboration of declarations into semantic types
pub mod elaborate;
/// Validation errors and the locations they are reported at
pub mod error;
/// The semantic types that elaboration produces
pub mod itypes;
/// Resolution of type variables against the scopes that bind them
pub mod resolve;
/// Validation scopes: type spaces, linear entries, resource tables
pub mod scope;
/// Signature matching of supplied arguments against component imports
pub mod sigmatch;
/// Channel-based substitution over semantic types
pub mod subst;
/// Structural subtyping
pub mod subtype;
/// Well-formedness of semantic types
pub mod wf;

/// The re-export for the `validate_component` entry point
pub use elaborate::validate_component;
/// The re-export for the `Error` type and its parts
pub use error::{Error, ErrorKind, Loc};
/// The re-export for the inferred type forms
pub use itypes::{ComponentType, DefType, ExternDecl, ExternDesc, InstanceType, Tyvar};
/// The re-export for the `ScopeArena` type and its configuration
pub use scope::{Limits, ScopeArena, ScopeId};

#[cfg(test)]
mod prop_tests;
