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

use bulkhead_iftypes::decls::{Decl, ExternDef, Prim, ValRef};
use bulkhead_iftypes::{validate_component, ComponentType, Error, ExternDesc, Limits};

/// Validate a declaration list under the default limits.
pub fn validate<'a>(decls: &'a [Decl<'a>]) -> Result<ComponentType<'a>, Error<'a>> {
    validate_component(decls, &Limits::default())
}

/// Find a named export in a finished component type.
pub fn export<'c, 'a>(ct: &'c ComponentType<'a>, name: &str) -> &'c ExternDesc<'a> {
    &ct.exports
        .exports
        .iter()
        .find(|ed| ed.name == name)
        .unwrap_or_else(|| panic!("no export named {name:?}"))
        .desc
}

/// A `u32` value import, the cheapest way to get a live value entry.
pub fn import_u32(name: &'static str) -> Decl<'static> {
    Decl::Import {
        name,
        def: ExternDef::Value(ValRef::Prim(Prim::U32)),
    }
}
