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

//! Property tests for the structural layer using proptest.
//!
//! These stress invariants that must hold for ANY ground value type,
//! not just hand-picked examples:
//!
//! 1. Subtyping is reflexive and transitive along width chains
//! 2. The identity substitution changes nothing observable
//! 3. Deepening a ground type changes nothing observable
//! 4. Record subtyping is width-based and order-blind
//! 5. Enum/flag width subtyping run in opposite directions
//! 6. A variant with fewer cases subtypes one with more
//! 7. Instance subtyping is reflexive for quantified signatures
//!
//! Generated value types are ground: no handles and no variables, so
//! a type means the same thing in every scope and the properties do
//! not depend on any particular binder layout. Quantified signatures
//! are the exception: closed instance types whose binders telescope,
//! with every abstract variable published as a leaf type export so
//! witness discovery has something to find.

use proptest::prelude::*;

use crate::itypes::{
    DefType, ExternDecl, ExternDesc, FloatSize, FuncType, InstanceType, IntSize, RecordField,
    ResourceRef, TypeBound, TypeList, Tyvar, ValType, VariantCase,
};
use crate::scope::{Limits, ScopeArena, ScopeId};
use crate::subst::Subst;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

const FIELD_POOL: &[&str] = &[
    "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel",
];

const TYPE_POOL: &[&str] = &["first", "second", "third"];
const FN_POOL: &[&str] = &["make-first", "make-second", "make-third"];

fn arena<'a>() -> (ScopeArena<'a>, ScopeId) {
    let mut a = ScopeArena::new(Limits::default());
    let s = a.push_scope(None, true).unwrap();
    (a, s)
}

fn arb_int_size() -> impl Strategy<Value = IntSize> {
    prop::sample::select(vec![IntSize::I8, IntSize::I16, IntSize::I32, IntSize::I64])
}

fn arb_float_size() -> impl Strategy<Value = FloatSize> {
    prop::sample::select(vec![FloatSize::F32, FloatSize::F64])
}

fn arb_leaf() -> impl Strategy<Value = ValType<'static>> {
    prop_oneof![
        Just(ValType::Bool),
        arb_int_size().prop_map(ValType::S),
        arb_int_size().prop_map(ValType::U),
        arb_float_size().prop_map(ValType::F),
        Just(ValType::Char),
        Just(ValType::String),
    ]
}

/// A non-empty, duplicate-free draw from the name pool, in pool order.
fn arb_names(max: usize) -> impl Strategy<Value = Vec<&'static str>> {
    prop::sample::subsequence(FIELD_POOL.to_vec(), 1..=max)
}

/// Record fields with unique names and types of bounded depth.
fn arb_record_fields(depth: u32) -> BoxedStrategy<Vec<RecordField<'static>>> {
    arb_names(4)
        .prop_flat_map(move |names| {
            let n = names.len();
            prop::collection::vec(arb_val_type(depth), n).prop_map(move |tys| {
                names
                    .iter()
                    .copied()
                    .zip(tys)
                    .map(|(name, ty)| RecordField { name, ty })
                    .collect()
            })
        })
        .boxed()
}

/// Variant cases with unique names, optional payloads, no defaults.
fn arb_variant_cases(depth: u32) -> BoxedStrategy<Vec<VariantCase<'static>>> {
    arb_names(4)
        .prop_flat_map(move |names| {
            let n = names.len();
            prop::collection::vec(prop::option::of(arb_val_type(depth)), n).prop_map(
                move |tys| {
                    names
                        .iter()
                        .copied()
                        .zip(tys)
                        .map(|(name, ty)| VariantCase {
                            name,
                            ty,
                            defaults: None,
                        })
                        .collect()
                },
            )
        })
        .boxed()
}

/// Ground value types of bounded depth. Depth 0 = leaves only.
fn arb_val_type(depth: u32) -> BoxedStrategy<ValType<'static>> {
    if depth == 0 {
        return arb_leaf().boxed();
    }
    let inner = arb_val_type(depth - 1);
    prop_oneof![
        4 => arb_leaf(),
        1 => inner.clone().prop_map(|t| ValType::List(Box::new(t))),
        1 => inner.clone().prop_map(|t| ValType::Option(Box::new(t))),
        1 => prop::collection::vec(inner.clone(), 0..3).prop_map(ValType::Tuple),
        1 => arb_record_fields(depth - 1).prop_map(ValType::Record),
        1 => arb_variant_cases(depth - 1).prop_map(ValType::Variant),
        1 => arb_names(6).prop_map(ValType::Flags),
        1 => arb_names(6).prop_map(ValType::Enum),
        1 => (prop::option::of(inner.clone()), prop::option::of(inner))
            .prop_map(|(ok, err)| ValType::Result(Box::new(ok), Box::new(err))),
    ]
    .boxed()
}

/// Closed instance types with up to three telescoping quantifiers.
/// A slot's bound is resource-shaped, an equality to a ground leaf,
/// or an equality to an earlier slot. Every slot is published as a
/// leaf type export, and resource-bounded slots also get an
/// own-handle constructor.
fn arb_quantified_instance() -> impl Strategy<Value = InstanceType<'static>> {
    let slot = (0u8..=2, any::<prop::sample::Index>(), arb_leaf());
    prop::collection::vec(slot, 0..=3).prop_map(|seeds| {
        let n = seeds.len();
        let mut evars = Vec::with_capacity(n);
        let mut exports = Vec::new();
        for (j, (sel, pick, leaf)) in seeds.into_iter().enumerate() {
            // Inside bound j, Bound(i) names slot j - 1 - i; in the
            // body, under n binders, slot j is Bound(n - 1 - j).
            let bound = match sel {
                1 => TypeBound::Eq(DefType::Val(leaf)),
                2 if j > 0 => {
                    let k = pick.index(j);
                    TypeBound::Eq(DefType::Var(Tyvar::Bound((j - 1 - k) as u32)))
                }
                _ => TypeBound::SubResource,
            };
            let var = Tyvar::Bound((n - 1 - j) as u32);
            exports.push(ExternDecl {
                name: TYPE_POOL[j],
                desc: ExternDesc::Type(DefType::Var(var)),
            });
            if matches!(bound, TypeBound::SubResource) {
                exports.push(ExternDecl {
                    name: FN_POOL[j],
                    desc: ExternDesc::Func(FuncType {
                        params: TypeList::Anon(ValType::Own(ResourceRef::Var(var))),
                        results: TypeList::Named(vec![]),
                    }),
                });
            }
            evars.push(bound);
        }
        InstanceType { evars, exports }
    })
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    /// Every type is a subtype of itself.
    #[test]
    fn subtyping_is_reflexive(vt in arb_val_type(3)) {
        let (mut a, s) = arena();
        prop_assert!(a.subtype_value(s, &vt, &vt).is_ok());
    }

    /// The identity substitution produces a type mutually subtyping
    /// the input, for any input.
    #[test]
    fn identity_substitution_is_invisible(vt in arb_val_type(3)) {
        let out = Subst::identity().val_type(&vt).unwrap();
        let (mut a, s) = arena();
        prop_assert!(a.subtype_value(s, &vt, &out).is_ok());
        prop_assert!(a.subtype_value(s, &out, &vt).is_ok());
    }

    /// Deepening only touches free variables, and ground types have
    /// none, so it must be invisible too.
    #[test]
    fn deepening_is_invisible_to_ground_types(vt in arb_val_type(3)) {
        let out = Subst::deepen().val_type(&vt).unwrap();
        let (mut a, s) = arena();
        prop_assert!(a.subtype_value(s, &vt, &out).is_ok());
        prop_assert!(a.subtype_value(s, &out, &vt).is_ok());
    }

    /// Every quantified signature is a subtype of itself, however its
    /// binders telescope.
    #[test]
    fn quantified_instance_subtype_is_reflexive(it in arb_quantified_instance()) {
        let (mut a, s) = arena();
        prop_assert!(a.subtype_instance(s, &it, &it).is_ok());
    }
}

proptest! {
    /// Record fields match by name; declaration order never matters.
    #[test]
    fn record_field_order_is_irrelevant(
        (original, shuffled) in arb_record_fields(1).prop_flat_map(|fields| {
            (Just(fields.clone()), Just(fields).prop_shuffle())
        })
    ) {
        let (mut a, s) = arena();
        let r1 = ValType::Record(original);
        let r2 = ValType::Record(shuffled);
        prop_assert!(a.subtype_value(s, &r1, &r2).is_ok());
        prop_assert!(a.subtype_value(s, &r2, &r1).is_ok());
    }

    /// A record with extra fields flows to one without them, and a
    /// record genuinely missing fields never flows back.
    #[test]
    fn dropping_record_fields_widens(
        (all, kept) in arb_record_fields(1).prop_flat_map(|fields| {
            let n = fields.len();
            (Just(fields.clone()), prop::sample::subsequence(fields, 0..=n))
        })
    ) {
        let (mut a, s) = arena();
        let strictly_fewer = kept.len() < all.len();
        let wide = ValType::Record(all);
        let narrow = ValType::Record(kept);
        prop_assert!(a.subtype_value(s, &wide, &narrow).is_ok());
        if strictly_fewer {
            prop_assert!(a.subtype_value(s, &narrow, &wide).is_err());
        }
    }

    /// An enum with fewer cases fits where more are handled; flags run
    /// the other way, a producer of more flags fits where fewer are
    /// expected.
    #[test]
    fn enum_and_flag_width_run_opposite_ways(
        (all, some) in arb_names(8).prop_flat_map(|names| {
            let n = names.len();
            (Just(names.clone()), prop::sample::subsequence(names, 1..=n))
        })
    ) {
        let (mut a, s) = arena();
        let strictly_fewer = some.len() < all.len();
        prop_assert!(a
            .subtype_value(s, &ValType::Enum(some.clone()), &ValType::Enum(all.clone()))
            .is_ok());
        prop_assert!(a
            .subtype_value(s, &ValType::Flags(all.clone()), &ValType::Flags(some.clone()))
            .is_ok());
        if strictly_fewer {
            prop_assert!(a
                .subtype_value(s, &ValType::Enum(all.clone()), &ValType::Enum(some.clone()))
                .is_err());
            prop_assert!(a
                .subtype_value(s, &ValType::Flags(some), &ValType::Flags(all))
                .is_err());
        }
    }

    /// A variant producing a subset of another's cases flows to it.
    #[test]
    fn variant_case_subsets_are_subtypes(
        (all, some) in arb_variant_cases(1).prop_flat_map(|cases| {
            let n = cases.len();
            (Just(cases.clone()), prop::sample::subsequence(cases, 1..=n))
        })
    ) {
        let (mut a, s) = arena();
        let sub = ValType::Variant(some);
        let sup = ValType::Variant(all);
        prop_assert!(a.subtype_value(s, &sub, &sup).is_ok());
    }

    /// Transitivity along a record width chain: wide ⊇ mid ⊇ narrow
    /// gives wide <: mid <: narrow, and the end-to-end step holds too.
    #[test]
    fn record_subtyping_is_transitive(
        (wide, mid, narrow) in arb_record_fields(1)
            .prop_flat_map(|fields| {
                let n = fields.len();
                (Just(fields.clone()), prop::sample::subsequence(fields, 0..=n))
            })
            .prop_flat_map(|(wide, mid)| {
                let m = mid.len();
                (Just(wide), Just(mid.clone()), prop::sample::subsequence(mid, 0..=m))
            })
    ) {
        let (mut a, s) = arena();
        let t1 = ValType::Record(wide);
        let t2 = ValType::Record(mid);
        let t3 = ValType::Record(narrow);
        prop_assert!(a.subtype_value(s, &t1, &t2).is_ok());
        prop_assert!(a.subtype_value(s, &t2, &t3).is_ok());
        prop_assert!(a.subtype_value(s, &t1, &t3).is_ok());
    }

    /// Transitivity along an enum case chain, which narrows the other
    /// way: few ⊆ mid ⊆ many gives few <: mid <: many.
    #[test]
    fn enum_subtyping_is_transitive(
        (many, mid, few) in arb_names(8)
            .prop_flat_map(|names| {
                let n = names.len();
                (Just(names.clone()), prop::sample::subsequence(names, 1..=n))
            })
            .prop_flat_map(|(many, mid)| {
                let m = mid.len();
                (Just(many), Just(mid.clone()), prop::sample::subsequence(mid, 1..=m))
            })
    ) {
        let (mut a, s) = arena();
        let t1 = ValType::Enum(few);
        let t2 = ValType::Enum(mid);
        let t3 = ValType::Enum(many);
        prop_assert!(a.subtype_value(s, &t1, &t2).is_ok());
        prop_assert!(a.subtype_value(s, &t2, &t3).is_ok());
        prop_assert!(a.subtype_value(s, &t1, &t3).is_ok());
    }
}
