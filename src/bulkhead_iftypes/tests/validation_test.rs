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

use bulkhead_iftypes::decls::{
    AliasDef, CanonDef, Decl, ExportDef, ExternDef, FuncDef, InstanceDef, InstanceTypeDecl, IoDef,
    NamedIndex, Prim, ResourceDef, Sort, StartDef, TypeDef, ValDef, ValRef,
};
use bulkhead_iftypes::itypes::{CoreValType, IntSize, ResourceRef, TypeBound, ValType};
use bulkhead_iftypes::{validate_component, DefType, ErrorKind, ExternDesc, Limits, Tyvar};
use bulkhead_testing::with_capture;
use tracing::Level;

pub mod common; // pub to disable dead_code warning
use crate::common::{export, import_u32, validate};

/// A component exporting a fresh resource type `t` plus lifted
/// `make: func() -> own t` and `use: func(own t) -> ()`.
fn counter_component() -> Vec<Decl<'static>> {
    vec![
        Decl::Export {
            name: "t",
            what: ExportDef::FreshResource(ResourceDef {
                rep: CoreValType::I32,
                dtor: None,
            }),
        },
        Decl::Canon(CanonDef::ResourceNew { ty: 0 }),
        Decl::Type(TypeDef::Val(ValDef::Own(0))),
        Decl::Type(TypeDef::Func(FuncDef {
            params: IoDef::Named(vec![]),
            results: IoDef::Anon(ValRef::Idx(1)),
        })),
        Decl::Canon(CanonDef::Lift {
            core_func: 0,
            ty: 2,
        }),
        Decl::Export {
            name: "make",
            what: ExportDef::Def {
                sort: Sort::Func,
                index: 0,
            },
        },
        Decl::Type(TypeDef::Func(FuncDef {
            params: IoDef::Anon(ValRef::Idx(1)),
            results: IoDef::Named(vec![]),
        })),
        Decl::Canon(CanonDef::Lift {
            core_func: 0,
            ty: 3,
        }),
        Decl::Export {
            name: "use",
            what: ExportDef::Def {
                sort: Sort::Func,
                index: 1,
            },
        },
    ]
}

#[test]
fn resource_component_publishes_only_its_abstraction() {
    let decls = vec![
        Decl::Export {
            name: "counter",
            what: ExportDef::FreshResource(ResourceDef {
                rep: CoreValType::I32,
                dtor: None,
            }),
        },
        Decl::Canon(CanonDef::ResourceNew { ty: 0 }),
        Decl::Canon(CanonDef::ResourceDrop { ty: 0 }),
        Decl::Type(TypeDef::Val(ValDef::Own(0))),
        Decl::Type(TypeDef::Func(FuncDef {
            params: IoDef::Anon(ValRef::Idx(1)),
            results: IoDef::Anon(ValRef::Prim(Prim::U32)),
        })),
        Decl::Canon(CanonDef::Lift {
            core_func: 0,
            ty: 2,
        }),
        Decl::Export {
            name: "read",
            what: ExportDef::Def {
                sort: Sort::Func,
                index: 0,
            },
        },
    ];
    let ct = validate(&decls).unwrap();
    assert!(ct.uvars.is_empty());
    assert!(ct.imports.is_empty());
    assert_eq!(ct.exports.evars.len(), 1);
    assert!(matches!(ct.exports.evars[0], TypeBound::SubResource));
    // The resource surfaces as the existential, never as its id.
    assert!(matches!(
        export(&ct, "counter"),
        ExternDesc::Type(DefType::Var(Tyvar::Bound(0)))
    ));
    match export(&ct, "read") {
        ExternDesc::Func(ft) => {
            assert!(matches!(
                ft.params.types().next(),
                Some(ValType::Own(ResourceRef::Var(Tyvar::Bound(0))))
            ));
            assert!(matches!(
                ft.results.types().next(),
                Some(ValType::U(IntSize::I32))
            ));
        }
        other => panic!("expected a func export, got {other:?}"),
    }
}

#[test]
fn values_from_two_instantiations_do_not_mix() {
    // `make` from one instantiation feeds a value to `use` from a
    // second instantiation of the same component; their abstract
    // types were released separately and must not unify.
    let decls = vec![
        Decl::Component(counter_component()),
        Decl::Instance(InstanceDef::Instantiate {
            component: 0,
            args: vec![],
        }),
        Decl::Instance(InstanceDef::Instantiate {
            component: 0,
            args: vec![],
        }),
        Decl::Alias(AliasDef::Export {
            instance: 0,
            name: "make",
            sort: Sort::Func,
        }),
        Decl::Alias(AliasDef::Export {
            instance: 1,
            name: "use",
            sort: Sort::Func,
        }),
        Decl::Start(StartDef {
            func: 0,
            args: vec![],
            results: 1,
        }),
        Decl::Start(StartDef {
            func: 1,
            args: vec![0],
            results: 0,
        }),
    ];
    let err = validate(&decls).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MismatchedVars(_, _)));
    assert_eq!(err.loc.index, 6);
}

#[test]
fn values_within_one_instantiation_flow_freely() {
    let decls = vec![
        Decl::Component(counter_component()),
        Decl::Instance(InstanceDef::Instantiate {
            component: 0,
            args: vec![],
        }),
        Decl::Instance(InstanceDef::Instantiate {
            component: 0,
            args: vec![],
        }),
        Decl::Alias(AliasDef::Export {
            instance: 0,
            name: "make",
            sort: Sort::Func,
        }),
        Decl::Alias(AliasDef::Export {
            instance: 0,
            name: "use",
            sort: Sort::Func,
        }),
        Decl::Start(StartDef {
            func: 0,
            args: vec![],
            results: 1,
        }),
        Decl::Start(StartDef {
            func: 1,
            args: vec![0],
            results: 0,
        }),
    ];
    let ct = validate(&decls).unwrap();
    assert!(ct.uvars.is_empty());
    assert!(ct.exports.exports.is_empty());
}

#[test]
fn exporting_an_instance_consumes_it() {
    let decls = vec![
        Decl::Instance(InstanceDef::FromExports(vec![])),
        Decl::Export {
            name: "a",
            what: ExportDef::Def {
                sort: Sort::Instance,
                index: 0,
            },
        },
        Decl::Export {
            name: "b",
            what: ExportDef::Def {
                sort: Sort::Instance,
                index: 0,
            },
        },
    ];
    let err = validate(&decls).unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::AlreadyConsumed {
            sort: Sort::Instance,
            index: 0
        }
    ));
    assert_eq!(err.loc.index, 2);
}

#[test]
fn value_projection_is_linear_per_export_name() {
    let decls = vec![
        import_u32("v"),
        Decl::Instance(InstanceDef::FromExports(vec![NamedIndex {
            name: "x",
            sort: Sort::Value,
            index: 0,
        }])),
        Decl::Alias(AliasDef::Export {
            instance: 0,
            name: "x",
            sort: Sort::Value,
        }),
        Decl::Alias(AliasDef::Export {
            instance: 0,
            name: "x",
            sort: Sort::Value,
        }),
    ];
    let err = validate(&decls).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ExportConsumed("x")));
    assert_eq!(err.loc.index, 3);
}

#[test]
fn distinct_instances_project_the_same_name_independently() {
    let decls = vec![
        import_u32("v"),
        import_u32("w"),
        Decl::Instance(InstanceDef::FromExports(vec![NamedIndex {
            name: "x",
            sort: Sort::Value,
            index: 0,
        }])),
        Decl::Instance(InstanceDef::FromExports(vec![NamedIndex {
            name: "x",
            sort: Sort::Value,
            index: 1,
        }])),
        Decl::Alias(AliasDef::Export {
            instance: 0,
            name: "x",
            sort: Sort::Value,
        }),
        Decl::Alias(AliasDef::Export {
            instance: 1,
            name: "x",
            sort: Sort::Value,
        }),
        Decl::Export {
            name: "a",
            what: ExportDef::Def {
                sort: Sort::Value,
                index: 2,
            },
        },
        Decl::Export {
            name: "b",
            what: ExportDef::Def {
                sort: Sort::Value,
                index: 3,
            },
        },
    ];
    validate(&decls).unwrap();
}

#[test]
fn instance_argument_must_carry_the_named_exports() {
    let inner = vec![
        Decl::Type(TypeDef::Instance(vec![InstanceTypeDecl::Export {
            name: "v",
            def: ExternDef::Value(ValRef::Prim(Prim::U32)),
        }])),
        Decl::Import {
            name: "i",
            def: ExternDef::Instance(0),
        },
    ];
    let outer = |export_name: &'static str| {
        vec![
            Decl::Component(inner.clone()),
            import_u32("v"),
            Decl::Instance(InstanceDef::FromExports(vec![NamedIndex {
                name: export_name,
                sort: Sort::Value,
                index: 0,
            }])),
            Decl::Instance(InstanceDef::Instantiate {
                component: 0,
                args: vec![NamedIndex {
                    name: "i",
                    sort: Sort::Instance,
                    index: 0,
                }],
            }),
        ]
    };
    let good = outer("v");
    validate(&good).unwrap();
    let bad = outer("w");
    let err = validate(&bad).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MissingExport("v")));
    assert_eq!(err.loc.index, 3);
}

#[test]
fn canon_builtins_need_the_allocating_scope() {
    let inner = vec![Decl::Export {
        name: "t",
        what: ExportDef::FreshResource(ResourceDef {
            rep: CoreValType::I32,
            dtor: None,
        }),
    }];
    let decls = vec![
        Decl::Component(inner),
        Decl::Instance(InstanceDef::Instantiate {
            component: 0,
            args: vec![],
        }),
        Decl::Alias(AliasDef::Export {
            instance: 0,
            name: "t",
            sort: Sort::Type,
        }),
        // Dropping an abstract resource is fine; conjuring one needs
        // the representation only the allocator has.
        Decl::Canon(CanonDef::ResourceDrop { ty: 0 }),
        Decl::Canon(CanonDef::ResourceNew { ty: 0 }),
    ];
    let err = validate(&decls).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NotLocalResource(_)));
    assert_eq!(err.loc.index, 4);
}

#[test]
fn outer_alias_can_carry_a_component_definition_inward() {
    let user = vec![
        Decl::Alias(AliasDef::Outer {
            count: 1,
            index: 0,
            sort: Sort::Component,
        }),
        Decl::Instance(InstanceDef::Instantiate {
            component: 0,
            args: vec![],
        }),
    ];
    let decls = vec![Decl::Component(vec![]), Decl::Component(user)];
    validate(&decls).unwrap();
}

#[test]
fn scope_depth_limit_binds_nested_components() {
    let decls = vec![Decl::Component(vec![Decl::Component(vec![])])];
    let err = validate_component(&decls, &Limits::new(2, 1024)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ScopeDepthExceeded { limit: 2 }));
    assert_eq!(err.loc.depth, 1);

    // The same limit admits an empty component.
    validate_component(&[], &Limits::new(4, 16)).unwrap();
}

#[test]
fn scope_entry_limit_binds_declarators() {
    let decls = vec![
        Decl::Type(TypeDef::Val(ValDef::Prim(Prim::Bool))),
        Decl::Type(TypeDef::Val(ValDef::Prim(Prim::Bool))),
        Decl::Type(TypeDef::Val(ValDef::Prim(Prim::Bool))),
    ];
    let err = validate_component(&decls, &Limits::new(8, 2)).unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::ScopeEntriesExceeded { limit: 2 }
    ));
    assert_eq!(err.loc.index, 2);
}

#[test]
fn failures_are_traced_with_their_location() {
    let decls = vec![
        import_u32("v"),
        import_u32("w"),
        Decl::Export {
            name: "x",
            what: ExportDef::Def {
                sort: Sort::Value,
                index: 0,
            },
        },
        Decl::Export {
            name: "x",
            what: ExportDef::Def {
                sort: Sort::Value,
                index: 1,
            },
        },
    ];
    let (result, trace) = with_capture(Level::DEBUG, || validate(&decls));
    assert!(result.is_err());
    let errors = trace.error_values();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Duplicate import/export name"));
    assert!(errors[0].contains("declarator 4"));
    assert!(trace
        .span_names()
        .iter()
        .any(|name| name == "validate_component"));
}

#[test]
fn instantiation_emits_a_debug_event() {
    let decls = vec![
        Decl::Component(vec![]),
        Decl::Instance(InstanceDef::Instantiate {
            component: 0,
            args: vec![],
        }),
    ];
    let (result, trace) = with_capture(Level::DEBUG, || validate(&decls));
    assert!(result.is_ok());
    let events = trace.get_events();
    let event = events
        .iter()
        .find(|e| e["message"] == "instantiated")
        .expect("no instantiation event captured");
    assert_eq!(event["component"], 0);
    assert_eq!(event["exports"], 0);
}

#[test]
fn every_declarator_emits_a_trace_event() {
    let decls = vec![
        import_u32("v"),
        Decl::Export {
            name: "out",
            what: ExportDef::Def {
                sort: Sort::Value,
                index: 0,
            },
        },
    ];
    let (result, trace) = with_capture(Level::TRACE, || validate(&decls));
    assert!(result.is_ok());
    let events = trace.get_events();
    let declarators: Vec<_> = events
        .iter()
        .filter(|e| e["message"] == "declarator")
        .collect();
    assert_eq!(declarators.len(), 2);
    assert_eq!(declarators[0]["index"], 0);
    assert_eq!(declarators[0]["kind"], "import");
    assert_eq!(declarators[1]["index"], 1);
    assert_eq!(declarators[1]["kind"], "export");
}
