use std::sync::Arc;

use ureflect::{
    LayoutBuilder, LayoutError, PropertyFlags, PropertyType, StructDef, StructLayout,
    StructRegistry, TypeRef,
};

fn actor(registry: &mut StructRegistry) -> Arc<StructLayout> {
    registry
        .register(
            StructDef::new("Actor")
                .property("bHidden", TypeRef::Bool)
                .property("bStatic", TypeRef::Bool)
                .property("Location", TypeRef::structure("Vector"))
                .property("bAwake", TypeRef::Bool),
        )
        .unwrap();
    registry.resolve("Actor").unwrap()
}

fn placement(layout: &StructLayout, name: &str) -> (usize, u32) {
    let prop = layout.find_property(name).unwrap();
    (prop.offset(), prop.bit_mask())
}

#[test]
fn actor_layout_matches_compiler() {
    let mut registry = StructRegistry::with_builtins();
    let layout = actor(&mut registry);

    assert_eq!(placement(&layout, "bHidden"), (0, 0x1));
    assert_eq!(placement(&layout, "bStatic"), (0, 0x2));
    assert_eq!(placement(&layout, "Location"), (4, 0));
    assert_eq!(layout.find_property("Location").unwrap().size(), 12);
    assert_eq!(placement(&layout, "bAwake"), (16, 0x1));
    assert_eq!(layout.size(), 24);
}

#[test]
fn thirty_three_bools_spill_into_a_second_word() {
    let mut builder = LayoutBuilder::new("Flags");
    for bit in 0..33 {
        builder = builder.property(format!("b{bit}"), PropertyType::Bool);
    }
    let layout = builder.build().unwrap();

    for bit in 0..32 {
        assert_eq!(placement(&layout, &format!("b{bit}")), (0, 1u32 << bit));
    }
    assert_eq!(placement(&layout, "b32"), (4, 0x1));
    assert_eq!(layout.size(), 8);
}

#[test]
fn non_bool_interrupts_a_bool_run() {
    let layout = LayoutBuilder::new("Mixed")
        .property("bFirst", PropertyType::Bool)
        .property("Count", PropertyType::Byte)
        .property("bSecond", PropertyType::Bool)
        .build()
        .unwrap();
    assert_eq!(placement(&layout, "bFirst"), (0, 0x1));
    assert_eq!(placement(&layout, "Count"), (4, 0));
    assert_eq!(placement(&layout, "bSecond"), (8, 0x1));
}

#[test]
fn layout_is_deterministic() {
    let build = || {
        let mut registry = StructRegistry::with_builtins();
        registry
            .register(
                StructDef::new("Base")
                    .property("bA", TypeRef::Bool)
                    .property("Name", TypeRef::Name)
                    .property("Label", TypeRef::Str),
            )
            .unwrap();
        registry
            .register(
                StructDef::new("Derived")
                    .base("Base")
                    .property("bB", TypeRef::Bool)
                    .property("Spin", TypeRef::structure("Rotator"))
                    .property("Tint", TypeRef::structure("Color"))
                    .property("Items", TypeRef::array(TypeRef::Int)),
            )
            .unwrap();
        let layout = registry.resolve("Derived").unwrap();
        let placements: Vec<_> = layout
            .properties()
            .iter()
            .map(|prop| (prop.name().to_string(), prop.offset(), prop.bit_mask()))
            .collect();
        (placements, layout.size())
    };
    assert_eq!(build(), build());
}

#[test]
fn base_offsets_are_preserved() {
    let base = Arc::new(
        LayoutBuilder::new("Object")
            .property("Outer", PropertyType::Object {
                class: "Object".into(),
            })
            .property("bPending", PropertyType::Bool)
            .build()
            .unwrap(),
    );
    let derived = LayoutBuilder::new("Info")
        .with_base(base.clone())
        .property("bPersistent", PropertyType::Bool)
        .property_with("Notes", PropertyType::Str, 2, PropertyFlags::LOCALIZED)
        .build()
        .unwrap();

    for (inherited, original) in derived.properties().iter().zip(base.properties()) {
        assert!(Arc::ptr_eq(inherited, original));
    }
    // bPersistent starts a new word after the base
    assert_eq!(placement(&derived, "bPersistent"), (16, 0x1));
    assert_eq!(placement(&derived, "Notes"), (24, 0));
    assert_eq!(derived.size(), 40);
}

#[test]
fn shadowed_names_resolve_by_tag_kind() {
    let mut registry = StructRegistry::with_builtins();
    registry
        .register(StructDef::new("Zone").property("Region", TypeRef::Int))
        .unwrap();
    registry
        .register(
            StructDef::new("ZoneInfo")
                .base("Zone")
                .property("Region", TypeRef::structure("Vector")),
        )
        .unwrap();
    let layout = registry.resolve("ZoneInfo").unwrap();

    let as_struct = layout.find_tagged("Region", true).unwrap();
    assert_eq!(as_struct.owner(), "ZoneInfo");
    assert!(as_struct.ty().struct_layout().is_some());
    let as_int = layout.find_tagged("region", false).unwrap();
    assert_eq!(as_int.owner(), "Zone");
    assert_eq!(layout.find_property("Region").unwrap().owner(), "ZoneInfo");
}

#[test]
fn unknown_struct_reference_fails_resolution() {
    let mut registry = StructRegistry::new();
    registry
        .register(StructDef::new("Pawn").property("Eye", TypeRef::structure("Vector")))
        .unwrap();
    assert_eq!(
        registry.resolve("Pawn").unwrap_err(),
        LayoutError::UnknownStruct("Vector".into())
    );
}
