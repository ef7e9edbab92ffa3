use std::sync::Arc;

use ureflect::ureflect_stream::{
    NameId, NameTable, ObjectEntry, ObjectRef, ObjectTable, Package, PackageWriter,
};
use ureflect::{
    PropertyDataBlock, PropertyDef, PropertyError, PropertyFlags, PropertyTag, StructDef,
    StructLayout, StructRegistry, TypeRef, TypeTag, Value, read_properties, write_properties,
};

fn package() -> Package {
    let mut package = Package::new(69);
    let class = package.names_mut().intern("Class");
    let name = package.names_mut().intern("Pawn");
    package.objects_mut().add_export(ObjectEntry {
        name,
        class_name: class,
    });
    package
}

fn inventory(registry: &mut StructRegistry) -> Arc<StructLayout> {
    registry
        .register(
            StructDef::new("Inventory")
                .property("bActive", TypeRef::Bool)
                .property("bCharged", TypeRef::Bool)
                .property("Health", TypeRef::Int)
                .property("Speed", TypeRef::Float)
                .property("Charge", TypeRef::Byte)
                .property("Tag", TypeRef::Name)
                .property("Label", TypeRef::Str)
                .property("Owner", TypeRef::object("Pawn"))
                .property("Location", TypeRef::structure("Vector"))
                .property("Corners", TypeRef::fixed_array(TypeRef::Int, 2))
                .property("Notes", TypeRef::array(TypeRef::Str))
                .property("Weights", TypeRef::map(TypeRef::Name, TypeRef::Float))
                .field(ureflect::FieldDef::Property(
                    PropertyDef::new("Slots", TypeRef::Int).array_dim(3),
                ))
                .field(ureflect::FieldDef::Property(
                    PropertyDef::new("Scratch", TypeRef::Int).flags(PropertyFlags::TRANSIENT),
                )),
        )
        .unwrap();
    registry.resolve("Inventory").unwrap()
}

fn assert_same(layout: &StructLayout, left: &PropertyDataBlock, right: &PropertyDataBlock) {
    for prop in layout.properties() {
        for index in 0..prop.array_dim() {
            assert_eq!(
                left.value(prop, index).unwrap(),
                right.value(prop, index).unwrap(),
                "{}[{index}]",
                prop.name()
            );
        }
    }
}

#[test]
fn written_values_read_back_identically() {
    let mut package = package();
    let mut registry = StructRegistry::with_builtins();
    let layout = inventory(&mut registry);
    let prop = |name: &str| layout.find_property(name).unwrap().clone();

    let defaults = PropertyDataBlock::new_default(layout.clone(), None).unwrap();
    let mut block = PropertyDataBlock::new_instance(&defaults).unwrap();
    let owner = package.objects().resolve(ObjectRef::export(0)).unwrap();
    let tag = package.names_mut().intern("Pickup");

    block.set_bool(&prop("bCharged"), 0, true).unwrap();
    block.set_int(&prop("Health"), 0, -250).unwrap();
    block.set_float(&prop("Speed"), 0, 1.25).unwrap();
    block.set_byte(&prop("Charge"), 0, 200).unwrap();
    block.set_name(&prop("Tag"), 0, tag).unwrap();
    block.set_str(&prop("Label"), 0, "caf\u{e9} \u{263a}").unwrap();
    block.set_object(&prop("Owner"), 0, owner).unwrap();
    block
        .set_value(
            &prop("Location"),
            0,
            &Value::Struct(vec![
                ("X".into(), vec![Value::Float(1.0)]),
                ("Z".into(), vec![Value::Float(-3.5)]),
            ]),
        )
        .unwrap();
    block
        .set_value(&prop("Corners"), 0, &Value::Array(vec![Value::Int(7), Value::Int(8)]))
        .unwrap();
    block
        .set_value(
            &prop("Notes"),
            0,
            &Value::Array(vec![Value::Str("first".into()), Value::Str(String::new())]),
        )
        .unwrap();
    block
        .set_value(
            &prop("Weights"),
            0,
            &Value::Map(vec![(Value::Name(tag), Value::Float(0.5))]),
        )
        .unwrap();
    block.set_int(&prop("Slots"), 2, 99).unwrap();
    block.set_int(&prop("Scratch"), 0, 5).unwrap();

    let mut writer = PackageWriter::new();
    let written =
        write_properties(&block, Some(&defaults), package.names_mut(), &mut writer).unwrap();
    // everything set above except the transient Scratch
    assert_eq!(written, 12);

    let bytes = writer.into_bytes();
    let mut fresh = PropertyDataBlock::new_instance(&defaults).unwrap();
    let mut stream = package.stream(&bytes);
    let report = read_properties(&mut fresh, &mut stream).unwrap();
    assert_eq!(report.loaded, 12);
    assert!(report.skipped.is_empty());
    assert_eq!(stream.remaining(), 0);

    assert_eq!(fresh.get_int(&prop("Scratch"), 0).unwrap(), 0);
    fresh.set_int(&prop("Scratch"), 0, 5).unwrap();
    assert_same(&layout, &fresh, &block);
    assert_eq!(
        fresh.print_value(&prop("Owner"), 0, &package).unwrap(),
        "Class'Pawn'"
    );
    assert_eq!(
        fresh.print_value(&prop("Location"), 0, &package).unwrap(),
        "(X=1.000000,Y=0.000000,Z=-3.500000)"
    );
}

#[test]
fn without_defaults_every_value_is_written() {
    let mut package = package();
    let mut registry = StructRegistry::with_builtins();
    let layout = inventory(&mut registry);
    let block = PropertyDataBlock::new_default(layout.clone(), None).unwrap();

    let mut writer = PackageWriter::new();
    let written = write_properties(&block, None, package.names_mut(), &mut writer).unwrap();
    // 13 non-transient properties, Slots counted per element
    assert_eq!(written, 15);

    let bytes = writer.into_bytes();
    let mut fresh = PropertyDataBlock::new_default(layout.clone(), None).unwrap();
    let report = read_properties(&mut fresh, &mut package.stream(&bytes)).unwrap();
    assert_eq!(report.loaded, 15);
    assert_same(&layout, &fresh, &block);
}

#[test]
fn unknown_properties_are_skipped() {
    let mut package = package();
    let mut registry = StructRegistry::with_builtins();
    let layout = inventory(&mut registry);
    let ghost = package.names_mut().intern("Ghost");
    let phantom = package.names_mut().intern("Phantom");
    let vector = package.names_mut().intern("Vector");
    let health = package.names_mut().intern("Health");

    let mut writer = PackageWriter::new();
    PropertyTag {
        name: ghost,
        tag: TypeTag::Str,
        size: 6,
        array_index: 0,
        struct_name: None,
        bool_value: false,
    }
    .write(&mut writer)
    .unwrap();
    writer.write_string("boo!");
    PropertyTag {
        name: phantom,
        tag: TypeTag::Struct,
        size: 12,
        array_index: 0,
        struct_name: Some(vector),
        bool_value: false,
    }
    .write(&mut writer)
    .unwrap();
    writer.write_bytes(&[0; 12]);
    PropertyTag {
        name: health,
        tag: TypeTag::Int,
        size: 4,
        array_index: 0,
        struct_name: None,
        bool_value: false,
    }
    .write(&mut writer)
    .unwrap();
    writer.write_i32(42);
    writer.write_name(NameId(0));

    let bytes = writer.into_bytes();
    let mut block = PropertyDataBlock::new_default(layout.clone(), None).unwrap();
    let report = read_properties(&mut block, &mut package.stream(&bytes)).unwrap();
    assert_eq!(report.skipped, vec!["Ghost".to_string(), "Phantom".to_string()]);
    assert_eq!(report.loaded, 1);
    assert_eq!(
        block
            .get_int(layout.find_property("Health").unwrap(), 0)
            .unwrap(),
        42
    );
}

#[test]
fn tag_mismatch_aborts_the_load() {
    let mut package = package();
    let mut registry = StructRegistry::with_builtins();
    let layout = inventory(&mut registry);
    let health = package.names_mut().intern("Health");

    let mut writer = PackageWriter::new();
    PropertyTag {
        name: health,
        tag: TypeTag::Float,
        size: 4,
        array_index: 0,
        struct_name: None,
        bool_value: false,
    }
    .write(&mut writer)
    .unwrap();
    writer.write_f32(1.0);
    writer.write_name(NameId(0));

    let bytes = writer.into_bytes();
    let mut block = PropertyDataBlock::new_default(layout, None).unwrap();
    assert_eq!(
        read_properties(&mut block, &mut package.stream(&bytes)),
        Err(PropertyError::TypeMismatch {
            property: "Health".into(),
            expected: TypeTag::Int,
            found: TypeTag::Float,
        })
    );
}

#[test]
fn header_checks_are_enforced() {
    let mut package = package();
    let mut registry = StructRegistry::with_builtins();
    let layout = inventory(&mut registry);
    let health = package.names_mut().intern("Health");
    let slots = package.names_mut().intern("Slots");

    let mut writer = PackageWriter::new();
    PropertyTag {
        name: slots,
        tag: TypeTag::Int,
        size: 4,
        array_index: 3,
        struct_name: None,
        bool_value: false,
    }
    .write(&mut writer)
    .unwrap();
    writer.write_i32(1);
    let bytes = writer.into_bytes();
    let mut block = PropertyDataBlock::new_default(layout.clone(), None).unwrap();
    assert!(matches!(
        read_properties(&mut block, &mut package.stream(&bytes)),
        Err(PropertyError::ArrayIndexOutOfRange { index: 3, .. })
    ));

    let mut writer = PackageWriter::new();
    PropertyTag {
        name: health,
        tag: TypeTag::Int,
        size: 2,
        array_index: 0,
        struct_name: None,
        bool_value: false,
    }
    .write(&mut writer)
    .unwrap();
    writer.write_i32(1);
    writer.write_name(NameId(0));
    let bytes = writer.into_bytes();
    assert!(matches!(
        read_properties(&mut block, &mut package.stream(&bytes)),
        Err(PropertyError::SizeMismatch {
            declared: 2,
            consumed: 4,
            ..
        })
    ));
}

#[test]
fn shadowed_struct_entry_targets_the_derived_declaration() {
    let mut package = package();
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
    let base_region = layout.find_tagged("Region", false).unwrap().clone();
    let struct_region = layout.find_tagged("Region", true).unwrap().clone();

    let mut block = PropertyDataBlock::new_default(layout.clone(), None).unwrap();
    block.set_int(&base_region, 0, 11).unwrap();
    block
        .set_value(
            &struct_region,
            0,
            &Value::Struct(vec![("Y".into(), vec![Value::Float(2.0)])]),
        )
        .unwrap();

    let mut writer = PackageWriter::new();
    write_properties(&block, None, package.names_mut(), &mut writer).unwrap();
    let bytes = writer.into_bytes();

    let mut fresh = PropertyDataBlock::new_default(layout.clone(), None).unwrap();
    read_properties(&mut fresh, &mut package.stream(&bytes)).unwrap();
    assert_eq!(fresh.get_int(&base_region, 0).unwrap(), 11);
    assert_eq!(
        fresh.value(&struct_region, 0).unwrap(),
        block.value(&struct_region, 0).unwrap()
    );
}

#[test]
fn bool_arrays_cannot_be_written() {
    let mut package = package();
    let mut registry = StructRegistry::new();
    registry
        .register(StructDef::new("Switches").field(ureflect::FieldDef::Property(
            PropertyDef::new("bLit", TypeRef::Bool).array_dim(2),
        )))
        .unwrap();
    let layout = registry.resolve("Switches").unwrap();
    let mut block = PropertyDataBlock::new_default(layout.clone(), None).unwrap();
    block
        .set_bool(layout.find_property("bLit").unwrap(), 1, true)
        .unwrap();
    assert!(matches!(
        write_properties(&block, None, package.names_mut(), &mut PackageWriter::new()),
        Err(PropertyError::UnsupportedBoolArray { .. })
    ));
}

#[test]
fn float_deltas_follow_the_stored_bits() {
    let mut package = package();
    let mut registry = StructRegistry::with_builtins();
    let layout = inventory(&mut registry);
    let speed = layout.find_property("Speed").unwrap().clone();

    let defaults = PropertyDataBlock::new_default(layout.clone(), None).unwrap();
    let mut block = PropertyDataBlock::new_instance(&defaults).unwrap();
    block.set_float(&speed, 0, -0.0).unwrap();

    let mut writer = PackageWriter::new();
    let written =
        write_properties(&block, Some(&defaults), package.names_mut(), &mut writer).unwrap();
    assert_eq!(written, 1);
    let bytes = writer.into_bytes();
    let mut fresh = PropertyDataBlock::new_instance(&defaults).unwrap();
    read_properties(&mut fresh, &mut package.stream(&bytes)).unwrap();
    assert_eq!(fresh.get_float(&speed, 0).unwrap().to_bits(), 0x8000_0000);

    let mut nan_defaults = PropertyDataBlock::new_default(layout.clone(), None).unwrap();
    nan_defaults.set_float(&speed, 0, f32::NAN).unwrap();
    let block = PropertyDataBlock::new_instance(&nan_defaults).unwrap();
    let written = write_properties(
        &block,
        Some(&nan_defaults),
        package.names_mut(),
        &mut PackageWriter::new(),
    )
    .unwrap();
    assert_eq!(written, 0);
}

#[test]
fn none_terminator_need_not_be_the_first_name() {
    let names = NameTable::from_names(["Core", "Health", "None", "Speed"]);
    let mut package = Package::with_tables(69, names, ObjectTable::default());
    let mut registry = StructRegistry::with_builtins();
    let layout = inventory(&mut registry);

    let mut writer = PackageWriter::new();
    PropertyTag {
        name: NameId(1),
        tag: TypeTag::Int,
        size: 4,
        array_index: 0,
        struct_name: None,
        bool_value: false,
    }
    .write(&mut writer)
    .unwrap();
    writer.write_i32(17);
    // "Core" is an ordinary name here
    PropertyTag {
        name: NameId(0),
        tag: TypeTag::Int,
        size: 4,
        array_index: 0,
        struct_name: None,
        bool_value: false,
    }
    .write(&mut writer)
    .unwrap();
    writer.write_i32(0);
    writer.write_name(NameId(2));
    let bytes = writer.into_bytes();

    let mut block = PropertyDataBlock::new_default(layout.clone(), None).unwrap();
    let mut stream = package.stream(&bytes);
    let report = read_properties(&mut block, &mut stream).unwrap();
    assert_eq!(report.loaded, 1);
    assert_eq!(report.skipped, vec!["Core".to_string()]);
    assert_eq!(stream.remaining(), 0);
    let health = layout.find_property("Health").unwrap();
    assert_eq!(block.get_int(health, 0).unwrap(), 17);

    // written streams end with the table's own None entry
    block.set_float(layout.find_property("Speed").unwrap(), 0, 2.5).unwrap();
    let defaults = PropertyDataBlock::new_default(layout.clone(), None).unwrap();
    let mut writer = PackageWriter::new();
    write_properties(&block, Some(&defaults), package.names_mut(), &mut writer).unwrap();
    assert_eq!(package.names().len(), 4);
    let bytes = writer.into_bytes();
    assert_eq!(bytes.last(), Some(&0x02));

    let mut fresh = PropertyDataBlock::new_default(layout.clone(), None).unwrap();
    let report = read_properties(&mut fresh, &mut package.stream(&bytes)).unwrap();
    assert_eq!(report.loaded, 2);
    assert_eq!(fresh.get_int(health, 0).unwrap(), 17);
}
