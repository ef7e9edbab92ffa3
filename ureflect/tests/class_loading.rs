use std::io::Write;

use tempfile::NamedTempFile;
use ureflect::ureflect_stream::{Package, PackageWriter};
use ureflect::{
    BytecodeError, ClassObject, Error, OffsetTable, PropertyDataBlock, Schema, StructRegistry,
    write_properties,
};

const SCHEMA: &str = r#"{
  "structs": [
    { "name": "Actor", "fields": [
        { "field": "property", "name": "bHidden", "type": { "kind": "bool" } },
        { "field": "property", "name": "Location", "type": { "kind": "struct", "name": "Vector" } },
        { "field": "property", "name": "Tag", "type": { "kind": "name" } } ] },
    { "name": "Pawn", "base": "Actor", "fields": [
        { "field": "property", "name": "Health", "type": { "kind": "int" } },
        { "field": "property", "name": "Enemies", "type": { "kind": "array",
            "inner": { "kind": "object", "class": "Pawn" } } } ] }
  ]
}"#;

fn registry() -> StructRegistry {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(SCHEMA.as_bytes()).unwrap();
    let schema = Schema::from_path(file.path()).unwrap();

    let mut registry = StructRegistry::with_builtins();
    registry.register_schema(schema).unwrap();
    registry.resolve_all().unwrap();
    registry
}

/// Serialize the non-default values of `block` as a class body.
fn class_body(
    package: &mut Package,
    script: &[u8],
    block: &PropertyDataBlock,
    defaults: Option<&PropertyDataBlock>,
) -> Vec<u8> {
    let mut writer = PackageWriter::new();
    writer.write_bytes(script);
    write_properties(block, defaults, package.names_mut(), &mut writer).unwrap();
    writer.into_bytes().to_vec()
}

#[test]
fn class_defaults_flow_into_derived_classes_and_instances() {
    let registry = registry();
    let actor = registry.get("Actor").unwrap();
    let pawn = registry.get("Pawn").unwrap();
    let mut package = Package::new(69);

    let mut actor_values = PropertyDataBlock::new_default(actor.clone(), None).unwrap();
    actor_values
        .set_bool(actor.find_property("bHidden").unwrap(), 0, true)
        .unwrap();
    let actor_body = class_body(&mut package, &[], &actor_values, None);

    let mut pawn_values = PropertyDataBlock::new_default(pawn.clone(), Some(&actor_values)).unwrap();
    pawn_values
        .set_int(pawn.find_property("Health").unwrap(), 0, 100)
        .unwrap();
    let pawn_body = class_body(&mut package, &[0x04, 0x0b], &pawn_values, Some(&actor_values));

    let actor_class = ClassObject::load(actor.clone(), None, &mut package.stream(&actor_body), 0).unwrap();
    assert!(actor_class.script().is_none());

    let mut stream = package.stream(&pawn_body);
    let pawn_class = ClassObject::load(pawn.clone(), Some(&actor_class), &mut stream, 2).unwrap();
    assert_eq!(stream.remaining(), 0);
    assert_eq!(pawn_class.name(), "Pawn");
    // Health plus the empty Enemies array, which the base defaults do not cover
    assert_eq!(pawn_class.report().loaded, 2);
    assert_eq!(pawn_class.script().map(|script| script.bytes()), Some(&[0x04, 0x0b][..]));

    let defaults = pawn_class.defaults();
    assert!(defaults.get_bool(pawn.find_property("bHidden").unwrap(), 0).unwrap());
    assert_eq!(defaults.get_int(pawn.find_property("Health").unwrap(), 0).unwrap(), 100);

    let instance = pawn_class.instantiate().unwrap();
    for prop in pawn.properties() {
        assert!(instance.identical(prop, 0, defaults).unwrap(), "{}", prop.name());
    }

    let offsets = OffsetTable::build(&registry);
    assert_eq!(offsets.offset_of("Pawn", "Health"), Some(24));
    assert_eq!(offsets.offset_of("pawn", "enemies"), Some(32));
}

#[test]
fn failures_name_the_class() {
    let registry = registry();
    let pawn = registry.get("Pawn").unwrap();
    let package = Package::new(69);

    let err = ClassObject::load(pawn, None, &mut package.stream(&[0x04]), 2).unwrap_err();
    match err {
        Error::Class { class, source } => {
            assert_eq!(class, "Pawn");
            assert!(matches!(
                *source,
                Error::Bytecode(BytecodeError::LengthMismatch { declared: 2, .. })
            ));
        }
        other => panic!("unexpected error {other}"),
    }
}
