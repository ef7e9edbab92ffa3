use serde::Serialize;
use ureflect_stream::{NameId, ObjectHandle, Package};

/// Owned snapshot of one property element.
///
/// Struct values list members in layout order, each with one value per
/// array element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Byte(u8),
    Int(i32),
    Bool(bool),
    Float(f32),
    Name(NameId),
    Object(ObjectHandle),
    Str(String),
    Struct(Vec<(String, Vec<Value>)>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Byte(_) => "byte",
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Float(_) => "float",
            Value::Name(_) => "name",
            Value::Object(_) => "object",
            Value::Str(_) => "str",
            Value::Struct(_) => "struct",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Text form in the runtime's config syntax, e.g. `(X=1.000000,Y=0.000000)`.
    pub fn render(&self, package: &Package) -> String {
        match self {
            Value::Byte(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Float(v) => format!("{v:.6}"),
            Value::Name(id) => package.names().get(*id).unwrap_or("None").to_string(),
            Value::Object(handle) => package.objects().describe(*handle, package.names()),
            Value::Str(text) => format!("\"{text}\""),
            Value::Struct(members) => {
                let mut parts = Vec::new();
                for (name, values) in members {
                    if let [single] = values.as_slice() {
                        parts.push(format!("{name}={}", single.render(package)));
                    } else {
                        for (index, item) in values.iter().enumerate() {
                            parts.push(format!("{name}[{index}]={}", item.render(package)));
                        }
                    }
                }
                format!("({})", parts.join(","))
            }
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(|item| item.render(package)).collect();
                format!("({})", parts.join(","))
            }
            Value::Map(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(key, value)| format!("{}={}", key.render(package), value.render(package)))
                    .collect();
                format!("({})", parts.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_nested_values() {
        let mut package = Package::new(69);
        let tag = package.names_mut().intern("Tag");
        let value = Value::Struct(vec![
            ("X".into(), vec![Value::Float(1.0)]),
            ("Flags".into(), vec![Value::Bool(true), Value::Bool(false)]),
            ("Tag".into(), vec![Value::Name(tag)]),
        ]);
        assert_eq!(
            value.render(&package),
            "(X=1.000000,Flags[0]=True,Flags[1]=False,Tag=Tag)"
        );
        assert_eq!(Value::Object(ObjectHandle::NULL).render(&package), "None");
        assert_eq!(
            Value::Array(vec![Value::Str("a".into()), Value::Int(-2)]).render(&package),
            "(\"a\",-2)"
        );
    }
}
