//! value representation
//!
//! The template output model contains the following data types
//! - boolean (true/false)
//! - integer (signed, i64)
//! - string (utf-8)
//! - array ("list" of values)
//! - object (order-preserving "map"/"dictionary", where the key is of type string)
//! - intrinsic functions understood by the provisioning engine (`Ref`, `Fn::GetAtt`, `Fn::Sub`, ...)
//!
//! Additionally:
//! - there is no `null`/`None` value. An absent property is simply not inserted, use [Value::no_value] to
//!   drop a property from inside a `Fn::If`.
//! - intrinsics are serialized in their canonical single-key-object form, e.g. `{"Ref": "Vpc"}`
//!
use serde::{
    ser::{SerializeMap, SerializeSeq},
    Serializer,
};

/// Order preserving object
pub type Object = indexmap::IndexMap<String, Value>;

/// Pseudo parameters that can always be referenced
pub const PSEUDO_PARAMETERS: &[&str] = &[
    "AWS::AccountId",
    "AWS::NoValue",
    "AWS::Partition",
    "AWS::Region",
    "AWS::StackId",
    "AWS::StackName",
    "AWS::URLSuffix",
];

pub fn is_pseudo_parameter(id: &str) -> bool {
    PSEUDO_PARAMETERS.contains(&id)
}

/// All possible value types
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    String(String),
    Array(Vec<Value>),
    Object(Object),

    /// `{"Ref": id}`
    Ref(String),
    /// `{"Fn::GetAtt": [id, attribute]}`
    GetAtt(String, String),
    /// `{"Fn::Sub": template}` or `{"Fn::Sub": [template, variables]}` when variables are given
    Sub(String, Object),
    /// `{"Fn::Join": [separator, values]}`
    Join(String, Vec<Value>),
    /// `{"Fn::FindInMap": [map, top level key, second level key]}`
    FindInMap(String, Box<Value>, Box<Value>),
    /// `{"Fn::If": [condition, true value, false value]}`
    If(String, Box<Value>, Box<Value>),
    /// `{"Fn::Equals": [lhs, rhs]}`
    Equals(Box<Value>, Box<Value>),
    /// `{"Fn::Not": [value]}`
    Not(Box<Value>),
    /// `{"Fn::And": [values]}`
    And(Vec<Value>),
    /// `{"Fn::Select": [index, list]}`
    Select(u32, Box<Value>),
    /// `{"Fn::GetAZs": region}`
    GetAzs(Box<Value>),
    /// `{"Fn::Cidr": [block, count, bits]}`
    Cidr(Box<Value>, u32, u32),
    /// `{"Fn::Base64": value}`
    Base64(Box<Value>),
    /// `{"Condition": name}`
    Condition(String),
}

impl Value {
    pub fn reference(id: impl Into<String>) -> Self {
        Value::Ref(id.into())
    }

    pub fn get_att(id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Value::GetAtt(id.into(), attribute.into())
    }

    pub fn sub(template: impl Into<String>) -> Self {
        Value::Sub(template.into(), Object::default())
    }

    pub fn sub_with(template: impl Into<String>, variables: Object) -> Self {
        Value::Sub(template.into(), variables)
    }

    pub fn join(separator: impl Into<String>, values: Vec<Value>) -> Self {
        Value::Join(separator.into(), values)
    }

    pub fn if_(condition: impl Into<String>, when_true: Value, when_false: Value) -> Self {
        Value::If(condition.into(), Box::new(when_true), Box::new(when_false))
    }

    pub fn equals(lhs: impl Into<Value>, rhs: impl Into<Value>) -> Self {
        Value::Equals(Box::new(lhs.into()), Box::new(rhs.into()))
    }

    pub fn not(value: Value) -> Self {
        Value::Not(Box::new(value))
    }

    pub fn and(values: Vec<Value>) -> Self {
        Value::And(values)
    }

    pub fn condition(name: impl Into<String>) -> Self {
        Value::Condition(name.into())
    }

    pub fn select(index: u32, list: Value) -> Self {
        Value::Select(index, Box::new(list))
    }

    pub fn find_in_map(map: impl Into<String>, top: Value, second: Value) -> Self {
        Value::FindInMap(map.into(), Box::new(top), Box::new(second))
    }

    /// Availability zone `index` of the current region
    pub fn availability_zone(index: u32) -> Self {
        Value::select(index, Value::GetAzs(Box::new("".into())))
    }

    pub fn cidr(block: Value, count: u32, bits: u32) -> Self {
        Value::Cidr(Box::new(block), count, bits)
    }

    pub fn base64(value: Value) -> Self {
        Value::Base64(Box::new(value))
    }

    /// `{"Ref": "AWS::NoValue"}`
    pub fn no_value() -> Self {
        Value::Ref("AWS::NoValue".to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }
}

/// Build a [Value::Object] from `"key" => value` pairs, keeping the given order
///
/// ```
/// # use zulip_stack::object;
/// let tag = object! {
///   "Key" => "Name",
///   "Value" => "zulip",
/// };
/// ```
#[macro_export]
macro_rules! object {
    { $($key:expr => $value:expr),* $(,)? } => {{
        #[allow(unused_mut)]
        let mut object = $crate::value::Object::new();
        $(
            object.insert($key.to_string(), $crate::value::Value::from($value));
        )*
        $crate::value::Value::Object(object)
    }};
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::String(value.clone())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Self::Integer(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(value.into())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<K: ToString, V: Into<Value>> From<indexmap::IndexMap<K, V>> for Value {
    fn from(value: indexmap::IndexMap<K, V>) -> Self {
        Value::Object(
            value
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.into()))
                .collect(),
        )
    }
}

/// Serialize a single key object such as `{"Ref": "Vpc"}`
fn intrinsic<S, V>(serializer: S, key: &str, value: &V) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    V: serde::Serialize + ?Sized,
{
    let mut ser = serializer.serialize_map(Some(1))?;
    ser.serialize_entry(key, value)?;
    ser.end()
}

impl serde::ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Boolean(value) => serializer.serialize_bool(*value),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::String(value) => serializer.serialize_str(value),
            Value::Array(value) => {
                let mut ser = serializer.serialize_seq(Some(value.len()))?;
                for element in value {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            Value::Object(value) => {
                let mut ser = serializer.serialize_map(Some(value.len()))?;
                for (element_key, element_value) in value {
                    ser.serialize_entry(element_key, element_value)?;
                }
                ser.end()
            }
            Value::Ref(id) => intrinsic(serializer, "Ref", id),
            Value::GetAtt(id, attribute) => intrinsic(serializer, "Fn::GetAtt", &(id, attribute)),
            Value::Sub(template, variables) if variables.is_empty() => {
                intrinsic(serializer, "Fn::Sub", template)
            }
            Value::Sub(template, variables) => {
                intrinsic(serializer, "Fn::Sub", &(template, variables))
            }
            Value::Join(separator, values) => {
                intrinsic(serializer, "Fn::Join", &(separator, values))
            }
            Value::FindInMap(map, top, second) => {
                intrinsic(serializer, "Fn::FindInMap", &(map, top, second))
            }
            Value::If(condition, when_true, when_false) => {
                intrinsic(serializer, "Fn::If", &(condition, when_true, when_false))
            }
            Value::Equals(lhs, rhs) => intrinsic(serializer, "Fn::Equals", &(lhs, rhs)),
            Value::Not(value) => intrinsic(serializer, "Fn::Not", std::slice::from_ref(value)),
            Value::And(values) => intrinsic(serializer, "Fn::And", values),
            Value::Select(index, list) => intrinsic(serializer, "Fn::Select", &(index, list)),
            Value::GetAzs(region) => intrinsic(serializer, "Fn::GetAZs", region),
            Value::Cidr(block, count, bits) => {
                intrinsic(serializer, "Fn::Cidr", &(block, count, bits))
            }
            Value::Base64(value) => intrinsic(serializer, "Fn::Base64", value),
            Value::Condition(name) => intrinsic(serializer, "Condition", name),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn json(value: &Value) -> serde_json::Value {
        serde_json::to_value(value).expect("value serializes")
    }

    #[test]
    fn intrinsics_use_canonical_form() {
        assert_eq!(
            json(&Value::get_att("AppAlb", "DNSName")),
            serde_json::json!({"Fn::GetAtt": ["AppAlb", "DNSName"]})
        );
        assert_eq!(
            json(&Value::not(Value::equals(Value::reference("Zone"), ""))),
            serde_json::json!({"Fn::Not": [{"Fn::Equals": [{"Ref": "Zone"}, ""]}]})
        );
        assert_eq!(
            json(&Value::availability_zone(1)),
            serde_json::json!({"Fn::Select": [1, {"Fn::GetAZs": ""}]})
        );
    }

    #[test]
    fn sub_without_variables_is_a_plain_string() {
        assert_eq!(
            json(&Value::sub("${AWS::StackName}/AlbSg")),
            serde_json::json!({"Fn::Sub": "${AWS::StackName}/AlbSg"})
        );

        let variables = match object! { "Name" => Value::reference("Hostname") } {
            Value::Object(object) => object,
            _ => unreachable!(),
        };
        assert_eq!(
            json(&Value::sub_with("https://${Name}", variables)),
            serde_json::json!({"Fn::Sub": ["https://${Name}", {"Name": {"Ref": "Hostname"}}]})
        );
    }

    #[test]
    fn object_macro_keeps_order() {
        let value = object! {
            "Zeta" => 1i64,
            "Alpha" => true,
            "Mid" => "x",
        };
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"{"Zeta":1,"Alpha":true,"Mid":"x"}"#
        );
    }
}
