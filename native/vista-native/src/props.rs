//! Component props and their wire form.
//!
//! Props crossing into the browser are JSON plus two tagged values:
//! `{"__type":"Date","value":<ISO-8601>}` and `{"__type":"undefined"}`.
//! Functions and elements never cross; `children` is rendered on the
//! server and travels as markup instead.

use crate::element::Element;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

const TYPE_TAG: &str = "__type";

#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<PropValue>),
    Object(BTreeMap<String, PropValue>),
    Date(DateTime<Utc>),
    Undefined,
    /// A callback; only its name is kept, for diagnostics.
    Function(String),
    Element(Element),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Functions and elements are not transferable.
    pub fn is_transferable(&self) -> bool {
        !matches!(self, PropValue::Function(_) | PropValue::Element(_))
    }

    /// Wire form, or `None` for values that do not cross. Inside arrays a
    /// dropped value becomes `null`; inside objects its key is removed.
    pub fn to_wire(&self) -> Option<Value> {
        Some(match self {
            PropValue::Null => Value::Null,
            PropValue::Bool(b) => Value::Bool(*b),
            PropValue::Number(n) => Value::Number(n.clone()),
            PropValue::String(s) => Value::String(s.clone()),
            PropValue::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.to_wire().unwrap_or(Value::Null))
                    .collect(),
            ),
            PropValue::Object(entries) => Value::Object(
                entries
                    .iter()
                    .filter_map(|(k, v)| v.to_wire().map(|v| (k.clone(), v)))
                    .collect(),
            ),
            PropValue::Date(date) => {
                let mut tagged = Map::new();
                tagged.insert(TYPE_TAG.to_string(), Value::String("Date".to_string()));
                tagged.insert(
                    "value".to_string(),
                    Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
                );
                Value::Object(tagged)
            }
            PropValue::Undefined => {
                let mut tagged = Map::new();
                tagged.insert(TYPE_TAG.to_string(), Value::String("undefined".to_string()));
                Value::Object(tagged)
            }
            PropValue::Function(_) | PropValue::Element(_) => return None,
        })
    }

    /// Inverse of [`PropValue::to_wire`]. Unrecognised tags pass through as
    /// plain objects.
    pub fn from_wire(value: &Value) -> PropValue {
        match value {
            Value::Null => PropValue::Null,
            Value::Bool(b) => PropValue::Bool(*b),
            Value::Number(n) => PropValue::Number(n.clone()),
            Value::String(s) => PropValue::String(s.clone()),
            Value::Array(items) => PropValue::Array(items.iter().map(PropValue::from_wire).collect()),
            Value::Object(map) => {
                if let Some(tagged) = decode_tagged(map) {
                    return tagged;
                }
                PropValue::Object(
                    map.iter()
                        .map(|(k, v)| (k.clone(), PropValue::from_wire(v)))
                        .collect(),
                )
            }
        }
    }
}

fn decode_tagged(map: &Map<String, Value>) -> Option<PropValue> {
    match map.get(TYPE_TAG)?.as_str()? {
        "undefined" if map.len() == 1 => Some(PropValue::Undefined),
        "Date" if map.len() == 2 => {
            let raw = map.get("value")?.as_str()?;
            let parsed = DateTime::parse_from_rfc3339(raw).ok()?;
            Some(PropValue::Date(parsed.with_timezone(&Utc)))
        }
        _ => None,
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        PropValue::String(v.to_string())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        PropValue::String(v)
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        PropValue::Bool(v)
    }
}

impl From<i32> for PropValue {
    fn from(v: i32) -> Self {
        PropValue::Number(Number::from(v))
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        PropValue::Number(Number::from(v))
    }
}

impl From<f64> for PropValue {
    /// Non-finite numbers become `null`, as in JSON.
    fn from(v: f64) -> Self {
        Number::from_f64(v).map_or(PropValue::Null, PropValue::Number)
    }
}

impl From<DateTime<Utc>> for PropValue {
    fn from(v: DateTime<Utc>) -> Self {
        PropValue::Date(v)
    }
}

impl From<Element> for PropValue {
    fn from(v: Element) -> Self {
        PropValue::Element(v)
    }
}

impl From<Value> for PropValue {
    fn from(v: Value) -> Self {
        PropValue::from_wire(&v)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props {
    pub values: BTreeMap<String, PropValue>,
    pub children: Option<Element>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with_children(mut self, children: Element) -> Self {
        self.children = Some(children);
        self
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(PropValue::as_str)
    }

    /// Children or an empty fragment.
    pub fn children(&self) -> Element {
        self.children.clone().unwrap_or_else(Element::empty)
    }

    /// Props as they are embedded in a client reference.
    pub fn to_wire(&self) -> Map<String, Value> {
        self.values
            .iter()
            .filter(|(_, v)| v.is_transferable())
            .filter_map(|(k, v)| v.to_wire().map(|v| (k.clone(), v)))
            .collect()
    }

    pub fn from_wire(map: &Map<String, Value>) -> Self {
        Self {
            values: map
                .iter()
                .map(|(k, v)| (k.clone(), PropValue::from_wire(v)))
                .collect(),
            children: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_date_wire_form() {
        let date = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let wire = PropValue::Date(date).to_wire().unwrap();
        assert_eq!(wire, json!({"__type": "Date", "value": "2024-05-06T07:08:09.000Z"}));
        assert_eq!(PropValue::from_wire(&wire), PropValue::Date(date));
    }

    #[test]
    fn test_undefined_round_trip() {
        let wire = PropValue::Undefined.to_wire().unwrap();
        assert_eq!(wire, json!({"__type": "undefined"}));
        assert_eq!(PropValue::from_wire(&wire), PropValue::Undefined);
    }

    #[test]
    fn test_nested_tagged_values_round_trip() {
        let date = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let value = PropValue::Object(BTreeMap::from([
            ("when".to_string(), PropValue::Date(date)),
            (
                "list".to_string(),
                PropValue::Array(vec![PropValue::Undefined, PropValue::from(3)]),
            ),
        ]));
        let wire = value.to_wire().unwrap();
        assert_eq!(PropValue::from_wire(&wire), value);
    }

    #[test]
    fn test_unknown_tags_pass_through() {
        let wire = json!({"__type": "Map", "entries": []});
        assert!(matches!(PropValue::from_wire(&wire), PropValue::Object(_)));
        let bad_date = json!({"__type": "Date", "value": "yesterday"});
        assert!(matches!(PropValue::from_wire(&bad_date), PropValue::Object(_)));
    }

    #[test]
    fn test_client_props_drop_functions_elements_and_children() {
        let props = Props::new()
            .with("label", "Go")
            .with("count", 2)
            .with("onClick", PropValue::Function("handle".into()))
            .with("icon", Element::tag("svg"))
            .with("nested", PropValue::Array(vec![PropValue::Function("f".into())]))
            .with_children(Element::text("child"));
        let wire = props.to_wire();
        assert_eq!(
            Value::Object(wire),
            json!({"label": "Go", "count": 2, "nested": [null]})
        );
    }

    #[test]
    fn test_non_finite_numbers_become_null() {
        assert_eq!(PropValue::from(f64::NAN), PropValue::Null);
        assert_eq!(PropValue::from(1.5).to_wire(), Some(json!(1.5)));
    }
}
