//! Fluent shape schemas.
//!
//! ```
//! use routekit::schema::{integer, object, string};
//!
//! let schema = object()
//!     .field("name", string().required().min(2))
//!     .field("age", integer().min(0));
//! ```
//!
//! Unless a field is `strict()`, scalar values are cast before checks:
//! strings accept numbers and booleans, numbers accept numeric strings and
//! booleans accept `"true"`/`"false"`.

use async_trait::async_trait;
use serde_json::{Map, Number, Value};

pub use regex::Regex;

use super::SchemaAdapter;
use crate::problem::ValidationError;

#[derive(Debug, Clone)]
enum Kind {
    String,
    Number,
    Integer,
    Boolean,
    Mixed,
    Array(Box<ShapeSchema>),
    Object(ObjectShape),
}

impl Kind {
    fn type_name(&self) -> &'static str {
        match self {
            Kind::String => "string",
            Kind::Number | Kind::Integer => "number",
            Kind::Boolean => "boolean",
            Kind::Mixed => "mixed",
            Kind::Array(_) => "array",
            Kind::Object(_) => "object",
        }
    }
}

/// One field of a shape: its kind plus modifiers.
#[derive(Debug, Clone)]
pub struct ShapeSchema {
    kind: Kind,
    required: bool,
    nullable: bool,
    strict: bool,
    min: Option<f64>,
    max: Option<f64>,
    one_of: Vec<Value>,
    pattern: Option<Regex>,
}

pub fn string() -> ShapeSchema {
    ShapeSchema::of(Kind::String)
}

pub fn number() -> ShapeSchema {
    ShapeSchema::of(Kind::Number)
}

pub fn integer() -> ShapeSchema {
    ShapeSchema::of(Kind::Integer)
}

pub fn boolean() -> ShapeSchema {
    ShapeSchema::of(Kind::Boolean)
}

/// Any value.
pub fn mixed() -> ShapeSchema {
    ShapeSchema::of(Kind::Mixed)
}

pub fn array(of: impl Into<ShapeSchema>) -> ShapeSchema {
    ShapeSchema::of(Kind::Array(Box::new(of.into())))
}

pub fn object() -> ObjectShape {
    ObjectShape::default()
}

impl ShapeSchema {
    fn of(kind: Kind) -> Self {
        Self {
            kind,
            required: false,
            nullable: false,
            strict: false,
            min: None,
            max: None,
            one_of: Vec::new(),
            pattern: None,
        }
    }

    /// Absent, `null` and (for strings) empty values are rejected.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Disable casting of scalar values.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Lower bound: characters for strings, items for arrays, value for numbers.
    pub fn min(mut self, min: impl Into<f64>) -> Self {
        self.min = Some(min.into());
        self
    }

    /// Upper bound, with the same meaning as [`ShapeSchema::min`].
    pub fn max(mut self, max: impl Into<f64>) -> Self {
        self.max = Some(max.into());
        self
    }

    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.one_of = values.into_iter().map(Into::into).collect();
        self
    }

    /// Strings must match `pattern`.
    pub fn matches(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn validate_value(&self, value: &Value) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        self.check(Some(value), &Location::root(), &mut errors);
        errors
    }

    fn check(&self, value: Option<&Value>, at: &Location, errors: &mut Vec<ValidationError>) {
        let value = match value {
            None => {
                if self.required {
                    errors.push(at.error(format!("{} is a required field", at.label)));
                }
                return;
            }
            Some(Value::Null) => {
                if !self.nullable {
                    let detail = if self.required {
                        format!("{} is a required field", at.label)
                    } else {
                        format!("{} cannot be null", at.label)
                    };
                    errors.push(at.error(detail));
                }
                return;
            }
            Some(value) => value,
        };

        let Some(value) = self.cast(value) else {
            errors.push(at.error(format!(
                "{} must be a `{}` type, but the final value was: `{}`",
                at.label,
                self.kind.type_name(),
                value
            )));
            return;
        };

        match &self.kind {
            Kind::String => self.check_string(&value, at, errors),
            Kind::Number | Kind::Integer => self.check_number(&value, at, errors),
            Kind::Array(of) => self.check_array(of, &value, at, errors),
            Kind::Object(shape) => {
                if let Value::Object(map) = &value {
                    shape.check_fields(map, at, errors);
                }
            }
            Kind::Boolean | Kind::Mixed => {}
        }

        if !self.one_of.is_empty() && !self.one_of.contains(&value) {
            let allowed: Vec<String> = self.one_of.iter().map(display_value).collect();
            errors.push(at.error(format!(
                "{} must be one of the following values: {}",
                at.label,
                allowed.join(", ")
            )));
        }
    }

    /// The value after casting, or `None` when it has the wrong type.
    fn cast(&self, value: &Value) -> Option<Value> {
        let lenient = !self.strict;
        match (&self.kind, value) {
            (Kind::Mixed, v) => Some(v.clone()),
            (Kind::String, Value::String(_)) => Some(value.clone()),
            (Kind::String, Value::Number(n)) if lenient => Some(Value::String(n.to_string())),
            (Kind::String, Value::Bool(b)) if lenient => Some(Value::String(b.to_string())),
            (Kind::Number, Value::Number(_)) => Some(value.clone()),
            (Kind::Integer, Value::Number(n)) => is_integer(n).then(|| value.clone()),
            (Kind::Number, Value::String(s)) if lenient => parse_number(s),
            (Kind::Integer, Value::String(s)) if lenient => {
                parse_number(s).filter(|v| v.as_number().is_some_and(is_integer))
            }
            (Kind::Boolean, Value::Bool(_)) => Some(value.clone()),
            (Kind::Boolean, Value::String(s)) if lenient => match s.trim() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (Kind::Array(_), Value::Array(_)) | (Kind::Object(_), Value::Object(_)) => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    fn check_string(&self, value: &Value, at: &Location, errors: &mut Vec<ValidationError>) {
        let Some(s) = value.as_str() else { return };
        if self.required && s.is_empty() {
            errors.push(at.error(format!("{} is a required field", at.label)));
            return;
        }
        let len = s.chars().count() as f64;
        if let Some(min) = self.min {
            if len < min {
                errors.push(at.error(format!(
                    "{} must be at least {min} characters",
                    at.label
                )));
            }
        }
        if let Some(max) = self.max {
            if len > max {
                errors.push(at.error(format!(
                    "{} must be at most {max} characters",
                    at.label
                )));
            }
        }
        if let Some(re) = &self.pattern {
            if !re.is_match(s) {
                errors.push(at.error(format!(
                    "{} must match the following: \"{}\"",
                    at.label,
                    re.as_str()
                )));
            }
        }
    }

    fn check_number(&self, value: &Value, at: &Location, errors: &mut Vec<ValidationError>) {
        let Some(n) = value.as_f64() else { return };
        if let Some(min) = self.min {
            if n < min {
                errors.push(at.error(format!(
                    "{} must be greater than or equal to {min}",
                    at.label
                )));
            }
        }
        if let Some(max) = self.max {
            if n > max {
                errors.push(at.error(format!(
                    "{} must be less than or equal to {max}",
                    at.label
                )));
            }
        }
    }

    fn check_array(
        &self,
        of: &ShapeSchema,
        value: &Value,
        at: &Location,
        errors: &mut Vec<ValidationError>,
    ) {
        let Some(items) = value.as_array() else { return };
        let len = items.len() as f64;
        if let Some(min) = self.min {
            if len < min {
                errors.push(at.error(format!(
                    "{} field must have at least {min} items",
                    at.label
                )));
            }
        }
        if let Some(max) = self.max {
            if len > max {
                errors.push(at.error(format!(
                    "{} field must have less than or equal to {max} items",
                    at.label
                )));
            }
        }
        for (i, item) in items.iter().enumerate() {
            of.check(Some(item), &at.index(i), errors);
        }
    }
}

#[async_trait]
impl SchemaAdapter for ShapeSchema {
    async fn validate(&self, value: &Value) -> Vec<ValidationError> {
        self.validate_value(value)
    }
}

/// An object shape under construction.
#[derive(Debug, Clone, Default)]
pub struct ObjectShape {
    fields: Vec<(String, ShapeSchema)>,
    no_unknown: bool,
}

impl ObjectShape {
    pub fn field(mut self, name: impl Into<String>, shape: impl Into<ShapeSchema>) -> Self {
        let name = name.into();
        self.fields.retain(|(existing, _)| *existing != name);
        self.fields.push((name, shape.into()));
        self
    }

    /// Reject keys that are not declared fields.
    pub fn no_unknown(mut self) -> Self {
        self.no_unknown = true;
        self
    }

    pub fn required(self) -> ShapeSchema {
        ShapeSchema::from(self).required()
    }

    pub fn nullable(self) -> ShapeSchema {
        ShapeSchema::from(self).nullable()
    }

    pub fn validate_value(&self, value: &Value) -> Vec<ValidationError> {
        ShapeSchema::from(self.clone()).validate_value(value)
    }

    fn check_fields(
        &self,
        map: &Map<String, Value>,
        at: &Location,
        errors: &mut Vec<ValidationError>,
    ) {
        for (name, shape) in &self.fields {
            shape.check(map.get(name), &at.field(name), errors);
        }
        if self.no_unknown {
            let unknown: Vec<&str> = map
                .keys()
                .filter(|k| !self.fields.iter().any(|(name, _)| name == *k))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                errors.push(at.error(format!(
                    "{} field has unspecified keys: {}",
                    at.label,
                    unknown.join(", ")
                )));
            }
        }
    }
}

impl From<ObjectShape> for ShapeSchema {
    fn from(shape: ObjectShape) -> Self {
        ShapeSchema::of(Kind::Object(shape))
    }
}

#[async_trait]
impl SchemaAdapter for ObjectShape {
    async fn validate(&self, value: &Value) -> Vec<ValidationError> {
        self.validate_value(value)
    }
}

/// Where a check happens: a readable path for messages and a JSON pointer.
struct Location {
    label: String,
    pointer: String,
}

impl Location {
    fn root() -> Self {
        Self {
            label: "this".to_string(),
            pointer: String::new(),
        }
    }

    fn field(&self, name: &str) -> Self {
        let label = if self.pointer.is_empty() {
            name.to_string()
        } else {
            format!("{}.{name}", self.label)
        };
        Self {
            label,
            pointer: format!("{}/{}", self.pointer, escape(name)),
        }
    }

    fn index(&self, i: usize) -> Self {
        Self {
            label: format!("{}[{i}]", self.label),
            pointer: format!("{}/{i}", self.pointer),
        }
    }

    fn error(&self, detail: String) -> ValidationError {
        ValidationError::new(self.pointer.clone(), detail)
    }
}

fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn is_integer(n: &Number) -> bool {
    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn details(errors: &[ValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.detail.as_str()).collect()
    }

    #[test]
    fn required_fields() {
        let s = object()
            .field("a", string().required())
            .field("b", string().required());

        assert!(s.validate_value(&json!({ "a": "x", "b": "y" })).is_empty());
        let errors = s.validate_value(&json!({ "a": "x" }));
        assert_eq!(details(&errors), vec!["b is a required field"]);
        assert_eq!(errors[0].pointer, "/b");

        let errors = s.validate_value(&json!({ "a": "", "b": null }));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let s = object().field("n", number());
        assert!(s.validate_value(&json!({})).is_empty());
        assert_eq!(
            details(&s.validate_value(&json!({ "n": null }))),
            vec!["n cannot be null"]
        );
        assert!(object()
            .field("n", number().nullable())
            .validate_value(&json!({ "n": null }))
            .is_empty());
    }

    #[test]
    fn lenient_casting() {
        let s = object()
            .field("name", string())
            .field("age", integer())
            .field("score", number())
            .field("active", boolean());

        let ok = json!({ "name": 12, "age": "42", "score": " 1.5 ", "active": "true" });
        assert!(s.validate_value(&ok).is_empty());

        let bad = json!({ "age": "4.2", "score": "abc", "active": "yes" });
        assert_eq!(s.validate_value(&bad).len(), 3);
    }

    #[test]
    fn strict_disables_casting() {
        let s = object().field("age", integer().strict());
        assert!(s.validate_value(&json!({ "age": 3 })).is_empty());
        assert_eq!(s.validate_value(&json!({ "age": "3" })).len(), 1);
    }

    #[test]
    fn bounds_patterns_and_choices() {
        let s = object()
            .field("code", string().min(2).max(3).matches(Regex::new("^[A-Z]+$").unwrap()))
            .field("qty", number().min(1).max(10))
            .field("color", string().one_of(["red", "green"]));

        assert!(s
            .validate_value(&json!({ "code": "AB", "qty": 5, "color": "red" }))
            .is_empty());
        assert_eq!(
            details(&s.validate_value(&json!({ "qty": 11 }))),
            vec!["qty must be less than or equal to 10"]
        );
        assert_eq!(s.validate_value(&json!({ "code": "a" })).len(), 2);
        assert_eq!(
            details(&s.validate_value(&json!({ "color": "blue" }))),
            vec!["color must be one of the following values: red, green"]
        );
    }

    #[test]
    fn nested_objects_and_arrays() {
        let s = object().field(
            "user",
            object()
                .field("name", string().required())
                .field("tags", array(string().strict()).max(2)),
        );

        let errors = s.validate_value(&json!({ "user": { "tags": ["a", 1, "c"] } }));
        let pointers: Vec<&str> = errors.iter().map(|e| e.pointer.as_str()).collect();
        assert_eq!(pointers, vec!["/user/name", "/user/tags", "/user/tags/1"]);
        assert_eq!(errors[0].detail, "user.name is a required field");
        assert!(errors[2].detail.starts_with("user.tags[1] must be a `string` type"));
    }

    #[test]
    fn no_unknown_rejects_extra_keys() {
        let s = object().field("a", mixed()).no_unknown();
        assert!(s.validate_value(&json!({ "a": [1, { "b": null }] })).is_empty());
        assert_eq!(
            details(&s.validate_value(&json!({ "a": 1, "z": 2 }))),
            vec!["this field has unspecified keys: z"]
        );
    }

    #[test]
    fn root_must_be_an_object() {
        let errors = object().validate_value(&json!([1]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].pointer, "");
    }
}
