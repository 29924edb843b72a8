//! JSON-Schema validation.
//!
//! Documents are compiled once into a [`Node`] tree; validation walks the
//! tree and collects every failure with a JSON pointer into the instance.
//! `$ref` and format assertions are not supported; unknown keywords are
//! ignored.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};

use super::SchemaAdapter;
use crate::error::SchemaError;
use crate::problem::ValidationError;

/// A compiled JSON-Schema document.
#[derive(Debug, Clone)]
pub struct JsonSchema {
    raw: Value,
    root: Node,
}

impl JsonSchema {
    pub fn new(document: Value) -> Result<Self, SchemaError> {
        let root = Node::compile(&document, "")?;
        Ok(Self {
            raw: document,
            root,
        })
    }

    /// The document this schema was compiled from.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn validate_value(&self, value: &Value) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        self.root.validate(value, "", &mut errors);
        errors
    }

    pub fn is_valid(&self, value: &Value) -> bool {
        self.validate_value(value).is_empty()
    }
}

impl TryFrom<Value> for JsonSchema {
    type Error = SchemaError;

    fn try_from(document: Value) -> Result<Self, Self::Error> {
        JsonSchema::new(document)
    }
}

#[async_trait]
impl SchemaAdapter for JsonSchema {
    async fn validate(&self, value: &Value) -> Vec<ValidationError> {
        self.validate_value(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonType {
    Null,
    Boolean,
    Object,
    Array,
    Number,
    Integer,
    String,
}

impl JsonType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "null" => JsonType::Null,
            "boolean" => JsonType::Boolean,
            "object" => JsonType::Object,
            "array" => JsonType::Array,
            "number" => JsonType::Number,
            "integer" => JsonType::Integer,
            "string" => JsonType::String,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            JsonType::Null => "null",
            JsonType::Boolean => "boolean",
            JsonType::Object => "object",
            JsonType::Array => "array",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::String => "string",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match (self, value) {
            (JsonType::Null, Value::Null)
            | (JsonType::Boolean, Value::Bool(_))
            | (JsonType::Object, Value::Object(_))
            | (JsonType::Array, Value::Array(_))
            | (JsonType::Number, Value::Number(_))
            | (JsonType::String, Value::String(_)) => true,
            (JsonType::Integer, Value::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Bool(bool),
    Rules(Box<Rules>),
}

#[derive(Debug, Clone)]
enum Items {
    All(Node),
    Tuple(Vec<Node>),
}

#[derive(Debug, Clone, Default)]
struct Rules {
    types: Option<Vec<JsonType>>,
    enum_values: Option<Vec<Value>>,
    const_value: Option<Value>,

    required: Vec<String>,
    properties: Vec<(String, Node)>,
    pattern_properties: Vec<(Regex, Node)>,
    additional_properties: Option<Node>,
    min_properties: Option<usize>,
    max_properties: Option<usize>,

    items: Option<Items>,
    min_items: Option<usize>,
    max_items: Option<usize>,
    unique_items: bool,

    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<Regex>,

    minimum: Option<f64>,
    maximum: Option<f64>,
    exclusive_minimum: Option<f64>,
    exclusive_maximum: Option<f64>,
    multiple_of: Option<f64>,

    all_of: Vec<Node>,
    any_of: Vec<Node>,
    one_of: Vec<Node>,
    not: Option<Node>,
}

impl Node {
    fn compile(schema: &Value, at: &str) -> Result<Node, SchemaError> {
        let obj = match schema {
            Value::Bool(b) => return Ok(Node::Bool(*b)),
            Value::Object(obj) => obj,
            _ => {
                return Err(SchemaError::invalid(
                    at,
                    "schema must be an object or a boolean",
                ))
            }
        };

        let mut rules = Rules {
            types: compile_types(obj, at)?,
            enum_values: match obj.get("enum") {
                None => None,
                Some(Value::Array(values)) => Some(values.clone()),
                Some(_) => return Err(SchemaError::invalid(&join(at, "enum"), "must be an array")),
            },
            const_value: obj.get("const").cloned(),
            required: compile_required(obj, at)?,
            min_properties: usize_keyword(obj, "minProperties", at)?,
            max_properties: usize_keyword(obj, "maxProperties", at)?,
            min_items: usize_keyword(obj, "minItems", at)?,
            max_items: usize_keyword(obj, "maxItems", at)?,
            unique_items: matches!(obj.get("uniqueItems"), Some(Value::Bool(true))),
            min_length: usize_keyword(obj, "minLength", at)?,
            max_length: usize_keyword(obj, "maxLength", at)?,
            pattern: match obj.get("pattern") {
                None => None,
                Some(p) => Some(compile_regex(p, &join(at, "pattern"))?),
            },
            minimum: number_keyword(obj, "minimum", at)?,
            maximum: number_keyword(obj, "maximum", at)?,
            multiple_of: number_keyword(obj, "multipleOf", at)?,
            ..Rules::default()
        };

        if let Some(m) = rules.multiple_of {
            if m <= 0.0 {
                return Err(SchemaError::invalid(
                    &join(at, "multipleOf"),
                    "must be greater than 0",
                ));
            }
        }

        // Draft-4 spells exclusive bounds as booleans modifying minimum/maximum.
        match obj.get("exclusiveMinimum") {
            Some(Value::Bool(true)) => rules.exclusive_minimum = rules.minimum.take(),
            Some(Value::Bool(false)) | None => {}
            Some(_) => rules.exclusive_minimum = number_keyword(obj, "exclusiveMinimum", at)?,
        }
        match obj.get("exclusiveMaximum") {
            Some(Value::Bool(true)) => rules.exclusive_maximum = rules.maximum.take(),
            Some(Value::Bool(false)) | None => {}
            Some(_) => rules.exclusive_maximum = number_keyword(obj, "exclusiveMaximum", at)?,
        }

        if let Some(props) = obj.get("properties") {
            let props_at = join(at, "properties");
            let Value::Object(props) = props else {
                return Err(SchemaError::invalid(&props_at, "must be an object"));
            };
            for (name, sub) in props {
                let node = Node::compile(sub, &join(&props_at, name))?;
                rules.properties.push((name.clone(), node));
            }
        }

        if let Some(patterns) = obj.get("patternProperties") {
            let pp_at = join(at, "patternProperties");
            let Value::Object(patterns) = patterns else {
                return Err(SchemaError::invalid(&pp_at, "must be an object"));
            };
            for (pattern, sub) in patterns {
                let sub_at = join(&pp_at, pattern);
                let re = Regex::new(pattern)
                    .map_err(|e| SchemaError::invalid(&sub_at, format!("invalid regex: {e}")))?;
                rules.pattern_properties.push((re, Node::compile(sub, &sub_at)?));
            }
        }

        if let Some(additional) = obj.get("additionalProperties") {
            rules.additional_properties = Some(Node::compile(
                additional,
                &join(at, "additionalProperties"),
            )?);
        }

        rules.items = match obj.get("items") {
            None => None,
            Some(Value::Array(list)) => {
                let items_at = join(at, "items");
                let nodes = list
                    .iter()
                    .enumerate()
                    .map(|(i, sub)| Node::compile(sub, &join(&items_at, &i.to_string())))
                    .collect::<Result<Vec<_>, _>>()?;
                Some(Items::Tuple(nodes))
            }
            Some(sub) => Some(Items::All(Node::compile(sub, &join(at, "items"))?)),
        };

        rules.all_of = compile_list(obj, "allOf", at)?;
        rules.any_of = compile_list(obj, "anyOf", at)?;
        rules.one_of = compile_list(obj, "oneOf", at)?;
        if let Some(sub) = obj.get("not") {
            rules.not = Some(Node::compile(sub, &join(at, "not"))?);
        }

        Ok(Node::Rules(Box::new(rules)))
    }

    fn is_valid(&self, value: &Value) -> bool {
        let mut errors = Vec::new();
        self.validate(value, "", &mut errors);
        errors.is_empty()
    }

    fn validate(&self, value: &Value, pointer: &str, errors: &mut Vec<ValidationError>) {
        match self {
            Node::Bool(true) => {}
            Node::Bool(false) => errors.push(ValidationError::new(pointer, "boolean schema is false")),
            Node::Rules(rules) => rules.validate(value, pointer, errors),
        }
    }
}

impl Rules {
    fn validate(&self, value: &Value, pointer: &str, errors: &mut Vec<ValidationError>) {
        if let Some(types) = &self.types {
            if !types.iter().any(|t| t.matches(value)) {
                let names: Vec<&str> = types.iter().map(|t| t.name()).collect();
                errors.push(ValidationError::new(
                    pointer,
                    format!("must be {}", names.join(",")),
                ));
                // Other keywords would only repeat the type mismatch.
                return;
            }
        }

        if let Some(values) = &self.enum_values {
            if !values.iter().any(|v| json_eq(v, value)) {
                errors.push(ValidationError::new(
                    pointer,
                    "must be equal to one of the allowed values",
                ));
            }
        }
        if let Some(expected) = &self.const_value {
            if !json_eq(expected, value) {
                errors.push(ValidationError::new(pointer, "must be equal to constant"));
            }
        }

        match value {
            Value::Object(map) => self.validate_object(map, pointer, errors),
            Value::Array(items) => self.validate_array(items, pointer, errors),
            Value::String(s) => self.validate_string(s, pointer, errors),
            Value::Number(n) => {
                if let Some(f) = n.as_f64() {
                    self.validate_number(f, pointer, errors);
                }
            }
            _ => {}
        }

        for sub in &self.all_of {
            sub.validate(value, pointer, errors);
        }
        if !self.any_of.is_empty() && !self.any_of.iter().any(|s| s.is_valid(value)) {
            errors.push(ValidationError::new(
                pointer,
                "must match a schema in anyOf",
            ));
        }
        if !self.one_of.is_empty() {
            let passing = self.one_of.iter().filter(|s| s.is_valid(value)).count();
            if passing != 1 {
                errors.push(ValidationError::new(
                    pointer,
                    "must match exactly one schema in oneOf",
                ));
            }
        }
        if let Some(not) = &self.not {
            if not.is_valid(value) {
                errors.push(ValidationError::new(pointer, "must NOT be valid"));
            }
        }
    }

    fn validate_object(
        &self,
        map: &Map<String, Value>,
        pointer: &str,
        errors: &mut Vec<ValidationError>,
    ) {
        for name in &self.required {
            if !map.contains_key(name) {
                errors.push(ValidationError::new(
                    join(pointer, name),
                    format!("must have required property '{name}'"),
                ));
            }
        }

        if let Some(min) = self.min_properties {
            if map.len() < min {
                errors.push(ValidationError::new(
                    pointer,
                    format!("must NOT have fewer than {min} properties"),
                ));
            }
        }
        if let Some(max) = self.max_properties {
            if map.len() > max {
                errors.push(ValidationError::new(
                    pointer,
                    format!("must NOT have more than {max} properties"),
                ));
            }
        }

        for (key, value) in map {
            let at = join(pointer, key);
            let mut matched = false;

            if let Some((_, node)) = self.properties.iter().find(|(name, _)| name == key) {
                matched = true;
                node.validate(value, &at, errors);
            }
            for (re, node) in &self.pattern_properties {
                if re.is_match(key) {
                    matched = true;
                    node.validate(value, &at, errors);
                }
            }
            if matched {
                continue;
            }
            match &self.additional_properties {
                Some(Node::Bool(false)) => errors.push(ValidationError::new(
                    at,
                    "must NOT have additional properties",
                )),
                Some(node) => node.validate(value, &at, errors),
                None => {}
            }
        }
    }

    fn validate_array(&self, items: &[Value], pointer: &str, errors: &mut Vec<ValidationError>) {
        if let Some(min) = self.min_items {
            if items.len() < min {
                errors.push(ValidationError::new(
                    pointer,
                    format!("must NOT have fewer than {min} items"),
                ));
            }
        }
        if let Some(max) = self.max_items {
            if items.len() > max {
                errors.push(ValidationError::new(
                    pointer,
                    format!("must NOT have more than {max} items"),
                ));
            }
        }
        if self.unique_items {
            let duplicate = items
                .iter()
                .enumerate()
                .any(|(i, a)| items[i + 1..].iter().any(|b| json_eq(a, b)));
            if duplicate {
                errors.push(ValidationError::new(pointer, "must NOT have duplicate items"));
            }
        }

        match &self.items {
            Some(Items::All(node)) => {
                for (i, item) in items.iter().enumerate() {
                    node.validate(item, &join(pointer, &i.to_string()), errors);
                }
            }
            Some(Items::Tuple(nodes)) => {
                for (i, (item, node)) in items.iter().zip(nodes).enumerate() {
                    node.validate(item, &join(pointer, &i.to_string()), errors);
                }
            }
            None => {}
        }
    }

    fn validate_string(&self, s: &str, pointer: &str, errors: &mut Vec<ValidationError>) {
        let len = s.chars().count();
        if let Some(min) = self.min_length {
            if len < min {
                errors.push(ValidationError::new(
                    pointer,
                    format!("must NOT have fewer than {min} characters"),
                ));
            }
        }
        if let Some(max) = self.max_length {
            if len > max {
                errors.push(ValidationError::new(
                    pointer,
                    format!("must NOT have more than {max} characters"),
                ));
            }
        }
        if let Some(re) = &self.pattern {
            if !re.is_match(s) {
                errors.push(ValidationError::new(
                    pointer,
                    format!("must match pattern \"{}\"", re.as_str()),
                ));
            }
        }
    }

    fn validate_number(&self, n: f64, pointer: &str, errors: &mut Vec<ValidationError>) {
        let checks = [
            (self.minimum, n >= self.minimum.unwrap_or(f64::MIN), ">="),
            (self.maximum, n <= self.maximum.unwrap_or(f64::MAX), "<="),
            (
                self.exclusive_minimum,
                self.exclusive_minimum.map_or(true, |m| n > m),
                ">",
            ),
            (
                self.exclusive_maximum,
                self.exclusive_maximum.map_or(true, |m| n < m),
                "<",
            ),
        ];
        for (limit, ok, op) in checks {
            if let (Some(limit), false) = (limit, ok) {
                errors.push(ValidationError::new(pointer, format!("must be {op} {limit}")));
            }
        }

        if let Some(m) = self.multiple_of {
            let q = n / m;
            if (q - q.round()).abs() > 1e-9 {
                errors.push(ValidationError::new(
                    pointer,
                    format!("must be multiple of {m}"),
                ));
            }
        }
    }
}

fn compile_types(obj: &Map<String, Value>, at: &str) -> Result<Option<Vec<JsonType>>, SchemaError> {
    let at = join(at, "type");
    let parse = |name: &Value| {
        name.as_str()
            .and_then(JsonType::parse)
            .ok_or_else(|| SchemaError::invalid(&at, format!("unknown type {name}")))
    };
    match obj.get("type") {
        None => Ok(None),
        Some(Value::Array(names)) => names.iter().map(parse).collect::<Result<_, _>>().map(Some),
        Some(name) => Ok(Some(vec![parse(name)?])),
    }
}

fn compile_required(obj: &Map<String, Value>, at: &str) -> Result<Vec<String>, SchemaError> {
    match obj.get("required") {
        None => Ok(Vec::new()),
        Some(Value::Array(names)) => names
            .iter()
            .map(|n| {
                n.as_str().map(str::to_string).ok_or_else(|| {
                    SchemaError::invalid(&join(at, "required"), "entries must be strings")
                })
            })
            .collect(),
        Some(_) => Err(SchemaError::invalid(
            &join(at, "required"),
            "must be an array of strings",
        )),
    }
}

fn compile_list(obj: &Map<String, Value>, keyword: &str, at: &str) -> Result<Vec<Node>, SchemaError> {
    let list_at = join(at, keyword);
    match obj.get(keyword) {
        None => Ok(Vec::new()),
        Some(Value::Array(list)) if !list.is_empty() => list
            .iter()
            .enumerate()
            .map(|(i, sub)| Node::compile(sub, &join(&list_at, &i.to_string())))
            .collect(),
        Some(_) => Err(SchemaError::invalid(&list_at, "must be a non-empty array")),
    }
}

fn compile_regex(pattern: &Value, at: &str) -> Result<Regex, SchemaError> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| SchemaError::invalid(at, "must be a string"))?;
    Regex::new(pattern).map_err(|e| SchemaError::invalid(at, format!("invalid regex: {e}")))
}

fn usize_keyword(obj: &Map<String, Value>, keyword: &str, at: &str) -> Result<Option<usize>, SchemaError> {
    match obj.get(keyword) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| SchemaError::invalid(&join(at, keyword), "must be a non-negative integer")),
    }
}

fn number_keyword(obj: &Map<String, Value>, keyword: &str, at: &str) -> Result<Option<f64>, SchemaError> {
    match obj.get(keyword) {
        None => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| SchemaError::invalid(&join(at, keyword), "must be a number")),
    }
}

/// Equality where `1` and `1.0` are the same number.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| json_eq(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| json_eq(v, other)))
        }
        _ => a == b,
    }
}

/// Append one reference token to a JSON pointer.
fn join(pointer: &str, token: &str) -> String {
    format!("{pointer}/{}", token.replace('~', "~0").replace('/', "~1"))
}
