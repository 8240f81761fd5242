//! Request-schema analysis.
//!
//! Pure functions over an OpenAPI document: find the first write operation's
//! request body, flatten `$ref`/`allOf`, and classify image-capable fields.

use super::{ImageField, ImageSupport};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Field names tried first when choosing where to put the reference image
const PRIORITY_FIELDS: &[&str] = &[
    "reference_image_url",
    "reference_image",
    "input_image_url",
    "input_image",
    "source_image_url",
    "source_image",
    "image_url",
    "image",
    "image_urls",
];

const WRITE_METHODS: &[&str] = &["post", "put"];

fn image_name_hint() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(image|mask|reference|source|control|input)")
            .expect("image name pattern is valid")
    })
}

fn ref_name(reference: &Value) -> Option<&str> {
    reference
        .as_str()?
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
}

/// Flattens `$ref` and `allOf` against `components.schemas`.
///
/// Resolved references are memoized by name. A reference already on the
/// current resolution chain resolves to `None`, which breaks cycles.
pub struct SchemaResolver<'a> {
    schemas: Option<&'a Map<String, Value>>,
    memo: HashMap<String, Option<Value>>,
    chain: HashSet<String>,
}

impl<'a> SchemaResolver<'a> {
    pub fn new(openapi: &'a Value) -> Self {
        Self {
            schemas: openapi
                .get("components")
                .and_then(|c| c.get("schemas"))
                .and_then(Value::as_object),
            memo: HashMap::new(),
            chain: HashSet::new(),
        }
    }

    pub fn resolve(&mut self, schema: &Value) -> Option<Value> {
        let obj = schema.as_object()?;

        if let Some(reference) = obj.get("$ref") {
            let name = ref_name(reference)?;
            if self.chain.contains(name) {
                return None;
            }
            if let Some(cached) = self.memo.get(name) {
                return cached.clone();
            }
            let target = self.schemas.and_then(|schemas| schemas.get(name));
            self.chain.insert(name.to_string());
            let resolved = target.and_then(|t| self.resolve(t));
            self.chain.remove(name);
            self.memo.insert(name.to_string(), resolved.clone());
            return resolved;
        }

        if let Some(branches) = obj
            .get("allOf")
            .and_then(Value::as_array)
            .filter(|b| !b.is_empty())
        {
            let mut properties = Map::new();
            let mut required: Vec<Value> = Vec::new();
            for branch in branches {
                let Some(resolved) = self.resolve(branch) else {
                    continue;
                };
                if let Some(props) = resolved.get("properties").and_then(Value::as_object) {
                    for (key, value) in props {
                        properties.insert(key.clone(), value.clone());
                    }
                }
                if let Some(names) = resolved.get("required").and_then(Value::as_array) {
                    for name in names {
                        if !required.contains(name) {
                            required.push(name.clone());
                        }
                    }
                }
            }

            let mut merged = obj.clone();
            merged.remove("allOf");
            merged.insert("type".to_string(), Value::String("object".to_string()));
            merged.insert("properties".to_string(), Value::Object(properties));
            merged.insert("required".to_string(), Value::Array(required));
            return Some(Value::Object(merged));
        }

        Some(schema.clone())
    }
}

/// Request body schema of the first POST/PUT operation that has one.
pub fn request_schema(openapi: &Value, resolver: &mut SchemaResolver<'_>) -> Option<Value> {
    let paths = openapi.get("paths")?.as_object()?;
    let request_bodies = openapi
        .get("components")
        .and_then(|c| c.get("requestBodies"))
        .and_then(Value::as_object);

    for path_item in paths.values() {
        let Some(path_item) = path_item.as_object() else {
            continue;
        };
        for method in WRITE_METHODS {
            let Some(operation) = path_item.get(*method) else {
                continue;
            };
            let mut body = operation.get("requestBody");
            if let Some(name) = body.and_then(|b| b.get("$ref")).and_then(ref_name) {
                if let Some(target) = request_bodies.and_then(|rb| rb.get(name)) {
                    body = Some(target);
                }
            }
            let Some(content) = body
                .and_then(|b| b.get("content"))
                .and_then(Value::as_object)
            else {
                continue;
            };

            let schema = content
                .get("application/json")
                .and_then(|c| c.get("schema"))
                .or_else(|| content.get("multipart/form-data").and_then(|c| c.get("schema")))
                .or_else(|| content.values().next().and_then(|c| c.get("schema")));

            if let Some(resolved) = schema.and_then(|s| resolver.resolve(s)) {
                return Some(resolved);
            }
        }
    }

    None
}

/// What kind of value a property holds, as far as image delivery is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueShape {
    Text,
    TextArray,
    Other,
}

fn is_enumerated(schema: &Value) -> bool {
    schema.get("enum").is_some() || schema.get("const").is_some()
}

fn branches(schema: &Value) -> Option<&Vec<Value>> {
    schema
        .get("anyOf")
        .or_else(|| schema.get("oneOf"))
        .and_then(Value::as_array)
}

fn value_shape(schema: &Value, resolver: &mut SchemaResolver<'_>) -> ValueShape {
    let Some(schema) = resolver.resolve(schema) else {
        return ValueShape::Other;
    };
    if is_enumerated(&schema) {
        return ValueShape::Other;
    }
    if let Some(options) = branches(&schema) {
        let shapes: Vec<ValueShape> = options.iter().map(|o| value_shape(o, resolver)).collect();
        if shapes.contains(&ValueShape::Text) {
            return ValueShape::Text;
        }
        if shapes.contains(&ValueShape::TextArray) {
            return ValueShape::TextArray;
        }
        return ValueShape::Other;
    }
    match schema.get("type").and_then(Value::as_str) {
        Some("string") => ValueShape::Text,
        Some("array") => {
            let items = schema.get("items").cloned().unwrap_or(Value::Null);
            match value_shape(&items, resolver) {
                ValueShape::Text => ValueShape::TextArray,
                _ => ValueShape::Other,
            }
        }
        Some(_) => ValueShape::Other,
        None if has_content_hint(&schema) => ValueShape::Text,
        None => ValueShape::Other,
    }
}

fn has_content_hint(schema: &Value) -> bool {
    matches!(
        schema.get("format").and_then(Value::as_str),
        Some("uri") | Some("binary")
    ) || schema.get("contentEncoding").and_then(Value::as_str) == Some("base64")
}

/// Schema declares binary, URI or base64 content (directly or as array items).
fn is_image_schema(schema: &Value, resolver: &mut SchemaResolver<'_>) -> bool {
    let Some(schema) = resolver.resolve(schema) else {
        return false;
    };
    if let Some(options) = branches(&schema) {
        return options.iter().any(|o| is_image_schema(o, resolver));
    }
    match schema.get("type").and_then(Value::as_str) {
        Some("array") => {
            let items = schema.get("items").cloned().unwrap_or(Value::Null);
            is_image_schema(&items, resolver)
        }
        Some("string") | None => has_content_hint(&schema),
        Some(_) => false,
    }
}

fn pick_preferred_field(fields: &[ImageField]) -> Option<ImageField> {
    PRIORITY_FIELDS
        .iter()
        .find_map(|name| fields.iter().find(|f| f.name == *name))
        .or_else(|| fields.first())
        .cloned()
}

/// Schema-derived part of a capability requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferredRequirement {
    pub image_support: ImageSupport,
    pub fields: Vec<ImageField>,
    pub preferred_field: Option<ImageField>,
    pub unsupported_reason: String,
}

/// Classify reference image support from an OpenAPI document.
///
/// A property is an image field only when its value is a free-form string or
/// an array of such strings, and either its name matches the image hint
/// (`image`, `mask`, `reference`, `source`, `control`, `input`) or its schema
/// declares `format: uri`, `format: binary` or base64 content. Enumerated
/// strings and numeric, boolean or object properties are never image fields
/// even when the name matches, so `controlnet_conditioning_scale: number`
/// is ignored.
///
/// Returns `None` when no write operation declares a request schema.
pub fn infer_image_requirement(openapi: &Value) -> Option<InferredRequirement> {
    let mut resolver = SchemaResolver::new(openapi);
    let schema = request_schema(openapi, &mut resolver)?;

    let required: HashSet<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut fields = Vec::new();
    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, property) in properties {
            let shape = value_shape(property, &mut resolver);
            if shape == ValueShape::Other {
                continue;
            }
            if !image_name_hint().is_match(name) && !is_image_schema(property, &mut resolver) {
                continue;
            }
            fields.push(ImageField {
                name: name.clone(),
                required: required.contains(name.as_str()),
                expects_array: shape == ValueShape::TextArray,
            });
        }
    }

    if fields.is_empty() {
        return Some(InferredRequirement {
            image_support: ImageSupport::None,
            fields,
            preferred_field: None,
            unsupported_reason: String::new(),
        });
    }

    let required_fields: Vec<&str> = fields
        .iter()
        .filter(|f| f.required)
        .map(|f| f.name.as_str())
        .collect();
    let image_support = if required_fields.is_empty() {
        ImageSupport::Optional
    } else {
        ImageSupport::Required
    };
    let unsupported_reason = if required_fields.len() > 1 {
        format!(
            "Multiple image inputs are required: {}",
            required_fields.join(", ")
        )
    } else {
        String::new()
    };
    let preferred_field = pick_preferred_field(&fields);

    Some(InferredRequirement {
        image_support,
        fields,
        preferred_field,
        unsupported_reason,
    })
}
