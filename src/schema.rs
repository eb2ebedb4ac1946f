use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

pub const APARTMENT_SCHEMA_KEY: &str = "apartment";
pub const HOTEL_SCHEMA_KEY: &str = "hotel";

static BUILTIN_REGISTRY: LazyLock<SchemaRegistry> = LazyLock::new(SchemaRegistry::builtin);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("unsupported field type '{0}'")]
    UnsupportedFieldType(String),
    #[error("unsupported enablement expression '{0}'")]
    UnsupportedPredicate(String),
    #[error("field '{field}' of type {field_type} lists no categories")]
    MissingCategories { field: String, field_type: FieldType },
    #[error("required field '{0}' is not an input field")]
    UnknownRequiredField(String),
    #[error("invalid schema json: {0}")]
    Json(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Integer,
    Boolean,
    Categorical,
    CategoricalMultiple,
    ShortString,
    LongString,
}

impl FieldType {
    pub const ALL: [FieldType; 6] = [
        FieldType::Integer,
        FieldType::Boolean,
        FieldType::Categorical,
        FieldType::CategoricalMultiple,
        FieldType::ShortString,
        FieldType::LongString,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Integer => "Integer",
            FieldType::Boolean => "Boolean",
            FieldType::Categorical => "Categorical",
            FieldType::CategoricalMultiple => "CategoricalMultiple",
            FieldType::ShortString => "ShortString",
            FieldType::LongString => "LongString",
        }
    }

    pub fn needs_categories(self) -> bool {
        matches!(
            self,
            FieldType::Categorical | FieldType::CategoricalMultiple
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldType::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == s.trim())
            .ok_or_else(|| SchemaError::UnsupportedFieldType(s.to_string()))
    }
}

/// Condition under which a field is meaningful, e.g. a service start hour
/// only matters when the hotel offers the service at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "field", rename_all = "snake_case")]
pub enum EnabledWhen {
    FieldTrue(String),
}

impl EnabledWhen {
    /// Accepts the `!lambda p: p["Field"]` form used by the search API schemas.
    pub fn parse(expr: &str) -> Result<Self, SchemaError> {
        let unsupported = || SchemaError::UnsupportedPredicate(expr.to_string());
        let body = expr
            .trim()
            .strip_prefix("!lambda")
            .ok_or_else(unsupported)?
            .trim_start();
        let (param, body) = body.split_once(':').ok_or_else(unsupported)?;
        let param = param.trim();
        if param.is_empty() || !param.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(unsupported());
        }
        let field = body
            .trim()
            .strip_prefix(param)
            .and_then(|rest| rest.strip_prefix('['))
            .and_then(|rest| rest.strip_suffix(']'))
            .map(str::trim)
            .and_then(|quoted| {
                quoted
                    .strip_prefix('"')
                    .and_then(|q| q.strip_suffix('"'))
                    .or_else(|| quoted.strip_prefix('\'').and_then(|q| q.strip_suffix('\'')))
            })
            .filter(|name| !name.is_empty())
            .ok_or_else(unsupported)?;
        Ok(EnabledWhen::FieldTrue(field.to_string()))
    }

    pub fn depends_on(&self) -> &str {
        match self {
            EnabledWhen::FieldTrue(field) => field,
        }
    }

    pub fn is_satisfied(&self, flag: impl Fn(&str) -> Option<bool>) -> bool {
        match self {
            EnabledWhen::FieldTrue(field) => flag(field).unwrap_or(false),
        }
    }
}

impl fmt::Display for EnabledWhen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnabledWhen::FieldTrue(field) => write!(f, "requires {field}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_when: Option<EnabledWhen>,
}

impl FieldSpec {
    fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            min: None,
            max: None,
            categories: Vec::new(),
            enabled_when: None,
        }
    }

    pub fn integer(name: &str, min: i64, max: i64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            ..Self::new(name, FieldType::Integer)
        }
    }

    pub fn boolean(name: &str) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn categorical(name: &str, categories: &[&str]) -> Self {
        Self {
            categories: categories.iter().map(|c| c.to_string()).collect(),
            ..Self::new(name, FieldType::Categorical)
        }
    }

    pub fn categorical_multiple(name: &str, categories: &[&str]) -> Self {
        Self {
            categories: categories.iter().map(|c| c.to_string()).collect(),
            ..Self::new(name, FieldType::CategoricalMultiple)
        }
    }

    pub fn short_string(name: &str) -> Self {
        Self::new(name, FieldType::ShortString)
    }

    pub fn long_string(name: &str) -> Self {
        Self::new(name, FieldType::LongString)
    }

    pub fn enabled_when(mut self, condition: EnabledWhen) -> Self {
        self.enabled_when = Some(condition);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitySchema {
    pub entity_key: String,
    pub input_fields: Vec<FieldSpec>,
    pub output_fields: Vec<FieldSpec>,
    pub required_field_names: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    pub returns_count: bool,
}

impl EntitySchema {
    pub fn input_field(&self, name: &str) -> Option<&FieldSpec> {
        self.input_fields.iter().find(|field| field.name == name)
    }

    pub fn input_field_names(&self) -> impl Iterator<Item = &str> {
        self.input_fields.iter().map(|field| field.name.as_str())
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required_field_names.contains(name)
    }

    /// Parses a schema in the search API's json layout
    /// (`input`/`output`/`required`/`db`, fields keyed `Name`/`Type`/...).
    pub fn from_api_json(json: &str) -> Result<Self, SchemaError> {
        let raw: ApiSchemaJson =
            serde_json::from_str(json).map_err(|err| SchemaError::Json(err.to_string()))?;
        let input_fields = raw
            .input
            .into_iter()
            .map(ApiFieldJson::into_field_spec)
            .collect::<Result<Vec<_>, _>>()?;
        let output_fields = raw
            .output
            .into_iter()
            .map(ApiFieldJson::into_field_spec)
            .collect::<Result<Vec<_>, _>>()?;
        let required_field_names = raw.required.into_iter().collect::<BTreeSet<_>>();
        if let Some(unknown) = required_field_names
            .iter()
            .find(|name| !input_fields.iter().any(|field| &field.name == *name))
        {
            return Err(SchemaError::UnknownRequiredField(unknown.clone()));
        }
        Ok(Self {
            entity_key: raw.db,
            input_fields,
            output_fields,
            required_field_names,
            function: raw.function,
            returns_count: raw.returns_count,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiSchemaJson {
    input: Vec<ApiFieldJson>,
    #[serde(default)]
    output: Vec<ApiFieldJson>,
    #[serde(default)]
    required: Vec<String>,
    db: String,
    #[serde(default)]
    function: Option<String>,
    #[serde(default)]
    returns_count: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiFieldJson {
    name: String,
    #[serde(rename = "Type")]
    field_type: String,
    #[serde(default)]
    min: Option<i64>,
    #[serde(default)]
    max: Option<i64>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    enabled: Option<String>,
}

impl ApiFieldJson {
    fn into_field_spec(self) -> Result<FieldSpec, SchemaError> {
        let field_type = self.field_type.parse::<FieldType>()?;
        if field_type.needs_categories() && self.categories.is_empty() {
            return Err(SchemaError::MissingCategories {
                field: self.name,
                field_type,
            });
        }
        let enabled_when = self.enabled.as_deref().map(EnabledWhen::parse).transpose()?;
        Ok(FieldSpec {
            name: self.name,
            field_type,
            min: self.min,
            max: self.max,
            categories: self.categories,
            enabled_when,
        })
    }
}

/// Tabs offered to the wizard in the knowledge-base pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Apartments,
    Hotels,
    Flights,
    Artifacts,
    Trains,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Apartments,
        Category::Hotels,
        Category::Flights,
        Category::Artifacts,
        Category::Trains,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Apartments => "Apartments",
            Category::Hotels => "Hotels",
            Category::Flights => "Flights",
            Category::Artifacts => "Artifacts",
            Category::Trains => "Trains",
        }
    }

    pub fn schema_key(self) -> &'static str {
        match self {
            Category::Hotels => HOTEL_SCHEMA_KEY,
            Category::Apartments | Category::Flights | Category::Artifacts | Category::Trains => {
                APARTMENT_SCHEMA_KEY
            }
        }
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|c| *c == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        let idx = Self::ALL.iter().position(|c| *c == self).unwrap_or(0);
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, EntitySchema>,
}

impl SchemaRegistry {
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.insert(apartment_schema());
        registry.insert(hotel_schema());
        registry
    }

    /// Replaces any schema already registered under the same entity key.
    pub fn insert(&mut self, schema: EntitySchema) -> Option<EntitySchema> {
        self.schemas.insert(schema.entity_key.clone(), schema)
    }

    pub fn get(&self, entity_key: &str) -> Option<&EntitySchema> {
        self.schemas.get(entity_key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    /// Falls back to the apartment schema, which every category can search.
    pub fn for_category(&self, category: Category) -> &EntitySchema {
        self.get(category.schema_key())
            .or_else(|| self.get(APARTMENT_SCHEMA_KEY))
            .unwrap_or_else(|| builtin_schema(APARTMENT_SCHEMA_KEY))
    }
}

/// Built-in schemas always resolve; asking for an unknown key is a programming error.
pub fn builtin_schema(entity_key: &str) -> &'static EntitySchema {
    match BUILTIN_REGISTRY.get(entity_key) {
        Some(schema) => schema,
        None => panic!("no built-in schema registered for '{entity_key}'"),
    }
}

fn apartment_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::integer("Level", 0, 15),
        FieldSpec::integer("MaxLevel", 0, 15),
        FieldSpec::boolean("HasBalcony"),
        FieldSpec::categorical("BalconySide", &["east", "north", "south", "west"]),
        FieldSpec::boolean("HasElevator"),
        FieldSpec::integer("NumRooms", 1, 7),
        FieldSpec::integer("FloorSquareMeters", 10, 350),
        FieldSpec::categorical_multiple("NearbyPOIs", &["School", "TrainStation", "Park"]),
        FieldSpec::categorical(
            "Name",
            &[
                "One on Center Apartments",
                "Shadyside Apartments",
                "North Hill Apartments",
            ],
        ),
    ]
}

fn apartment_schema() -> EntitySchema {
    EntitySchema {
        entity_key: APARTMENT_SCHEMA_KEY.to_string(),
        input_fields: apartment_fields(),
        output_fields: apartment_fields(),
        required_field_names: BTreeSet::from(["NumRooms".to_string()]),
        function: Some("generic_sample".to_string()),
        returns_count: true,
    }
}

fn hotel_fields() -> Vec<FieldSpec> {
    let needs_service = || EnabledWhen::FieldTrue("Service".to_string());
    vec![
        FieldSpec::categorical(
            "Name",
            &["Shadyside Inn", "Hilton Hotel", "Hyatt Hotel", "Old Town Inn"],
        ),
        FieldSpec::categorical("Cost", &["Cheap", "Moderate", "Expensive"]),
        FieldSpec::boolean("TakesReservations"),
        FieldSpec::boolean("Service"),
        FieldSpec::integer("AverageRating", 1, 5),
        FieldSpec::integer("ServiceStartHour", 6, 10).enabled_when(needs_service()),
        FieldSpec::integer("ServiceStopHour", 15, 23).enabled_when(needs_service()),
        FieldSpec::categorical("Location", &["South", "West", "East", "North", "Center"]),
    ]
}

fn hotel_schema() -> EntitySchema {
    EntitySchema {
        entity_key: HOTEL_SCHEMA_KEY.to_string(),
        input_fields: hotel_fields(),
        output_fields: hotel_fields(),
        required_field_names: BTreeSet::new(),
        function: Some("generic_sample".to_string()),
        returns_count: true,
    }
}

#[cfg(test)]
#[path = "../tests/unit/schema_tests.rs"]
mod tests;
