//! Mock value generation.
//!
//! Values are synthesized by walking a [`TypeRef`] recursively. Overrides come
//! from a [`MockRules`] table looked up field rule first, then type rule, then
//! the scalar formatter for the named type.

use crate::error::{ResolutionError, ResolutionResult, SchemaError, SchemaResult};
use crate::executor;
use crate::operation::FieldSelection;
use crate::schema::{TypeDef, TypeRef, TypeSystem};
use chrono::NaiveDate;
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Produces a value for a field or type.
pub type MockFn = Arc<dyn Fn(&FieldPath<'_>) -> ResolutionResult + Send + Sync>;

/// Produces a value for a scalar type.
pub type ScalarFormatter = Arc<dyn Fn(&mut StdRng) -> Value + Send + Sync>;

/// Location of the value being generated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldPath<'a> {
    pub parent_type: Option<&'a str>,
    pub field_name: Option<&'a str>,
}

impl<'a> FieldPath<'a> {
    pub fn field(parent_type: &'a str, field_name: &'a str) -> Self {
        Self {
            parent_type: Some(parent_type),
            field_name: Some(field_name),
        }
    }
}

/// Inclusive bounds for generated list lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListSizeRange {
    pub min: usize,
    pub max: usize,
}

impl ListSizeRange {
    /// At least one element, at most fifteen.
    pub const DEFAULT: Self = Self { min: 1, max: 15 };

    /// Creates a range; bounds given in reverse order are swapped.
    pub fn new(min: usize, max: usize) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn exact(len: usize) -> Self {
        Self { min: len, max: len }
    }

    pub fn contains(&self, len: usize) -> bool {
        (self.min..=self.max).contains(&len)
    }
}

impl Default for ListSizeRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// An override for how a field or type is mocked.
#[derive(Clone)]
pub enum MockRule {
    Value(MockFn),
    ListSize(ListSizeRange),
}

impl MockRule {
    /// Always produces `value`.
    pub fn constant(value: Value) -> Self {
        Self::Value(Arc::new(move |_: &FieldPath<'_>| Ok(value.clone())))
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&FieldPath<'_>) -> ResolutionResult + Send + Sync + 'static,
    {
        Self::Value(Arc::new(f))
    }

    pub fn list_size(min: usize, max: usize) -> Self {
        Self::ListSize(ListSizeRange::new(min, max))
    }
}

impl fmt::Debug for MockRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => f.write_str("MockRule::Value(..)"),
            Self::ListSize(range) => f.debug_tuple("MockRule::ListSize").field(range).finish(),
        }
    }
}

/// The rule table.
#[derive(Clone)]
pub struct MockRules {
    fields: FxHashMap<(String, String), MockRule>,
    types: FxHashMap<String, MockRule>,
    formatters: FxHashMap<String, ScalarFormatter>,
}

impl Default for MockRules {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRules {
    /// Creates a table holding only the built-in scalar formatters.
    pub fn new() -> Self {
        let mut formatters: FxHashMap<String, ScalarFormatter> = FxHashMap::default();
        formatters.insert(
            "Int".into(),
            Arc::new(|rng: &mut StdRng| Value::from(rng.gen_range(-100_i32..=100))),
        );
        formatters.insert(
            "Float".into(),
            Arc::new(|rng: &mut StdRng| Value::from(rng.gen_range(-100.0_f64..100.0))),
        );
        formatters.insert("String".into(), Arc::new(|_: &mut StdRng| Value::from("Hello World")));
        formatters.insert("Boolean".into(), Arc::new(|rng: &mut StdRng| Value::Bool(rng.gen())));
        formatters.insert(
            "ID".into(),
            Arc::new(|rng: &mut StdRng| Value::String(format!("{:016x}", rng.gen::<u64>()))),
        );
        formatters.insert("Date".into(), Arc::new(random_date));

        Self {
            fields: FxHashMap::default(),
            types: FxHashMap::default(),
            formatters,
        }
    }

    /// Sets the rule for `type_name.field_name`.
    pub fn field(
        mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        rule: MockRule,
    ) -> Self {
        self.fields
            .insert((type_name.into(), field_name.into()), rule);
        self
    }

    /// Sets the rule for every value of `type_name`.
    pub fn type_rule(mut self, type_name: impl Into<String>, rule: MockRule) -> Self {
        self.types.insert(type_name.into(), rule);
        self
    }

    /// Registers the default generator for a scalar.
    pub fn formatter<F>(mut self, scalar: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut StdRng) -> Value + Send + Sync + 'static,
    {
        self.formatters.insert(scalar.into(), Arc::new(f));
        self
    }

    /// Removes a scalar formatter, including a built-in one.
    pub fn without_formatter(mut self, scalar: &str) -> Self {
        self.formatters.remove(scalar);
        self
    }

    pub fn rule_for_field(&self, type_name: &str, field_name: &str) -> Option<&MockRule> {
        self.fields
            .get(&(type_name.to_owned(), field_name.to_owned()))
    }

    pub fn rule_for_type(&self, type_name: &str) -> Option<&MockRule> {
        self.types.get(type_name)
    }

    /// Checks every rule against `schema`.
    ///
    /// Fails if a rule names an unknown type or field, if a list size rule
    /// targets a field that is not a list, or if a custom scalar cannot be
    /// generated at all.
    pub fn check(&self, schema: &TypeSystem) -> SchemaResult<()> {
        for ((type_name, field_name), rule) in &self.fields {
            let target = format!("{type_name}.{field_name}");
            let field = schema
                .field(type_name, field_name)
                .map_err(|err| SchemaError::invalid_rule(&target, err.to_string()))?;
            if let MockRule::ListSize(_) = rule {
                if !is_list(&field.ty) {
                    return Err(SchemaError::invalid_rule(
                        target,
                        format!("list size given for non-list type {}", field.ty),
                    ));
                }
            }
        }

        for type_name in self.types.keys() {
            if let Err(err) = schema.resolve_type(type_name) {
                return Err(SchemaError::invalid_rule(type_name, err.to_string()));
            }
        }

        for def in schema.types() {
            if let TypeDef::Scalar(scalar) = def {
                let has_value_rule =
                    matches!(self.rule_for_type(&scalar.name), Some(MockRule::Value(_)));
                if !has_value_rule && !self.formatters.contains_key(&scalar.name) {
                    return Err(SchemaError::UnresolvableScalar(scalar.name.clone()));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for MockRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockRules")
            .field("field_rules", &self.fields.len())
            .field("type_rules", &self.types.len())
            .field("formatters", &self.formatters.len())
            .finish()
    }
}

fn is_list(ty: &TypeRef) -> bool {
    match ty {
        TypeRef::List(_) => true,
        TypeRef::NonNull(inner) => is_list(inner),
        TypeRef::Named(_) => false,
    }
}

fn random_date(rng: &mut StdRng) -> Value {
    // 2000-01-01 through 2030-12-31.
    let day = rng.gen_range(730_120..=741_442);
    NaiveDate::from_num_days_from_ce_opt(day)
        .map(|date| Value::String(date.format("%-m/%-d/%Y").to_string()))
        .unwrap_or(Value::Null)
}

/// Resolver-wide settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockConfig {
    /// Seed for reproducible output. Seeded from entropy when `None`.
    pub seed: Option<u64>,
    pub default_list_size: ListSizeRange,
}

impl MockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn default_list_size(mut self, range: ListSizeRange) -> Self {
        self.default_list_size = range;
        self
    }
}

/// JSON form of a rule table.
///
/// ```json
/// {
///   "seed": 7,
///   "defaultListSize": [1, 15],
///   "types": { "Date": "1/2/2025" },
///   "fields": { "Query.allDays": { "listSize": [1, 15] } }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MockRulesFile {
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub default_list_size: Option<(usize, usize)>,
    #[serde(default)]
    pub types: IndexMap<String, RuleEntry>,
    #[serde(default)]
    pub fields: IndexMap<String, RuleEntry>,
}

/// One entry of a [`MockRulesFile`].
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RuleEntry {
    ListSize(ListSizeEntry),
    Constant(Value),
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListSizeEntry {
    #[serde(rename = "listSize")]
    pub list_size: (usize, usize),
}

impl RuleEntry {
    fn into_rule(self) -> MockRule {
        match self {
            Self::ListSize(ListSizeEntry {
                list_size: (min, max),
            }) => MockRule::list_size(min, max),
            Self::Constant(value) => MockRule::constant(value),
        }
    }
}

impl MockRulesFile {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Builds the rule table and resolver settings.
    pub fn into_rules(self) -> SchemaResult<(MockRules, MockConfig)> {
        let mut rules = MockRules::new();
        for (type_name, entry) in self.types {
            rules = rules.type_rule(type_name, entry.into_rule());
        }
        for (target, entry) in self.fields {
            let Some((type_name, field_name)) = target.split_once('.') else {
                return Err(SchemaError::invalid_rule(
                    &target,
                    "field rules are keyed as Type.field",
                ));
            };
            rules = rules.field(type_name, field_name, entry.into_rule());
        }

        let mut config = MockConfig::new();
        config.seed = self.seed;
        if let Some((min, max)) = self.default_list_size {
            config.default_list_size = ListSizeRange::new(min, max);
        }
        Ok((rules, config))
    }
}

/// Generates values from a rule table.
pub struct MockResolver {
    rules: MockRules,
    default_list_size: ListSizeRange,
    rng: Mutex<StdRng>,
}

impl MockResolver {
    pub fn new(rules: MockRules, config: MockConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rules,
            default_list_size: config.default_list_size,
            rng: Mutex::new(rng),
        }
    }

    pub fn rules(&self) -> &MockRules {
        &self.rules
    }

    /// Value rule registered for the field at `path`, if any.
    pub fn field_value(&self, path: &FieldPath<'_>) -> Option<ResolutionResult> {
        let (Some(parent), Some(field)) = (path.parent_type, path.field_name) else {
            return None;
        };
        match self.rules.rule_for_field(parent, field)? {
            MockRule::Value(f) => Some(f(path)),
            MockRule::ListSize(_) => None,
        }
    }

    /// Value rule registered for `type_name`, if any.
    pub fn type_value(&self, path: &FieldPath<'_>, type_name: &str) -> Option<ResolutionResult> {
        match self.rules.rule_for_type(type_name)? {
            MockRule::Value(f) => Some(f(path)),
            MockRule::ListSize(_) => None,
        }
    }

    /// Picks a length for a list at `path` whose elements are `element_type`.
    pub fn list_len(&self, path: &FieldPath<'_>, element_type: &str) -> usize {
        let field_range = match (path.parent_type, path.field_name) {
            (Some(parent), Some(field)) => match self.rules.rule_for_field(parent, field) {
                Some(MockRule::ListSize(range)) => Some(*range),
                _ => None,
            },
            _ => None,
        };
        let type_range = match self.rules.rule_for_type(element_type) {
            Some(MockRule::ListSize(range)) => Some(*range),
            _ => None,
        };
        let range = field_range
            .or(type_range)
            .unwrap_or(self.default_list_size);
        self.with_rng(|rng| rng.gen_range(range.min..=range.max))
    }

    /// Generates a scalar or enum value, after any type rule.
    pub fn leaf(&self, path: &FieldPath<'_>, def: &TypeDef) -> ResolutionResult {
        if let Some(value) = self.type_value(path, def.name()) {
            return value;
        }
        match def {
            TypeDef::Scalar(scalar) => {
                let formatter = self
                    .rules
                    .formatters
                    .get(&scalar.name)
                    .ok_or_else(|| ResolutionError::NoGenerator(scalar.name.clone()))?;
                Ok(self.with_rng(|rng| formatter(rng)))
            }
            TypeDef::Enum(def) => self
                .with_rng(|rng| def.values.choose(rng).cloned())
                .map(Value::String)
                .ok_or_else(|| ResolutionError::Internal(format!("enum {} is empty", def.name))),
            TypeDef::Object(def) => Err(ResolutionError::Internal(format!(
                "{} is not a leaf type",
                def.name
            ))),
            TypeDef::InputObject(def) => Err(ResolutionError::Internal(format!(
                "{} is an input type",
                def.name
            ))),
        }
    }

    /// Fields a type-level value rule provides for an object.
    pub fn object_seed(
        &self,
        path: &FieldPath<'_>,
        type_name: &str,
    ) -> Option<Result<Map<String, Value>, ResolutionError>> {
        let seed = self.type_value(path, type_name)?;
        Some(seed.and_then(|value| match value {
            Value::Object(map) => Ok(map),
            other => Err(ResolutionError::invalid_value(type_name, &other)),
        }))
    }

    /// Generates a value of type `ty` for the field at `path`.
    ///
    /// Only the fields in `selection` are generated for objects. Nullable
    /// positions are always populated. Values from rules are checked against
    /// their declared types the same way request execution checks them, so a
    /// rule producing `null` for a non-null position is an error.
    pub fn generate(
        &self,
        schema: &TypeSystem,
        ty: &TypeRef,
        path: FieldPath<'_>,
        selection: &[FieldSelection],
    ) -> ResolutionResult {
        executor::complete_mock(schema, self, ty, path, selection)
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }
}

impl fmt::Debug for MockResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockResolver")
            .field("rules", &self.rules)
            .field("default_list_size", &self.default_list_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{SKI_MOCKS, SKI_SCHEMA};
    use serde_json::json;

    fn schema() -> TypeSystem {
        TypeSystem::parse(SKI_SCHEMA).unwrap()
    }

    fn day_selection() -> Vec<FieldSelection> {
        ["id", "date", "mountain", "conditions"]
            .into_iter()
            .map(FieldSelection::new)
            .collect()
    }

    fn all_days(resolver: &MockResolver, schema: &TypeSystem) -> Vec<Value> {
        let field = schema.field("Query", "allDays").unwrap();
        let value = resolver
            .generate(
                schema,
                &field.ty,
                FieldPath::field("Query", "allDays"),
                &day_selection(),
            )
            .unwrap();
        match value {
            Value::Array(items) => items,
            other => panic!("expected a list, got {other}"),
        }
    }

    #[test]
    fn test_all_days_within_default_bounds() {
        let schema = schema();
        for seed in 0..200 {
            let resolver = MockResolver::new(MockRules::new(), MockConfig::new().seed(seed));
            let days = all_days(&resolver, &schema);

            assert!(ListSizeRange::DEFAULT.contains(days.len()), "{}", days.len());
            for day in days {
                let day = day.as_object().unwrap();
                assert!(day["id"].is_string());
                assert!(day["mountain"].is_string());
                assert!(day["date"].is_string());
                // Nullable positions are still populated.
                assert!(day["conditions"].is_string());
            }
        }
    }

    #[test]
    fn test_non_null_never_null() {
        let schema = schema();
        let resolver = MockResolver::new(MockRules::new(), MockConfig::new().seed(1));
        let ty = TypeRef::non_null(TypeRef::named("String"));
        for _ in 0..50 {
            let value = resolver
                .generate(&schema, &ty, FieldPath::default(), &[])
                .unwrap();
            assert!(!value.is_null());
        }

        let rules = MockRules::new().type_rule("String", MockRule::constant(Value::Null));
        let resolver = MockResolver::new(rules, MockConfig::new());
        let result = resolver.generate(&schema, &ty, FieldPath::default(), &[]);
        assert_eq!(result, Err(ResolutionError::NullForNonNull("<root>".into())));
    }

    #[test]
    fn test_enum_values_come_from_the_declared_set() {
        let schema = schema();
        let resolver = MockResolver::new(MockRules::new(), MockConfig::new().seed(3));
        let ty = TypeRef::named("Conditions");
        for _ in 0..50 {
            let value = resolver
                .generate(&schema, &ty, FieldPath::default(), &[])
                .unwrap();
            let symbol = value.as_str().unwrap();
            assert!(["POWDER", "HEAVY", "ICE", "THIN"].contains(&symbol));
        }
    }

    #[test]
    fn test_list_size_rules() {
        let schema = schema();

        let rules = MockRules::new().field("Query", "allDays", MockRule::list_size(3, 3));
        let resolver = MockResolver::new(rules, MockConfig::new());
        assert_eq!(all_days(&resolver, &schema).len(), 3);

        let rules = MockRules::new().type_rule("SkiDay", MockRule::list_size(2, 2));
        let resolver = MockResolver::new(rules, MockConfig::new());
        assert_eq!(all_days(&resolver, &schema).len(), 2);

        // Field rule shadows type rule.
        let rules = MockRules::new()
            .type_rule("SkiDay", MockRule::list_size(2, 2))
            .field("Query", "allDays", MockRule::list_size(5, 5));
        let resolver = MockResolver::new(rules, MockConfig::new());
        assert_eq!(all_days(&resolver, &schema).len(), 5);

        let config = MockConfig::new().default_list_size(ListSizeRange::exact(0));
        let resolver = MockResolver::new(MockRules::new(), config);
        assert!(all_days(&resolver, &schema).is_empty());
    }

    #[test]
    fn test_field_rule_shadows_type_rule() {
        let schema = schema();
        let rules = MockRules::new()
            .type_rule("Date", MockRule::constant(json!("1/2/2025")))
            .field("SkiDay", "mountain", MockRule::constant(json!("Alta")))
            .type_rule("String", MockRule::constant(json!("Cool date")));
        let resolver = MockResolver::new(rules, MockConfig::new().seed(9));

        for day in all_days(&resolver, &schema) {
            assert_eq!(day["date"], json!("1/2/2025"));
            assert_eq!(day["mountain"], json!("Alta"));
        }
    }

    #[test]
    fn test_object_seed_provides_fields() {
        let schema = schema();
        let rules =
            MockRules::new().type_rule("SkiDay", MockRule::constant(json!({ "id": "seeded" })));
        let resolver = MockResolver::new(rules, MockConfig::new());

        for day in all_days(&resolver, &schema) {
            assert_eq!(day["id"], json!("seeded"));
            assert!(day["mountain"].is_string());
        }
    }

    #[test]
    fn test_object_seed_values_are_type_checked() {
        let schema = schema();
        let selection = [FieldSelection::new("id"), FieldSelection::new("mountain")];
        let field = schema.field("Query", "allDays").unwrap();

        let rules = MockRules::new().type_rule(
            "SkiDay",
            MockRule::constant(json!({ "mountain": null, "id": "seeded" })),
        );
        rules.check(&schema).unwrap();
        let resolver = MockResolver::new(rules, MockConfig::new().seed(1));
        let result = resolver.generate(
            &schema,
            &field.ty,
            FieldPath::field("Query", "allDays"),
            &selection,
        );
        assert_eq!(
            result,
            Err(ResolutionError::NullForNonNull("SkiDay.mountain".into()))
        );

        let rules =
            MockRules::new().type_rule("SkiDay", MockRule::constant(json!({ "id": [1, 2] })));
        let resolver = MockResolver::new(rules, MockConfig::new().seed(1));
        let result = resolver.generate(
            &schema,
            &field.ty,
            FieldPath::field("Query", "allDays"),
            &selection,
        );
        assert!(matches!(result, Err(ResolutionError::InvalidValue { .. })));
    }

    #[test]
    fn test_only_selected_fields_are_generated() {
        let schema = schema();
        let resolver = MockResolver::new(MockRules::new(), MockConfig::new());
        let value = resolver
            .generate(
                &schema,
                &TypeRef::named("SkiDay"),
                FieldPath::default(),
                &[FieldSelection::new("id").alias("key"), FieldSelection::new("__typename")],
            )
            .unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.keys().collect::<Vec<_>>(), ["key", "__typename"]);
        assert_eq!(object["__typename"], json!("SkiDay"));
    }

    #[test]
    fn test_same_seed_same_output() {
        let schema = schema();
        let first = MockResolver::new(MockRules::new(), MockConfig::new().seed(42));
        let second = MockResolver::new(MockRules::new(), MockConfig::new().seed(42));
        assert_eq!(all_days(&first, &schema), all_days(&second, &schema));
    }

    #[test]
    fn test_rule_errors_surface() {
        let schema = schema();
        let rules = MockRules::new().field(
            "SkiDay",
            "mountain",
            MockRule::from_fn(|_| Err(ResolutionError::custom("lift closed"))),
        );
        let resolver = MockResolver::new(rules, MockConfig::new());
        let field = schema.field("Query", "allDays").unwrap();
        let result = resolver.generate(
            &schema,
            &field.ty,
            FieldPath::field("Query", "allDays"),
            &day_selection(),
        );
        assert_eq!(result, Err(ResolutionError::custom("lift closed")));
    }

    #[test]
    fn test_built_in_date_formatter() {
        let schema = schema();
        let resolver = MockResolver::new(MockRules::new(), MockConfig::new().seed(5));
        let value = resolver
            .generate(&schema, &TypeRef::named("Date"), FieldPath::default(), &[])
            .unwrap();
        let text = value.as_str().unwrap();
        assert!(NaiveDate::parse_from_str(text, "%m/%d/%Y").is_ok(), "{text}");
    }

    #[test]
    fn test_check_unresolvable_scalar() {
        let schema = TypeSystem::parse("scalar Money type Query { price: Money }").unwrap();
        assert!(matches!(
            MockRules::new().check(&schema),
            Err(SchemaError::UnresolvableScalar(name)) if name == "Money"
        ));

        let rules = MockRules::new().type_rule("Money", MockRule::constant(json!("$1")));
        assert!(rules.check(&schema).is_ok());

        let rules = MockRules::new().formatter("Money", |rng| json!(rng.gen_range(1..10)));
        assert!(rules.check(&schema).is_ok());

        let rules = MockRules::new().without_formatter("Date");
        assert!(matches!(
            rules.check(&self::schema()),
            Err(SchemaError::UnresolvableScalar(name)) if name == "Date"
        ));
    }

    #[test]
    fn test_check_rule_targets() {
        let schema = schema();

        let rules = MockRules::new().field("SkiDay", "resort", MockRule::constant(json!("x")));
        assert!(matches!(
            rules.check(&schema),
            Err(SchemaError::InvalidMockRule { target, .. }) if target == "SkiDay.resort"
        ));

        let rules = MockRules::new().field("Query", "totalDays", MockRule::list_size(1, 2));
        assert!(matches!(
            rules.check(&schema),
            Err(SchemaError::InvalidMockRule { .. })
        ));

        let rules = MockRules::new().type_rule("Lift", MockRule::list_size(1, 2));
        assert!(rules.check(&schema).is_err());
    }

    #[test]
    fn test_rules_file() {
        let file = MockRulesFile::from_json(SKI_MOCKS).unwrap();
        let (rules, config) = file.into_rules().unwrap();
        let schema = schema();
        rules.check(&schema).unwrap();

        let resolver = MockResolver::new(rules, config.seed(11));
        let days = all_days(&resolver, &schema);
        assert!((1..=15).contains(&days.len()));
        for day in days {
            assert_eq!(day["date"], json!("1/2/2025"));
            assert_eq!(day["mountain"], json!("Cool date"));
        }
    }

    #[test]
    fn test_rules_file_entries() {
        let file = MockRulesFile::from_json(
            r#"{
                "seed": 4,
                "defaultListSize": [6, 2],
                "types": { "SkiDay": { "mountain": "Alta" } },
                "fields": { "Query.allDays": { "listSize": [0, 1] } }
            }"#,
        )
        .unwrap();
        assert!(matches!(file.types["SkiDay"], RuleEntry::Constant(_)));
        assert!(matches!(file.fields["Query.allDays"], RuleEntry::ListSize(_)));

        let (rules, config) = file.into_rules().unwrap();
        assert_eq!(config.seed, Some(4));
        assert_eq!(config.default_list_size, ListSizeRange { min: 2, max: 6 });
        assert!(matches!(
            rules.rule_for_field("Query", "allDays"),
            Some(MockRule::ListSize(ListSizeRange { min: 0, max: 1 }))
        ));

        let bad = MockRulesFile::from_json(r#"{ "fields": { "allDays": 1 } }"#).unwrap();
        assert!(matches!(
            bad.into_rules(),
            Err(SchemaError::InvalidMockRule { .. })
        ));
    }
}
