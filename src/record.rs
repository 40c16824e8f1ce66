//! Record types flowing through the pipeline: the full `Recipe` (stages 1-2) and the
//! trimmed `RefinedRecipe` written by the refiner (stages 3-4).

use serde::de::{Deserializer, DeserializeOwned};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Source-record identifier. The CSV export carries integers, but segment files written
/// by other tools may carry strings, so both are accepted and kept distinct.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecipeId {
    Num(i64),
    Text(String),
}

impl Default for RecipeId {
    fn default() -> Self {
        RecipeId::Text(String::new())
    }
}

impl RecipeId {
    /// Parse CSV cell text: integers become numeric ids, anything else stays text.
    pub fn parse(raw: &str) -> Self {
        let t = raw.trim();
        match t.parse::<i64>() {
            Ok(n) => RecipeId::Num(n),
            Err(_) => RecipeId::Text(t.to_string()),
        }
    }

    pub fn from_value(v: &Value) -> Self {
        match v {
            Value::Number(n) => match n.as_i64() {
                Some(i) => RecipeId::Num(i),
                None => RecipeId::Text(n.to_string()),
            },
            Value::String(s) => RecipeId::Text(s.clone()),
            Value::Null => RecipeId::default(),
            other => RecipeId::Text(other.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RecipeId::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for RecipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipeId::Num(n) => write!(f, "{n}"),
            RecipeId::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for RecipeId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            RecipeId::Num(n) => s.serialize_i64(*n),
            RecipeId::Text(t) => s.serialize_str(t),
        }
    }
}

impl<'de> Deserialize<'de> for RecipeId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(RecipeId::from_value(&v))
    }
}

/// `null` and absent both map to the type's default.
fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// One cooking step. `imageUrl` is empty when the step has no picture.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookingStep {
    #[serde(default, deserialize_with = "null_as_default")]
    pub step: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(rename = "imageUrl", default, deserialize_with = "null_as_default")]
    pub image_url: String,
}

impl CookingStep {
    pub fn new(step: u32, description: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self { step, description: description.into(), image_url: image_url.into() }
    }

    pub fn has_image(&self) -> bool {
        !self.image_url.trim().is_empty()
    }
}

/// Full recipe record as produced by the ingestor and enriched by the crawler.
/// Unknown fields survive a load/save cycle through `extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(rename = "RCP_SNO", default)]
    pub id: RecipeId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(rename = "imageUrl", default, deserialize_with = "null_as_default")]
    pub image_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category_kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category_material: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category_method: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category_situation: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub servings: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub difficulty: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cooking_time: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub view_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub recommend_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub scrap_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ingredients_raw: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ingredients: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cooking_steps: Vec<CookingStep>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Recipe {
    /// True when the crawler already filled everything it could.
    pub fn is_enriched(&self) -> bool {
        !self.ingredients_raw.is_empty() && !self.cooking_steps.is_empty() && !self.image_url.is_empty()
    }
}

/// The published schema: an allowlisted projection of `Recipe`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RefinedRecipe {
    #[serde(rename = "RCP_SNO")]
    pub id: RecipeId,
    pub title: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    pub category_kind: String,
    pub servings: String,
    pub difficulty: String,
    pub cooking_time: String,
    pub view_count: u64,
    pub recommend_count: u64,
    pub scrap_count: u64,
    pub ingredients_raw: String,
    pub ingredients: Vec<String>,
    pub cooking_steps: Vec<CookingStep>,
}

impl RefinedRecipe {
    /// Representative image present and at least one step picture.
    pub fn has_required_images(&self) -> bool {
        !self.image_url.trim().is_empty() && self.cooking_steps.iter().any(CookingStep::has_image)
    }
}
