use crate::enrich::BUY_NOISE;
use crate::ingest::parse_counter;
use crate::record::{CookingStep, RecipeId, RefinedRecipe};
use indexmap::IndexSet;
use serde_json::Value;

/// Tokens that carry no ingredient information on their own.
pub const NOISE_TOKENS: [&str; 4] = ["구매", "기타", "그외", "그 외"];

/// Raw `category_kind` spellings folded into one canonical label.
const CATEGORY_KIND_SYNONYMS: [(&str, &str); 3] = [
    ("밥,죽,떡", "밥/죽/떡"),
    ("밥/죽", "밥/죽/떡"),
    ("밥•죽•떡", "밥/죽/떡"),
];

fn is_noise(token: &str) -> bool {
    NOISE_TOKENS.contains(&token)
}

pub fn normalize_category_kind(kind: &str) -> String {
    let k = kind.trim();
    CATEGORY_KIND_SYNONYMS
        .iter()
        .find(|(raw, _)| *raw == k)
        .map_or_else(|| k.to_string(), |(_, canon)| (*canon).to_string())
}

/// `"구매 대파 1개, 구매 마늘 2쪽"` -> `"대파 1개 | 마늘 2쪽"`.
pub fn clean_ingredients_raw(s: &str) -> String {
    s.replace([',', '•'], "|")
        .split('|')
        .map(|t| t.trim().replace(BUY_NOISE, "").trim().to_string())
        .filter(|t| !t.is_empty() && !is_noise(t))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Strip noise, collapse whitespace, dedupe keeping first-seen order.
pub fn clean_ingredients_list<'a, I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out: IndexSet<String> = IndexSet::new();
    for x in items {
        let t = x.trim().replace(BUY_NOISE, "");
        let t = t.trim();
        if t.is_empty() || is_noise(t) {
            continue;
        }
        let t = t.split_whitespace().collect::<Vec<_>>().join(" ");
        if !t.is_empty() {
            out.insert(t);
        }
    }
    out.into_iter().collect()
}

// -------- lenient field coercion --------

fn as_text(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn as_counter(v: Option<&Value>) -> u64 {
    match v {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|i| i.max(0) as u64))
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f > 0.0).map(|f| f.trunc() as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => parse_counter(s),
        Some(Value::Bool(b)) => u64::from(*b),
        _ => 0,
    }
}

/// Step number as written upstream; anything unparseable is 0.
pub fn coerce_step_number(v: Option<&Value>) -> i64 {
    match v {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<i64>().unwrap_or(0),
        Some(Value::Bool(b)) => i64::from(*b),
        _ => 0,
    }
}

/// Renumber steps 1..N in array order. Returns how many numbers changed.
pub fn resequence_steps(steps: &mut [CookingStep], upstream: &[i64]) -> usize {
    let mut changed = 0;
    for (i, step) in steps.iter_mut().enumerate() {
        let n = i as u32 + 1;
        if upstream.get(i).copied() != Some(i64::from(n)) {
            changed += 1;
        }
        step.step = n;
    }
    changed
}

/// Output of `refine_record`: the cleaned record plus how many step numbers were fixed.
#[derive(Clone, Debug)]
pub struct Refined {
    pub recipe: RefinedRecipe,
    pub steps_renumbered: usize,
}

/// Project an arbitrary JSON document onto the published schema and clean it.
pub fn refine_record(doc: &Value) -> Refined {
    let get = |k: &str| doc.get(k);

    let mut upstream_numbers = Vec::new();
    let mut steps = Vec::new();
    if let Some(Value::Array(raw_steps)) = get("cooking_steps") {
        for s in raw_steps {
            if !s.is_object() {
                continue;
            }
            upstream_numbers.push(coerce_step_number(s.get("step")));
            steps.push(CookingStep::new(0, as_text(s.get("description")), as_text(s.get("imageUrl"))));
        }
    }
    let steps_renumbered = resequence_steps(&mut steps, &upstream_numbers);

    let names: Vec<&str> = match get("ingredients") {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };

    let recipe = RefinedRecipe {
        id: get("RCP_SNO").map(RecipeId::from_value).unwrap_or_default(),
        title: as_text(get("title")),
        image_url: as_text(get("imageUrl")),
        category_kind: normalize_category_kind(&as_text(get("category_kind"))),
        servings: as_text(get("servings")),
        difficulty: as_text(get("difficulty")),
        cooking_time: as_text(get("cooking_time")),
        view_count: as_counter(get("view_count")),
        recommend_count: as_counter(get("recommend_count")),
        scrap_count: as_counter(get("scrap_count")),
        ingredients_raw: clean_ingredients_raw(&as_text(get("ingredients_raw"))),
        ingredients: clean_ingredients_list(names),
        cooking_steps: steps,
    };
    Refined { recipe, steps_renumbered }
}
