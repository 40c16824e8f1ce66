//! Detail-page extraction. Selectors track the live site markup and are expected to
//! drift; everything here is best-effort and returns what it could find.

use crate::record::{CookingStep, Recipe};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Marketing token injected into ingredient rows ("buy" links).
pub const BUY_NOISE: &str = "구매";
/// Prefix of the display-form ingredient string.
pub const INGREDIENTS_RAW_PREFIX: &str = "[재료] ";

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("Invalid selector")
}

static INGREDIENT_BLOCK: LazyLock<Selector> = LazyLock::new(|| selector("div.ready_ingre3"));
static LIST_ITEM: LazyLock<Selector> = LazyLock::new(|| selector("li"));
static UNIT: LazyLock<Selector> = LazyLock::new(|| selector("span.ingre_unit"));
static LINK: LazyLock<Selector> = LazyLock::new(|| selector("a"));
static MAIN_THUMB: LazyLock<Selector> = LazyLock::new(|| selector("img#main_thumbs"));
static VIEW_PIC: LazyLock<Selector> = LazyLock::new(|| selector("div.view_pic"));
static IMG: LazyLock<Selector> = LazyLock::new(|| selector("img"));
static STEP_CONTAINER: LazyLock<Selector> = LazyLock::new(|| selector("div.view_step_cont"));
static MEDIA_BODY: LazyLock<Selector> = LazyLock::new(|| selector("div.media-body"));
static LEGACY_STEPS: LazyLock<Selector> = LazyLock::new(|| selector("div#recipe_step"));
static LEGACY_BLOCKS: LazyLock<Selector> = LazyLock::new(|| selector("div, p"));

static ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.").expect("Invalid ordinal regex"));

/// Ingredient data in both representations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngredientDetail {
    /// `"[재료] 대파 1개 | 마늘 2쪽"`
    pub raw: String,
    /// Sorted, unique bare names.
    pub names: Vec<String>,
}

/// Everything a detail page yielded. Applied to a record only after extraction finished.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageDetail {
    pub ingredients: Option<IngredientDetail>,
    pub image_url: Option<String>,
    pub steps: Vec<CookingStep>,
}

/// All descendant text, concatenated as-is.
fn all_text(el: ElementRef<'_>) -> String {
    el.text().collect()
}

/// Descendant text nodes trimmed, empties dropped, joined without separator.
fn stripped_text(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).filter(|s| !s.is_empty()).collect()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn src_of(el: ElementRef<'_>) -> Option<String> {
    el.value().attr("src").map(str::to_string)
}

pub fn extract_ingredients(doc: &Html) -> Option<IngredientDetail> {
    let block = doc.select(&INGREDIENT_BLOCK).next()?;
    let mut with_amount: Vec<String> = Vec::new();
    let mut names: BTreeSet<String> = BTreeSet::new();

    for li in block.select(&LIST_ITEM) {
        let cleaned = collapse_whitespace(&all_text(li).replace(BUY_NOISE, ""));
        if cleaned.is_empty() {
            continue;
        }

        let amount = li.select(&UNIT).next().map(stripped_text).unwrap_or_default();
        let mut name = if amount.is_empty() {
            cleaned.clone()
        } else {
            cleaned.replace(&amount, "").trim().to_string()
        };
        if let Some(link) = li.select(&LINK).next() {
            name = stripped_text(link);
        }
        if !name.is_empty() {
            names.insert(name);
        }
        with_amount.push(cleaned);
    }

    if with_amount.is_empty() {
        return None;
    }
    Some(IngredientDetail {
        raw: format!("{INGREDIENTS_RAW_PREFIX}{}", with_amount.join(" | ")),
        names: names.into_iter().collect(),
    })
}

pub fn extract_main_image(doc: &Html) -> Option<String> {
    if let Some(src) = doc.select(&MAIN_THUMB).next().and_then(src_of) {
        return Some(src);
    }
    let pic = doc.select(&VIEW_PIC).next()?;
    pic.select(&IMG).next().and_then(src_of)
}

/// Current layout: one container per step, numbered by container position.
fn extract_structured_steps(doc: &Html) -> Option<Vec<CookingStep>> {
    let containers: Vec<ElementRef<'_>> = doc.select(&STEP_CONTAINER).collect();
    if containers.is_empty() {
        return None;
    }
    let steps = containers
        .into_iter()
        .enumerate()
        .filter_map(|(i, cont)| {
            let desc = cont.select(&MEDIA_BODY).next()?;
            let image = cont.select(&IMG).next().and_then(src_of).unwrap_or_default();
            Some(CookingStep::new(i as u32 + 1, stripped_text(desc), image))
        })
        .collect();
    Some(steps)
}

/// Legacy layout: an undifferentiated stream of blocks where a leading "N." starts a step.
fn extract_legacy_steps(doc: &Html) -> Vec<CookingStep> {
    let Some(root) = doc.select(&LEGACY_STEPS).next() else {
        return Vec::new();
    };
    let texts = root.select(&LEGACY_BLOCKS).map(stripped_text);
    segment_ordinal_steps(texts)
}

/// Split a text stream into steps at every block that starts with an ordinal marker.
pub fn segment_ordinal_steps<I, S>(texts: I) -> Vec<CookingStep>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fn flush(buffer: &mut String, steps: &mut Vec<CookingStep>) {
        if !buffer.is_empty() {
            let n = steps.len() as u32 + 1;
            steps.push(CookingStep::new(n, std::mem::take(buffer), ""));
        }
    }

    let mut steps: Vec<CookingStep> = Vec::new();
    let mut buffer = String::new();

    for text in texts {
        let text = text.as_ref();
        if text.is_empty() {
            continue;
        }
        if ORDINAL_RE.is_match(text) {
            flush(&mut buffer, &mut steps);
            buffer.push_str(text);
        } else {
            if !buffer.is_empty() {
                buffer.push(' ');
            }
            buffer.push_str(text);
        }
    }
    flush(&mut buffer, &mut steps);
    steps
}

pub fn extract_steps(doc: &Html) -> Vec<CookingStep> {
    extract_structured_steps(doc).unwrap_or_else(|| extract_legacy_steps(doc))
}

/// Parse a detail page into its enrichment payload.
pub fn extract_detail(html: &str) -> PageDetail {
    let doc = Html::parse_document(html);
    PageDetail {
        ingredients: extract_ingredients(&doc),
        image_url: extract_main_image(&doc),
        steps: extract_steps(&doc),
    }
}

/// Merge a page payload into `recipe`. Fields are filled, never cleared: an empty
/// extraction leaves the existing value alone. Returns whether anything changed.
pub fn apply_detail(recipe: &mut Recipe, detail: PageDetail) -> bool {
    let mut changed = false;
    if let Some(ing) = detail.ingredients {
        recipe.ingredients_raw = ing.raw;
        recipe.ingredients = ing.names;
        changed = true;
    }
    if recipe.image_url.is_empty() {
        if let Some(url) = detail.image_url.filter(|u| !u.is_empty()) {
            recipe.image_url = url;
            changed = true;
        }
    }
    if !detail.steps.is_empty() {
        recipe.cooking_steps = detail.steps;
        changed = true;
    }
    changed
}
