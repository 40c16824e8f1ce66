mod config;
mod paths;
mod record;

mod progress;
mod concurrency;
mod util;
mod pipeline;

mod ingest;
mod enrich;
mod refine;
mod upload;

pub use crate::config::{EnrichCfg, EtlOptions, RefineCfg, UploadCfg};
pub use crate::pipeline::RecipeETL;
pub use crate::record::{CookingStep, Recipe, RecipeId, RefinedRecipe};

// Expose multiprogress and progress helpers.
pub use crate::progress::{set_global_multiprogress, make_count_progress, ProgressScope};

// Segment naming/discovery for tools that inspect the checkpoint directory.
pub use crate::paths::{discover_json_files, discover_segments, next_segment_index, segment_file_name, Segment};

// export robust file ops from util so binaries can import from crate root.
pub use crate::util::{init_tracing_once, read_json, replace_file_atomic_backoff, write_json_atomic};

// stage 1
pub use crate::ingest::{load_csv_recipes, parse_counter, IngestReport};

// stage 2
pub use crate::enrich::{
    apply_detail, detail_url, extract_detail, extract_ingredients, extract_main_image, extract_steps,
    load_processed_ids, segment_ordinal_steps, EnrichReport, FetchError, HttpFetcher, IngredientDetail,
    PageDetail, PageFetcher,
};

// stage 3
pub use crate::refine::{
    category_counts, category_quotas, clean_ingredients_list, clean_ingredients_raw, coerce_step_number,
    load_documents, normalize_category_kind, popularity_scores, rank_by_score, refine_record, resequence_steps,
    select, RefineReport, Refined, Selection, NOISE_TOKENS,
};

// stage 4
pub use crate::upload::{
    checkpoint_key, commit_with_retry, doc_key, to_firestore_fields, to_firestore_value, DirectorySink, Document,
    DocumentSink, FileUploadReport, FirestoreSink, OffsetStore, SinkError, UploadReport, FIRESTORE_ENDPOINT,
};
