#![allow(dead_code)]

use parking_lot::Mutex;
use recipe_etl::{Document, DocumentSink, FetchError, PageFetcher, SinkError};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const CSV_HEADER: &str = "RCP_SNO,RCP_TTL,CKG_NM,RGTR_ID,RGTR_NM,INQ_CNT,RCMM_CNT,SRAP_CNT,\
CKG_MTH_ACTO_NM,CKG_STA_ACTO_NM,CKG_MTRL_ACTO_NM,CKG_KND_ACTO_NM,CKG_IPDC,CKG_MTRL_CN,\
CKG_INBUN_NM,CKG_DODF_NM,CKG_TIME_NM,FIRST_REG_DT,RCP_IMG_URL";

/// Fresh temp directory that outlives the handle (tests inspect it after the run).
pub fn temp_workspace() -> PathBuf {
    tempfile::tempdir().unwrap().into_path()
}

/// Write a CSV export with the standard header. Each row is
/// `(id, title, views, kind)`; remaining columns get fixed filler values.
pub fn write_csv(path: &Path, rows: &[(&str, &str, &str, &str)]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut body = String::from(CSV_HEADER);
    body.push('\n');
    for (id, title, views, kind) in rows {
        body.push_str(&format!(
            "{id},{title},{title},u1,cook,{views},3,4,볶음,일상,채소류,{kind},요약,재료,2인분,초급,30분이내,20200101,http://img/{id}.jpg\n"
        ));
    }
    fs::write(path, body).unwrap();
}

/// Read and decode a whole JSON file.
pub fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

pub fn write_json(path: &Path, v: &Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(v).unwrap()).unwrap();
}

/// Minimal normalized record as the ingest stage writes it (no crawl data yet).
pub fn bare_recipe(id: i64, kind: &str) -> Value {
    json!({
        "RCP_SNO": id,
        "title": format!("recipe {id}"),
        "summary": "",
        "imageUrl": "",
        "category_kind": kind,
        "category_material": "",
        "category_method": "",
        "category_situation": "",
        "servings": "2인분",
        "difficulty": "초급",
        "cooking_time": "30분이내",
        "view_count": id * 10,
        "recommend_count": 0,
        "scrap_count": 0,
        "ingredients_raw": "",
        "ingredients": [],
        "cooking_steps": []
    })
}

/// A crawled record that passes the image filter.
pub fn enriched_recipe(id: i64, kind: &str, views: u64) -> Value {
    json!({
        "RCP_SNO": id,
        "title": format!("recipe {id}"),
        "imageUrl": format!("http://img/{id}.jpg"),
        "category_kind": kind,
        "servings": "2인분",
        "difficulty": "초급",
        "cooking_time": "30분이내",
        "view_count": views,
        "recommend_count": id % 7,
        "scrap_count": id % 5,
        "ingredients_raw": "[재료] 대파 1개, 구매 마늘 2쪽",
        "ingredients": ["대파", "마늘", "구매", "대파"],
        "cooking_steps": [
            { "step": 1, "description": "썰기", "imageUrl": format!("http://img/{id}_1.jpg") },
            { "step": 2, "description": "볶기", "imageUrl": "" }
        ],
        "extra_field": "dropped by refine"
    })
}

/// Detail page in the current layout: ingredient list, main thumbnail, step containers.
pub fn structured_page(id: i64) -> String {
    format!(
        r#"<html><body>
<img id="main_thumbs" src="http://img/main_{id}.jpg">
<div class="ready_ingre3">
  <ul>
    <li><a href="/i/1">대파</a> <span class="ingre_unit">1개</span> 구매</li>
    <li><a href="/i/2">마늘</a> <span class="ingre_unit">2쪽</span></li>
  </ul>
</div>
<div class="view_step_cont"><div class="media-body">대파를 썬다.</div><img src="http://img/{id}_s1.jpg"></div>
<div class="view_step_cont"><div class="media-body">볶는다.</div></div>
</body></html>"#
    )
}

/// Detail page in the legacy layout: ordinal-prefixed blocks under `#recipe_step`.
pub fn legacy_page() -> String {
    r#"<html><body>
<div class="view_pic"><img src="http://img/legacy.jpg"></div>
<div id="recipe_step">
  <p>1. 물을 끓인다.</p>
  <p>센 불로.</p>
  <p>2. 면을 넣는다.</p>
</div>
</body></html>"#
        .to_string()
}

/// Serves canned pages by URL and records every request.
#[derive(Default)]
pub struct FakeFetcher {
    pub pages: BTreeMap<String, String>,
    pub requests: Mutex<Vec<String>>,
    pub fail: BTreeSet<String>,
    /// Fail every request after this many have been served (simulates a crash).
    pub fail_after: Option<usize>,
}

impl FakeFetcher {
    pub fn serving_all(base: &str, ids: impl IntoIterator<Item = i64>) -> Self {
        let pages = ids.into_iter().map(|id| (format!("{base}/{id}"), structured_page(id))).collect();
        Self { pages, ..Default::default() }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl PageFetcher for FakeFetcher {
    fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let mut reqs = self.requests.lock();
        if let Some(n) = self.fail_after {
            if reqs.len() >= n {
                return Err(FetchError::Status { url: url.to_string(), status: 503 });
            }
        }
        reqs.push(url.to_string());
        if self.fail.contains(url) {
            return Err(FetchError::Status { url: url.to_string(), status: 500 });
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status { url: url.to_string(), status: 404 })
    }
}

/// Records committed batches per collection. Individual calls can be scripted to fail.
#[derive(Default)]
pub struct FakeSink {
    pub commits: Mutex<Vec<Vec<Document>>>,
    /// Document keys whose batch is always rejected.
    pub poison_keys: BTreeSet<String>,
    /// Document keys the sink refuses as malformed.
    pub invalid_keys: BTreeSet<String>,
    pub attempts: Mutex<usize>,
}

impl FakeSink {
    pub fn poisoned(keys: &[&str]) -> Self {
        Self { poison_keys: keys.iter().map(|k| k.to_string()).collect(), ..Default::default() }
    }

    pub fn rejecting(keys: &[&str]) -> Self {
        Self { invalid_keys: keys.iter().map(|k| k.to_string()).collect(), ..Default::default() }
    }

    pub fn committed_keys(&self) -> Vec<String> {
        self.commits.lock().iter().flatten().map(|d| d.key.clone()).collect()
    }
}

impl DocumentSink for FakeSink {
    fn commit(&self, _collection: &str, batch: &[Document]) -> Result<(), SinkError> {
        *self.attempts.lock() += 1;
        if let Some(bad) = batch.iter().find(|d| self.invalid_keys.contains(&d.key)) {
            return Err(SinkError::InvalidDocument { key: bad.key.clone(), reason: "rejected".into() });
        }
        if let Some(bad) = batch.iter().find(|d| self.poison_keys.contains(&d.key)) {
            return Err(SinkError::Status { status: 500, body: format!("poisoned {}", bad.key) });
        }
        self.commits.lock().push(batch.to_vec());
        Ok(())
    }
}
