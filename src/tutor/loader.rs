use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::tutor::concepts::{ConceptSpec, SpecMap};
use crate::tutor::document::{DocumentError, DocumentParser};
use crate::tutor::ModuleBundle;

const BUNDLE_CACHE_CAP: usize = 32;
const SPEC_CACHE_CAP: usize = 16;

// Loads module content by id using the fixed layout
//   <root>/<id>/<id>_questions.txt   (required)
//   <root>/<id>/<id>_answers.txt     (optional)
//   <root>/<id>/<id>_notes.txt       (optional)
//   <root>/<id>/<id>_diagrams.json   (optional)
//   <root>/<id>/<id>_answers.json    (concept specs, optional)
//   <root>/<id>/title.txt            (optional)
// Parsed bundles and spec maps are cached (bounded, oldest out first) and
// can be invalidated explicitly after editing files on disk.
pub struct ModuleLoader {
    root: PathBuf,
    parser: DocumentParser,
    bundles: HashMap<String, Arc<ModuleBundle>>,
    bundle_order: VecDeque<String>,
    specs: HashMap<String, Arc<SpecMap>>,
    spec_order: VecDeque<String>,
}

impl ModuleLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            parser: DocumentParser::new(),
            bundles: HashMap::new(),
            bundle_order: VecDeque::new(),
            specs: HashMap::new(),
            spec_order: VecDeque::new(),
        }
    }

    pub fn module_dir(&self, module_id: &str) -> PathBuf {
        self.root.join(module_id)
    }

    // Module ids available under the root, sorted.
    pub fn list_modules(&self) -> Vec<String> {
        let mut ids: Vec<String> = std::fs::read_dir(&self.root)
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .filter(|e| e.path().is_dir())
                    .filter_map(|e| e.file_name().into_string().ok())
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn load_bundle(&mut self, module_id: &str) -> Result<Arc<ModuleBundle>, DocumentError> {
        if let Some(b) = self.bundles.get(module_id) {
            log::debug!("bundle cache hit for {}", module_id);
            return Ok(b.clone());
        }

        let mdir = self.module_dir(module_id);
        if !mdir.exists() {
            return Err(DocumentError::ModuleNotFound(mdir));
        }

        let q_lines = read_lines(&mdir.join(format!("{}_questions.txt", module_id)))?;
        let questions = self.parser.parse_questions(&q_lines)?;
        if questions.is_empty() {
            return Err(DocumentError::ParseFailure(format!(
                "no questions found in {}_questions.txt",
                module_id
            )));
        }

        let a_lines = read_lines(&mdir.join(format!("{}_answers.txt", module_id)))?;
        let answers = self.parser.group_answers(&a_lines, questions.len());

        let notes = read_lines(&mdir.join(format!("{}_notes.txt", module_id)))?;

        let d_file = mdir.join(format!("{}_diagrams.json", module_id));
        let diagrams = match std::fs::read_to_string(&d_file) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                log::warn!("ignoring malformed {}: {}", d_file.display(), e);
                serde_json::Value::Null
            }),
            Err(_) => serde_json::Value::Null,
        };

        let title = std::fs::read_to_string(mdir.join("title.txt"))
            .map(|t| t.trim().to_string())
            .ok()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| module_id.to_string());

        let bundle = Arc::new(ModuleBundle {
            module_id: module_id.to_string(),
            title,
            questions,
            answers,
            notes,
            diagrams,
        });
        log::info!(
            "loaded module {} ({} questions)",
            module_id,
            bundle.questions.len()
        );

        cache_insert(
            &mut self.bundles,
            &mut self.bundle_order,
            BUNDLE_CACHE_CAP,
            module_id,
            bundle.clone(),
        );
        Ok(bundle)
    }

    // Concept specs never fail hard: a missing or malformed file means
    // "no specs available" and the dialogue falls back to generic prompts.
    pub fn load_specs(&mut self, module_id: &str) -> Arc<SpecMap> {
        if let Some(s) = self.specs.get(module_id) {
            return s.clone();
        }

        let path = self
            .module_dir(module_id)
            .join(format!("{}_answers.json", module_id));
        let map = Arc::new(read_spec_map(&path));
        cache_insert(
            &mut self.specs,
            &mut self.spec_order,
            SPEC_CACHE_CAP,
            module_id,
            map.clone(),
        );
        map
    }

    // Force a reload after files change on disk.
    pub fn invalidate(&mut self, module_id: &str) {
        self.bundles.remove(module_id);
        self.bundle_order.retain(|id| id != module_id);
        self.specs.remove(module_id);
        self.spec_order.retain(|id| id != module_id);
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>, DocumentError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(|l| l.trim_end().to_string())
        .filter(|l| !l.trim().is_empty())
        .collect())
}

fn read_spec_map(path: &Path) -> SpecMap {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => {
            log::debug!("no concept spec file at {}", path.display());
            return SpecMap::new();
        }
    };
    let raw: HashMap<String, serde_json::Value> = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("unreadable concept spec {}: {}", path.display(), e);
            return SpecMap::new();
        }
    };
    // Per-key leniency: a key whose value isn't a spec object is skipped,
    // the rest of the file still loads.
    let mut map = SpecMap::new();
    for (key, value) in raw {
        match serde_json::from_value::<ConceptSpec>(value.clone()) {
            Ok(spec) if value.is_object() => {
                map.insert(key, spec);
            }
            _ => log::warn!("skipping non-object concept spec entry {:?}", key),
        }
    }
    map
}

fn cache_insert<T>(
    map: &mut HashMap<String, T>,
    order: &mut VecDeque<String>,
    cap: usize,
    key: &str,
    value: T,
) {
    if map.len() >= cap {
        if let Some(oldest) = order.pop_front() {
            map.remove(&oldest);
        }
    }
    map.insert(key.to_string(), value);
    order.push_back(key.to_string());
}
