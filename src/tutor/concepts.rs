use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use regex::Regex;

// Curated concept variants per domain, loaded once from JSON and shared
// read-only for the life of the process. Extending it is a data edit,
// never a code change.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SynonymTable {
    #[serde(default)]
    pub domains: HashMap<String, HashMap<String, Vec<String>>>,
    #[serde(default = "default_chem_tokens")]
    pub chem_tokens: Vec<String>,
}

fn default_chem_tokens() -> Vec<String> {
    ["cooh", "nh3", "nh2", "nterm", "cterm", "imidazole"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for SynonymTable {
    fn default() -> Self {
        Self {
            domains: HashMap::new(),
            chem_tokens: default_chem_tokens(),
        }
    }
}

impl SynonymTable {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn variants(&self, domain: &str, concept: &str) -> &[String] {
        self.domains
            .get(domain)
            .and_then(|d| d.get(concept))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

// A follow-up prompt in the spec file may be one string or a list of
// alternatives to pick from at random.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum PromptSet {
    One(String),
    Many(Vec<String>),
}

impl PromptSet {
    pub fn pick<'a>(&'a self, rng: &mut StdRng) -> Option<&'a str> {
        match self {
            PromptSet::One(s) if !s.trim().is_empty() => Some(s.trim()),
            PromptSet::One(_) => None,
            PromptSet::Many(v) => v.choose(rng).map(|s| s.as_str()),
        }
    }
}

// One entry of a module's <id>_answers.json, keyed by "21a" / "21" etc.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ConceptSpec {
    #[serde(default)]
    pub concept_domain: Option<String>,
    #[serde(default)]
    pub required_concepts: Vec<String>,
    #[serde(default)]
    pub optional_concepts: Vec<String>,
    #[serde(default)]
    pub followups: BTreeMap<String, PromptSet>,
    #[serde(default)]
    pub encouragement: Vec<String>,
    #[serde(default)]
    pub uncertainty_followup: Option<String>,
    #[serde(default)]
    pub wrong_triggers: BTreeMap<String, PromptSet>,
}

pub type SpecMap = HashMap<String, ConceptSpec>;

// Two-step key lookup: the printed question number (when the document carries
// one) wins over the structural index + 1; the sub-part letter is tried
// first, then the bare number. Source documents sometimes renumber, so the
// spec keys track the visible number, not the index.
pub fn resolve_spec<'a>(
    specs: &'a SpecMap,
    qid: usize,
    part_idx: usize,
    explicit_number: Option<u32>,
) -> Option<&'a ConceptSpec> {
    let qnum = match explicit_number {
        Some(n) => n.to_string(),
        None => (qid + 1).to_string(),
    };
    let letter = (b'a' + part_idx.min(25) as u8) as char;
    specs
        .get(&format!("{}{}", qnum, letter))
        .or_else(|| specs.get(&qnum))
}

pub struct ConceptChecker {
    table: SynonymTable,
    // decimal numbers like "9.2" or "180"
    num_re: Regex,
}

impl ConceptChecker {
    pub fn new(table: SynonymTable) -> Self {
        Self {
            table,
            num_re: Regex::new(r"\d+(?:\.\d+)?").unwrap(),
        }
    }

    // Does the answer demonstrate this concept?
    // 1) any number in the concept must appear verbatim; a purely numeric
    //    concept needs nothing else
    // 2) short phrases (no >4-letter words) match as plain substrings
    // 3) otherwise every registered variant gets a stem test (first five
    //    letters of each >5-letter word) and a chemistry-token test
    pub fn concept_hit(&self, concept: &str, answer: &str, domain: Option<&str>) -> bool {
        let student = answer.to_lowercase();

        if concept.chars().any(|c| c.is_ascii_digit()) {
            let nums: Vec<&str> = self
                .num_re
                .find_iter(concept)
                .map(|m| m.as_str())
                .collect();
            if !nums.is_empty() {
                if !nums.iter().all(|n| student.contains(n)) {
                    return false;
                }
                if !concept.chars().any(|c| c.is_ascii_alphabetic()) {
                    return true;
                }
            }
        }

        let norm_concept = normalize(concept);
        let norm_student = normalize(answer);
        let has_long_word = letter_runs(&norm_concept).any(|w| w.len() > 4);
        if !norm_concept.is_empty() && !has_long_word && norm_student.contains(&norm_concept) {
            return true;
        }

        let mut phrases: Vec<&str> = vec![concept];
        if let Some(d) = domain {
            phrases.extend(self.table.variants(d, concept).iter().map(|s| s.as_str()));
        }
        phrases.retain(|p| !p.is_empty());
        if phrases.is_empty() {
            return false;
        }

        let student_norm: String = student
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();

        for phrase in phrases {
            let pl = phrase.to_lowercase();

            let stems: Vec<&str> = letter_runs(&pl)
                .filter(|w| w.len() > 5)
                .map(|w| &w[..5])
                .collect();
            let long_ok = !stems.is_empty() && stems.iter().all(|s| student.contains(s));

            // Normalized so "NH3+" matches as "nh3".
            let phrase_norm: String = pl.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
            let mut found = 0;
            let mut all_present = true;
            for tok in &self.table.chem_tokens {
                if phrase_norm.contains(tok.as_str()) {
                    found += 1;
                    all_present &= student_norm.contains(tok.as_str());
                }
            }
            let short_ok = found > 0 && all_present;

            if long_ok || short_ok {
                return true;
            }
        }
        false
    }

    // Which required/optional concepts are still missing from the (combined)
    // answer at this position. An unresolvable position yields empty lists
    // and no spec: "nothing to check", not an error.
    pub fn evaluate<'a>(
        &self,
        specs: &'a SpecMap,
        qid: usize,
        answer: &str,
        part_idx: usize,
        explicit_number: Option<u32>,
    ) -> (Vec<String>, Vec<String>, Option<&'a ConceptSpec>) {
        let spec = match resolve_spec(specs, qid, part_idx, explicit_number) {
            Some(s) => s,
            None => return (Vec::new(), Vec::new(), None),
        };
        let domain = spec.concept_domain.as_deref();
        let missing = |keys: &[String]| {
            keys.iter()
                .filter(|c| !self.concept_hit(c, answer, domain))
                .cloned()
                .collect::<Vec<_>>()
        };
        (
            missing(&spec.required_concepts),
            missing(&spec.optional_concepts),
            Some(spec),
        )
    }
}

fn normalize(s: &str) -> String {
    s.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// Runs of ASCII letters, the tokenization every heuristic here shares.
fn letter_runs(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| !w.is_empty())
}

const UNCERTAINTY_IDIOMS: [&str; 9] = [
    "i don't know",
    "idk",
    "not sure",
    "i am not sure",
    "no idea",
    "i'm unsure",
    "unsure",
    "i'm confused",
    "i am confused",
];

pub fn is_uncertain(text: &str) -> bool {
    let t = text.trim().to_lowercase();
    UNCERTAINTY_IDIOMS.iter().any(|u| t.contains(u))
}

// Keyboard-mash detector. Deliberately lenient on short answers so honest
// three-letter replies never get flagged.
pub fn is_gibberish(text: &str) -> bool {
    let t = text.trim();
    if t.is_empty() {
        return true;
    }
    let len = t.chars().count();
    if len < 4 {
        return false;
    }
    // "idk" and friends belong to the uncertainty path
    if is_uncertain(t) {
        return false;
    }

    let letters = t.chars().filter(|c| c.is_alphabetic()).count();
    if (letters as f64) / (len as f64) < 0.5 {
        return true;
    }

    let lower = t.to_lowercase();
    let words: Vec<&str> = letter_runs(&lower).filter(|w| w.len() >= 2).collect();
    if words.is_empty() {
        return true;
    }

    let vowels = lower.chars().filter(|c| "aeiou".contains(*c)).count();
    if len >= 10 && (vowels as f64) / (letters.max(1) as f64) < 0.25 {
        return true;
    }

    if words.len() <= 1 && words.iter().map(|w| w.len()).max().unwrap_or(0) >= 12 {
        return true;
    }

    false
}
