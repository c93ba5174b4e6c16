pub mod concepts;
pub mod dialogue;
pub mod document;
pub mod loader;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Question {
    // Explicit question number as printed in the source document ("21." -> 21).
    // The structural index and the printed number can disagree when a document
    // gets renumbered, so we keep both around.
    pub number: Option<u32>,
    pub stem: String,
    pub parts: Vec<String>,
}

impl Question {
    pub fn new(number: Option<u32>, stem: String, parts: Vec<String>) -> Self {
        Self {
            number,
            stem,
            parts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QuestionPointer {
    pub qi: usize,
    pub si: usize,
}

impl QuestionPointer {
    pub fn start() -> Self {
        Self { qi: 0, si: 0 }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ModuleBundle {
    pub module_id: String,
    pub title: String,
    pub questions: Vec<Question>,
    // Best-effort per-question answer blocks; alignment is not guaranteed.
    pub answers: Vec<Vec<String>>,
    pub notes: Vec<String>,
    #[serde(default)]
    pub diagrams: serde_json::Value,
}

impl ModuleBundle {
    pub fn subparts_count(&self, qi: usize) -> usize {
        match self.questions.get(qi) {
            Some(q) => q.parts.len().max(1),
            None => 1,
        }
    }

    pub fn question_text(&self, ptr: QuestionPointer) -> String {
        let q = match self.questions.get(ptr.qi) {
            Some(q) => q,
            None => return String::new(),
        };
        let stem = q.stem.trim();
        if q.parts.is_empty() {
            return stem.to_string();
        }
        let si = ptr.si.min(q.parts.len() - 1);
        let letter = (b'a' + si.min(25) as u8) as char;
        format!("{}\n\n{}) {}", stem, letter, q.parts[si].trim())
    }

    // Advance to next subpart; if none, next question; None at end of module.
    pub fn next_pointer(&self, ptr: QuestionPointer) -> Option<QuestionPointer> {
        let count = self.subparts_count(ptr.qi);
        if ptr.si + 1 < count {
            return Some(QuestionPointer {
                qi: ptr.qi,
                si: ptr.si + 1,
            });
        }
        if ptr.qi + 1 < self.questions.len() {
            return Some(QuestionPointer {
                qi: ptr.qi + 1,
                si: 0,
            });
        }
        None
    }

    // diagrams.json can optionally include {"bonus_question": "..."},
    // or the notes file can end with a "BONUS: ..." line.
    pub fn bonus_question(&self) -> Option<String> {
        if let Some(b) = self.diagrams.get("bonus_question").and_then(|v| v.as_str()) {
            if !b.trim().is_empty() {
                return Some(b.trim().to_string());
            }
        }
        for line in self.notes.iter().rev() {
            let t = line.trim();
            if t.to_lowercase().starts_with("bonus:") {
                return Some(t["bonus:".len()..].trim().to_string());
            }
        }
        None
    }
}

// Enough to restore a session's position later; the presentation layer
// decides where (if anywhere) this gets stored.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionSnapshot {
    pub student: String,
    pub module_id: String,
    pub ptr: QuestionPointer,
}
