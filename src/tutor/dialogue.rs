use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::tutor::concepts::{is_gibberish, is_uncertain, ConceptChecker, ConceptSpec, SpecMap};
use crate::tutor::{ModuleBundle, QuestionPointer, SessionSnapshot};

const GIBBERISH_FIRST: &str = "I couldn't understand that response.\n\
    Try again using a short sentence (a few real words), or skip to the next question.";
const GIBBERISH_REPEAT: &str =
    "Still not quite readable — let's keep moving. Skip to the next question when you're ready.";
const UNCERTAIN_REPEAT: &str = "That's totally okay — sometimes it's best to keep moving. \
    Skip to the next question when you're ready.";
const DEFAULT_UNCERTAINTY_FOLLOWUP: &str =
    "Take a moment to jot down even a rough idea — what comes to mind?";
const NO_SPEC_FALLBACK: &str = "Nice start — can you add one more molecular detail?";
const DEFAULT_ENCOURAGEMENT: &str = "Keep going — you're on the right track.";
const DEFAULT_FOLLOWUP: &str = "What part of the mechanism is still unclear?";

pub const QUESTION_COMPLETE: &str = "Nice work — you've hit the key ideas for this question.";
pub const MODULE_COMPLETE: &str = "You've completed this module!";

// One student submission as the engine sees it: the accumulated answer
// history for the question plus the latest fragment and its classification.
// Counts are the values from BEFORE this submission.
pub struct Submission<'a> {
    pub qid: usize,
    pub part_idx: usize,
    pub explicit_number: Option<u32>,
    pub history: &'a str,
    pub latest: &'a str,
    pub uncertain_now: bool,
    pub uncertain_count: u32,
    pub gibberish_now: bool,
    pub gibberish_count: u32,
}

// message == None is the completion sentinel: all required concepts covered,
// the caller may advance the pointer. The missing lists ride along for
// scoring/analytics consumers.
pub struct FollowupOutcome {
    pub message: Option<String>,
    pub missing_required: Vec<String>,
    pub missing_optional: Vec<String>,
}

pub struct DialogueEngine {
    rng: StdRng,
}

impl Default for DialogueEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DialogueEngine {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    // Fixed seed so tests can pin down which phrase variant gets picked.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn socratic_followup(
        &mut self,
        checker: &ConceptChecker,
        specs: &SpecMap,
        sub: &Submission<'_>,
    ) -> FollowupOutcome {
        let (missing_required, missing_optional, spec) = checker.evaluate(
            specs,
            sub.qid,
            sub.history,
            sub.part_idx,
            sub.explicit_number,
        );
        let done = |message: Option<String>| FollowupOutcome {
            message,
            missing_required: missing_required.clone(),
            missing_optional: missing_optional.clone(),
        };

        // Unreadable input beats everything else; only the latest fragment counts.
        if sub.gibberish_now {
            if sub.gibberish_count >= 1 {
                return done(Some(GIBBERISH_REPEAT.to_string()));
            }
            return done(Some(GIBBERISH_FIRST.to_string()));
        }

        if sub.uncertain_now {
            if sub.uncertain_count >= 1 {
                return done(Some(UNCERTAIN_REPEAT.to_string()));
            }
            return done(Some(uncertainty_message(spec)));
        }

        let spec = match spec {
            Some(s) => s,
            None => return done(Some(NO_SPEC_FALLBACK.to_string())),
        };

        // A known-wrong value in the latest fragment gets its registered
        // rebuttal before the generic missing-concept prompt.
        if !missing_required.is_empty() {
            let latest = sub.latest.trim().to_lowercase();
            for (wrong, prompts) in &spec.wrong_triggers {
                let wrong_s = wrong.trim();
                if wrong_s.is_empty() {
                    continue;
                }
                let hit = if wrong_s.chars().any(|c| c.is_ascii_digit()) {
                    // digit boundaries so "1.8" never fires inside "21.8"
                    digit_bounded_contains(&latest, wrong_s)
                } else {
                    latest.contains(&wrong_s.to_lowercase())
                };
                if hit {
                    if let Some(text) = prompts.pick(&mut self.rng) {
                        let text = text.to_string();
                        let msg = format!("{} {}", self.encouragement(spec), text);
                        return done(Some(msg));
                    }
                }
            }
        }

        if missing_required.is_empty() {
            return done(None);
        }

        let concept = &missing_required[0];
        let follow = spec
            .followups
            .get(concept)
            .and_then(|p| p.pick(&mut self.rng))
            .unwrap_or(DEFAULT_FOLLOWUP)
            .to_string();
        let msg = format!("{} {}", self.encouragement(spec), follow);
        done(Some(msg))
    }

    fn encouragement(&mut self, spec: &ConceptSpec) -> String {
        spec.encouragement
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_else(|| DEFAULT_ENCOURAGEMENT.to_string())
    }
}

fn uncertainty_message(spec: Option<&ConceptSpec>) -> String {
    let follow = spec
        .and_then(|s| s.uncertainty_followup.as_deref())
        .unwrap_or(DEFAULT_UNCERTAINTY_FOLLOWUP)
        .trim();
    format!(
        "That's totally okay — this concept can be tricky!\n{}\n\
         If you'd like, you can also skip to the next question.",
        follow
    )
}

// Substring search that refuses matches touching adjacent digits.
fn digit_bounded_contains(haystack: &str, needle: &str) -> bool {
    for (i, _) in haystack.match_indices(needle) {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + needle.len()..].chars().next();
        let before_ok = before.map_or(true, |c| !c.is_ascii_digit());
        let after_ok = after.map_or(true, |c| !c.is_ascii_digit());
        if before_ok && after_ok {
            return true;
        }
    }
    false
}

#[derive(Debug)]
pub enum SubmitOutcome {
    // Same pointer, one targeted follow-up queued.
    Followup(String),
    // Required concepts covered (or an explicit skip): pointer advanced.
    // next_question == None means the module is finished.
    Advanced {
        message: String,
        next_question: Option<String>,
    },
}

// Owns everything mutable for one student working one module: the pointer,
// the per-question counters and the accumulated answer history. The bundle,
// spec map and checker are shared read-only.
pub struct TutorSession {
    student: String,
    bundle: Arc<ModuleBundle>,
    specs: Arc<SpecMap>,
    checker: Arc<ConceptChecker>,
    engine: DialogueEngine,
    ptr: Option<QuestionPointer>,
    uncertain_counts: HashMap<usize, u32>,
    gibberish_counts: HashMap<usize, u32>,
    answer_history: HashMap<usize, String>,
    last_missing_required: Vec<String>,
    last_missing_optional: Vec<String>,
}

impl TutorSession {
    pub fn new(
        student: impl Into<String>,
        bundle: Arc<ModuleBundle>,
        specs: Arc<SpecMap>,
        checker: Arc<ConceptChecker>,
        engine: DialogueEngine,
    ) -> Self {
        let ptr = if bundle.questions.is_empty() {
            None
        } else {
            Some(QuestionPointer::start())
        };
        Self {
            student: student.into(),
            bundle,
            specs,
            checker,
            engine,
            ptr,
            uncertain_counts: HashMap::new(),
            gibberish_counts: HashMap::new(),
            answer_history: HashMap::new(),
            last_missing_required: Vec::new(),
            last_missing_optional: Vec::new(),
        }
    }

    pub fn restore(
        snapshot: SessionSnapshot,
        bundle: Arc<ModuleBundle>,
        specs: Arc<SpecMap>,
        checker: Arc<ConceptChecker>,
        engine: DialogueEngine,
    ) -> Self {
        let mut session = Self::new(snapshot.student, bundle, specs, checker, engine);
        if snapshot.ptr.qi < session.bundle.questions.len() {
            session.ptr = Some(snapshot.ptr);
        }
        session
    }

    pub fn student(&self) -> &str {
        &self.student
    }

    pub fn pointer(&self) -> Option<QuestionPointer> {
        self.ptr
    }

    pub fn bundle(&self) -> &ModuleBundle {
        &self.bundle
    }

    pub fn current_question(&self) -> Option<String> {
        self.ptr.map(|p| self.bundle.question_text(p))
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.ptr.map(|ptr| SessionSnapshot {
            student: self.student.clone(),
            module_id: self.bundle.module_id.clone(),
            ptr,
        })
    }

    // Missing-concept lists from the most recent submission, for
    // scoring/analytics consumers. The terminal UI ignores these.
    pub fn last_missing(&self) -> (&[String], &[String]) {
        (&self.last_missing_required, &self.last_missing_optional)
    }

    pub fn submit(&mut self, answer: &str) -> SubmitOutcome {
        let ptr = match self.ptr {
            Some(p) => p,
            None => {
                return SubmitOutcome::Advanced {
                    message: MODULE_COMPLETE.to_string(),
                    next_question: None,
                }
            }
        };

        let ans = answer.trim();
        let uncertain_now = is_uncertain(ans);
        let gibberish_now = is_gibberish(ans);

        let prior_uncertain = self.uncertain_counts.get(&ptr.qi).copied().unwrap_or(0);
        let prior_gibberish = self.gibberish_counts.get(&ptr.qi).copied().unwrap_or(0);
        if uncertain_now {
            *self.uncertain_counts.entry(ptr.qi).or_insert(0) += 1;
        }
        if gibberish_now {
            *self.gibberish_counts.entry(ptr.qi).or_insert(0) += 1;
        }

        // Required concepts are judged against everything said so far for
        // this question; uncertainty replies never enter the history.
        let prev = self.answer_history.get(&ptr.qi).cloned().unwrap_or_default();
        let combined = if uncertain_now {
            prev
        } else {
            let c = format!("{} {}", prev, ans).trim().to_string();
            self.answer_history.insert(ptr.qi, c.clone());
            c
        };

        let question = &self.bundle.questions[ptr.qi];
        let sub = Submission {
            qid: ptr.qi,
            part_idx: ptr.si,
            explicit_number: question.number,
            history: &combined,
            latest: ans,
            uncertain_now,
            uncertain_count: prior_uncertain,
            gibberish_now,
            gibberish_count: prior_gibberish,
        };
        let outcome = self.engine.socratic_followup(&self.checker, &self.specs, &sub);
        self.last_missing_required = outcome.missing_required;
        self.last_missing_optional = outcome.missing_optional;

        match outcome.message {
            Some(msg) => SubmitOutcome::Followup(msg),
            None => {
                self.ptr = self.bundle.next_pointer(ptr);
                SubmitOutcome::Advanced {
                    message: QUESTION_COMPLETE.to_string(),
                    next_question: self.current_question(),
                }
            }
        }
    }

    // Explicit skip: advance regardless of concepts. Returns the next
    // question text, or None once the module is done.
    pub fn skip(&mut self) -> Option<String> {
        let ptr = self.ptr?;
        self.ptr = self.bundle.next_pointer(ptr);
        self.current_question()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tutor::concepts::{ConceptSpec, PromptSet, SynonymTable};
    use crate::tutor::Question;

    fn cancer_table() -> SynonymTable {
        let mut t = SynonymTable::default();
        let mut concepts = HashMap::new();
        concepts.insert(
            "benign".to_string(),
            vec!["noninvasive".to_string(), "localized growth".to_string()],
        );
        concepts.insert(
            "malignant".to_string(),
            vec!["invasive".to_string(), "can spread".to_string()],
        );
        t.domains.insert("cancer".to_string(), concepts);
        t
    }

    fn spec_benign_malignant() -> ConceptSpec {
        ConceptSpec {
            concept_domain: Some("cancer".into()),
            required_concepts: vec!["benign".into(), "malignant".into()],
            ..Default::default()
        }
    }

    fn session_with(spec: ConceptSpec, questions: Vec<Question>) -> TutorSession {
        let bundle = ModuleBundle {
            module_id: "m1".into(),
            title: "m1".into(),
            questions,
            answers: vec![],
            notes: vec![],
            diagrams: serde_json::Value::Null,
        };
        let mut specs = SpecMap::new();
        specs.insert("1".into(), spec);
        TutorSession::new(
            "Ada",
            Arc::new(bundle),
            Arc::new(specs),
            Arc::new(ConceptChecker::new(cancer_table())),
            DialogueEngine::with_seed(1),
        )
    }

    fn one_question() -> Vec<Question> {
        vec![Question::new(Some(1), "Compare tumor types.".into(), vec![])]
    }

    #[test]
    fn accumulates_history_until_required_concepts_covered() {
        let mut s = session_with(spec_benign_malignant(), one_question());
        match s.submit("the lump is benign") {
            SubmitOutcome::Followup(_) => {}
            other => panic!("expected follow-up, got {:?}", other),
        }
        assert_eq!(s.last_missing().0, ["malignant".to_string()]);
        // "invasive" is a registered malignant variant; combined with the
        // earlier benign mention this completes the question.
        match s.submit("a malignant one is invasive") {
            SubmitOutcome::Advanced { next_question, .. } => assert!(next_question.is_none()),
            other => panic!("expected advance, got {:?}", other),
        }
        assert!(s.last_missing().0.is_empty());
        assert!(s.pointer().is_none());
    }

    #[test]
    fn gibberish_prompt_then_terminal_nudge() {
        let mut s = session_with(spec_benign_malignant(), one_question());
        match s.submit("sdlkfjsdlkfjsdf") {
            SubmitOutcome::Followup(m) => assert!(m.contains("couldn't understand")),
            other => panic!("{:?}", other),
        }
        match s.submit("qwrtpsdfghjklz") {
            SubmitOutcome::Followup(m) => assert!(m.contains("Still not quite readable")),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn uncertainty_uses_spec_override_then_terminal_nudge() {
        let mut spec = spec_benign_malignant();
        spec.uncertainty_followup = Some("Think about invasion.".into());
        let mut s = session_with(spec, one_question());
        match s.submit("idk") {
            SubmitOutcome::Followup(m) => assert!(m.contains("Think about invasion.")),
            other => panic!("{:?}", other),
        }
        match s.submit("still not sure") {
            SubmitOutcome::Followup(m) => assert!(m.contains("best to keep moving")),
            other => panic!("{:?}", other),
        }
        // uncertainty answers never entered the history
        assert!(s.answer_history.get(&0).is_none());
    }

    #[test]
    fn missing_spec_falls_back_to_generic_prompt() {
        let bundle = ModuleBundle {
            module_id: "m1".into(),
            title: "m1".into(),
            questions: one_question(),
            answers: vec![],
            notes: vec![],
            diagrams: serde_json::Value::Null,
        };
        let mut s = TutorSession::new(
            "Ada",
            Arc::new(bundle),
            Arc::new(SpecMap::new()),
            Arc::new(ConceptChecker::new(SynonymTable::default())),
            DialogueEngine::with_seed(1),
        );
        match s.submit("some honest attempt at an answer") {
            SubmitOutcome::Followup(m) => assert!(m.contains("one more molecular detail")),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn wrong_trigger_preempts_generic_followup() {
        let mut spec = spec_benign_malignant();
        spec.wrong_triggers.insert(
            "7.0".into(),
            PromptSet::One("Remember pH is not pI here.".into()),
        );
        let mut s = session_with(spec, one_question());
        match s.submit("the pH is 7.0 exactly") {
            SubmitOutcome::Followup(m) => assert!(m.contains("Remember pH is not pI here.")),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn numeric_trigger_respects_digit_boundaries() {
        let mut spec = spec_benign_malignant();
        spec.wrong_triggers
            .insert("1.8".into(), PromptSet::One("Wrong pKa.".into()));
        let mut s = session_with(spec, one_question());
        // "1.8" sits inside "21.8" and must not fire
        match s.submit("my reading was 21.8 overall") {
            SubmitOutcome::Followup(m) => assert!(!m.contains("Wrong pKa.")),
            other => panic!("{:?}", other),
        }
        match s.submit("so maybe 1.8 then") {
            SubmitOutcome::Followup(m) => assert!(m.contains("Wrong pKa.")),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn followup_names_first_missing_concept_prompt() {
        let mut spec = spec_benign_malignant();
        spec.followups.insert(
            "benign".into(),
            PromptSet::One("Which growth stays put?".into()),
        );
        let mut s = session_with(spec, one_question());
        match s.submit("cancer is when cells grow") {
            SubmitOutcome::Followup(m) => assert!(m.contains("Which growth stays put?")),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn seeded_engines_pick_identical_phrases() {
        let mut spec = spec_benign_malignant();
        spec.encouragement = vec!["Good push.".into(), "Nearly there.".into()];
        spec.followups.insert(
            "benign".into(),
            PromptSet::Many(vec!["Variant one?".into(), "Variant two?".into()]),
        );
        let run = || {
            let mut s = session_with(spec.clone(), one_question());
            match s.submit("an attempt without the right words") {
                SubmitOutcome::Followup(m) => m,
                other => panic!("{:?}", other),
            }
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn skip_walks_subparts_then_finishes() {
        let questions = vec![Question::new(
            Some(1),
            "Stem".into(),
            vec!["one".into(), "two".into()],
        )];
        let mut s = session_with(spec_benign_malignant(), questions);
        let next = s.skip().unwrap();
        assert!(next.contains("b) two"));
        assert!(s.skip().is_none());
        assert!(s.pointer().is_none());
    }

    #[test]
    fn restore_resumes_at_snapshot_pointer() {
        let questions = vec![
            Question::new(Some(1), "One".into(), vec![]),
            Question::new(Some(2), "Two".into(), vec![]),
        ];
        let mut s = session_with(spec_benign_malignant(), questions);
        s.skip().unwrap();
        let snap = s.snapshot().unwrap();

        let resumed = TutorSession::restore(
            snap,
            Arc::clone(&s.bundle),
            Arc::clone(&s.specs),
            Arc::clone(&s.checker),
            DialogueEngine::with_seed(1),
        );
        assert_eq!(resumed.pointer().unwrap().qi, 1);
        assert_eq!(resumed.current_question().unwrap(), "Two");
    }

    #[test]
    fn digit_boundary_scan() {
        assert!(digit_bounded_contains("ph of 7.0 today", "7.0"));
        assert!(!digit_bounded_contains("ph of 17.0 today", "7.0"));
        assert!(!digit_bounded_contains("ph of 7.01 today", "7.0"));
        assert!(digit_bounded_contains("7.0", "7.0"));
    }
}
