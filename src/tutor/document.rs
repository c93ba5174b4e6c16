use std::path::PathBuf;

use regex::Regex;

use crate::tutor::Question;

#[derive(Debug)]
pub enum DocumentError {
    // No recognizable question-start line in a non-empty document.
    ParseFailure(String),
    ModuleNotFound(PathBuf),
    Io(std::io::Error),
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentError::ParseFailure(msg) => write!(f, "failed to parse document: {}", msg),
            DocumentError::ModuleNotFound(path) => {
                write!(f, "module folder not found: {}", path.display())
            }
            DocumentError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for DocumentError {}

impl From<std::io::Error> for DocumentError {
    fn from(e: std::io::Error) -> Self {
        DocumentError::Io(e)
    }
}

pub struct DocumentParser {
    // "1. " or "1) ", capturing the printed number
    q_line: Regex,
    // "a." ... "f)" at the start of a line
    sub_line: Regex,
    // "a." / "b)" markers embedded inside a line. The regex crate has no
    // lookbehind, so instead of (?<!\w) we consume the preceding non-word
    // character and take offsets from the letter capture group.
    inline_part: Regex,
}

impl Default for DocumentParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser {
    pub fn new() -> Self {
        Self {
            q_line: Regex::new(r"^\s*(\d+)\s*[.)]\s*").unwrap(),
            sub_line: Regex::new(r"^\s*[a-fA-F]\s*[.)]\s*").unwrap(),
            inline_part: Regex::new(r"(?:^|[^A-Za-z0-9_])([A-Za-z])[.)]\s+").unwrap(),
        }
    }

    // Convert raw document lines into the question outline.
    // - a "1." / "1)" line starts a new question
    // - an "a." ... "f)" line starts a new sub-part of the current question
    // - any other non-blank line continues the last sub-part, or the stem
    // - lines before the first question line are discarded
    // Markers are stripped from the stored text; the printed question number
    // is kept in Question::number for concept-spec key resolution.
    pub fn parse_questions(&self, lines: &[String]) -> Result<Vec<Question>, DocumentError> {
        let mut out: Vec<Question> = Vec::new();
        let mut cur: Option<Question> = None;
        let mut saw_content = false;

        for raw in lines {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            saw_content = true;

            if let Some(caps) = self.q_line.captures(line) {
                if let Some(q) = cur.take() {
                    out.push(q);
                }
                let number = caps[1].parse::<u32>().ok();
                let rest = &line[caps.get(0).unwrap().end()..];
                // Split inline "a. ... b. ..." markers if the whole question
                // was compressed onto this one line.
                let (stem, parts) = self.split_inline_parts(rest);
                cur = Some(Question::new(number, stem, parts));
                continue;
            }

            let cur_q = match cur.as_mut() {
                Some(q) => q,
                // Preamble before the first recognized question.
                None => continue,
            };

            if let Some(m) = self.sub_line.find(line) {
                cur_q.parts.push(line[m.end()..].trim().to_string());
            } else if let Some(last) = cur_q.parts.last_mut() {
                *last = format!("{} {}", last, line).trim().to_string();
            } else {
                cur_q.stem = format!("{} {}", cur_q.stem, line).trim().to_string();
            }
        }

        if let Some(q) = cur.take() {
            out.push(q);
        }

        if out.is_empty() && saw_content {
            return Err(DocumentError::ParseFailure(
                "no question-start lines found".to_string(),
            ));
        }
        Ok(out)
    }

    // "... a. foo b. bar" -> ("...", ["foo", "bar"]); (text, []) if no markers.
    fn split_inline_parts(&self, text: &str) -> (String, Vec<String>) {
        let s = text.trim();
        // (letter position, text-after-marker position) for each marker
        let marks: Vec<(usize, usize)> = self
            .inline_part
            .captures_iter(s)
            .map(|c| {
                let letter = c.get(1).unwrap();
                (letter.start(), c.get(0).unwrap().end())
            })
            .collect();
        if marks.is_empty() {
            return (s.to_string(), Vec::new());
        }

        let stem = s[..marks[0].0].trim().to_string();
        let mut parts = Vec::new();
        for (i, &(_, body_start)) in marks.iter().enumerate() {
            let end = marks.get(i + 1).map(|&(ls, _)| ls).unwrap_or(s.len());
            let body = s[body_start..end].trim_matches([' ', '\t', '-', ':', ';'].as_ref());
            if !body.is_empty() {
                parts.push(body.to_string());
            }
        }
        (stem, parts)
    }

    // Best-effort split of an answers document into one block per question,
    // using the same "1." / "1)" headings as delimiters. Padded or truncated
    // to the outline's question count; alignment is not validated.
    pub fn group_answers(&self, answer_lines: &[String], q_count: usize) -> Vec<Vec<String>> {
        let mut groups: Vec<Vec<String>> = Vec::new();
        let mut cur: Vec<String> = Vec::new();
        for ln in answer_lines {
            if self.q_line.is_match(ln) {
                if !cur.is_empty() {
                    groups.push(std::mem::take(&mut cur));
                }
                cur.push(ln.clone());
            } else {
                cur.push(ln.clone());
            }
        }
        if !cur.is_empty() {
            groups.push(cur);
        }
        groups.resize_with(q_count.max(groups.len()), Vec::new);
        groups.truncate(q_count);
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(|l| l.to_string()).collect()
    }

    #[test]
    fn parses_questions_and_lettered_subparts() {
        let doc = lines(
            "Intro text to be discarded\n\
             1. What is a tumor?\n\
             a) Define benign.\n\
             b) Define malignant.\n\
             2) Why does risk rise with age?",
        );
        let parser = DocumentParser::new();
        let qs = parser.parse_questions(&doc).unwrap();
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].number, Some(1));
        assert_eq!(qs[0].stem, "What is a tumor?");
        assert_eq!(qs[0].parts, vec!["Define benign.", "Define malignant."]);
        assert_eq!(qs[1].number, Some(2));
        assert!(qs[1].parts.is_empty());
    }

    #[test]
    fn continuation_lines_join_stem_and_last_part() {
        let doc = lines(
            "3. A stem that\n\
             continues here\n\
             a) first part\n\
             still the first part",
        );
        let qs = DocumentParser::new().parse_questions(&doc).unwrap();
        assert_eq!(qs[0].stem, "A stem that continues here");
        assert_eq!(qs[0].parts, vec!["first part still the first part"]);
    }

    #[test]
    fn splits_inline_subpart_markers() {
        let doc = lines("3. First part a. alpha b. beta");
        let qs = DocumentParser::new().parse_questions(&doc).unwrap();
        assert_eq!(qs.len(), 1);
        assert_eq!(qs[0].number, Some(3));
        assert_eq!(qs[0].stem, "First part");
        assert_eq!(qs[0].parts, vec!["alpha", "beta"]);
    }

    #[test]
    fn inline_marker_needs_word_boundary() {
        // "A." at the end of "DNA." must not start a sub-part, but a
        // standalone " a. " must.
        let doc = lines("1. Label the DNA. a. one b. two");
        let qs = DocumentParser::new().parse_questions(&doc).unwrap();
        assert_eq!(qs[0].stem, "Label the DNA.");
        assert_eq!(qs[0].parts, vec!["one", "two"]);
    }

    #[test]
    fn parsing_is_idempotent() {
        let doc = lines("1. Stem a. x b. y\n2. Other\nmore stem");
        let parser = DocumentParser::new();
        let a = parser.parse_questions(&doc).unwrap();
        let b = parser.parse_questions(&doc).unwrap();
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn empty_input_gives_empty_outline() {
        let qs = DocumentParser::new().parse_questions(&[]).unwrap();
        assert!(qs.is_empty());
    }

    #[test]
    fn no_question_lines_is_a_parse_failure() {
        let doc = lines("just prose\nno numbering anywhere");
        let err = DocumentParser::new().parse_questions(&doc).unwrap_err();
        assert!(matches!(err, DocumentError::ParseFailure(_)));
    }

    #[test]
    fn groups_answers_and_pads_to_question_count() {
        let parser = DocumentParser::new();
        let ans = lines(
            "leading commentary\n\
             1. first answer\n\
             with detail\n\
             2. second answer",
        );
        let groups = parser.group_answers(&ans, 4);
        assert_eq!(groups.len(), 4);
        assert_eq!(groups[0], vec!["leading commentary"]);
        assert_eq!(groups[1], vec!["1. first answer", "with detail"]);
        assert!(groups[3].is_empty());
    }

    #[test]
    fn truncates_extra_answer_blocks() {
        let parser = DocumentParser::new();
        let ans = lines("1. a\n2. b\n3. c");
        let groups = parser.group_answers(&ans, 2);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1], vec!["2. b"]);
    }
}
