//! Search & replace over a document's live content.
//!
//! The literal tier is grounded on the teacher's `search/literal_search.rs`
//! (smart-case, ASCII fast path vs. Unicode slow path); the regex tier
//! delegates to an injected `RegexEngine`, whose default implementation is
//! grounded on the teacher's use of `monster-regex` (`Regex::new`,
//! `Regex::find_at`) in `search/mod.rs`. Unlike the teacher, which streams
//! matches over a zero-copy `Haystack` abstraction spanning the gap buffer,
//! this module searches a materialized byte snapshot of the document — a
//! deliberate simplification recorded in the grounding ledger.

use std::ops::Range;

use crate::error::{EditError, EditResult, Notification};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Literal,
    Regex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch {
    pub range: Range<usize>,
}

/// Search state owned by a Document.
#[derive(Debug, Clone)]
pub struct SearchState {
    pub pattern: String,
    pub kind: SearchKind,
    pub forward: bool,
    pub case_insensitive: bool,
    pub advance_from_last_match: bool,
    pub last_match_pos: Option<usize>,
    pub invalid: bool,
    cached_all: Option<Vec<SearchMatch>>,
}

impl Default for SearchState {
    fn default() -> Self {
        SearchState {
            pattern: String::new(),
            kind: SearchKind::Literal,
            forward: true,
            case_insensitive: false,
            advance_from_last_match: false,
            last_match_pos: None,
            invalid: true,
            cached_all: None,
        }
    }
}

impl SearchState {
    /// Set a new pattern, invalidating any cached `find_all` results.
    pub fn set_pattern(&mut self, pattern: impl Into<String>, kind: SearchKind) {
        self.pattern = pattern.into();
        self.kind = kind;
        self.case_insensitive = !self.pattern.chars().any(char::is_uppercase);
        self.invalid = true;
        self.cached_all = None;
    }

    pub fn invalidate(&mut self) {
        self.invalid = true;
        self.cached_all = None;
    }
}

/// Capture span for a regex match, as returned by `RegexEngine::exec`.
#[derive(Debug, Clone)]
pub struct RegexMatch {
    pub range: Range<usize>,
    pub captures: Vec<Option<Range<usize>>>,
}

/// Regex compile-time flags. Hand-rolled rather than pulling in a bitflags
/// crate: only four flags exist and the teacher has no such dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegexFlags(u8);

impl RegexFlags {
    pub const CASE_INSENSITIVE: RegexFlags = RegexFlags(0b0001);
    pub const MULTILINE: RegexFlags = RegexFlags(0b0010);
    pub const DOTALL: RegexFlags = RegexFlags(0b0100);
    pub const EXTENDED: RegexFlags = RegexFlags(0b1000);

    pub fn empty() -> Self {
        RegexFlags(0)
    }

    pub fn contains(self, other: RegexFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for RegexFlags {
    type Output = RegexFlags;
    fn bitor(self, rhs: RegexFlags) -> RegexFlags {
        RegexFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for RegexFlags {
    fn bitor_assign(&mut self, rhs: RegexFlags) {
        self.0 |= rhs.0;
    }
}

/// External regex interface, injected so the core never depends on one
/// regex engine's exact API beyond this seam.
pub trait RegexEngine {
    fn compile(&self, pattern: &str, flags: RegexFlags) -> EditResult<Box<dyn CompiledRegex>>;
}

pub trait CompiledRegex {
    fn exec(&self, text: &str, start_byte: usize) -> Option<RegexMatch>;
    /// Expand a replacement template's `$1`, `$2`, ... references against a match's captures.
    fn expand_replacement(&self, template: &str, text: &str, m: &RegexMatch) -> String {
        let mut out = String::new();
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '$' {
                if let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        let mut num = String::new();
                        while let Some(&d) = chars.peek() {
                            if d.is_ascii_digit() {
                                num.push(d);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        let idx: usize = num.parse().unwrap_or(0);
                        if idx == 0 {
                            out.push_str(&text[m.range.clone()]);
                        } else if let Some(Some(span)) = m.captures.get(idx - 1) {
                            out.push_str(&text[span.clone()]);
                        }
                        continue;
                    }
                }
            }
            out.push(c);
        }
        out
    }
}

/// Default `RegexEngine` backed by `monster-regex`, the crate the teacher's
/// own search module already depends on.
pub struct MonsterRegexEngine;

struct MonsterCompiledRegex {
    regex: monster_regex::Regex,
}

impl RegexEngine for MonsterRegexEngine {
    fn compile(&self, pattern: &str, flags: RegexFlags) -> EditResult<Box<dyn CompiledRegex>> {
        let mr_flags = monster_regex::Flags {
            case_insensitive: flags.contains(RegexFlags::CASE_INSENSITIVE),
            multiline: flags.contains(RegexFlags::MULTILINE),
            dotall: flags.contains(RegexFlags::DOTALL),
            extended: flags.contains(RegexFlags::EXTENDED),
        };
        let regex = monster_regex::Regex::new(pattern, mr_flags)
            .map_err(|e| EditError::new(crate::error::ErrorKind::Regex, "REGEX_COMPILE", e.to_string()))?;
        Ok(Box::new(MonsterCompiledRegex { regex }))
    }
}

impl CompiledRegex for MonsterCompiledRegex {
    fn exec(&self, text: &str, start_byte: usize) -> Option<RegexMatch> {
        let m = self.regex.find_at(text, start_byte)?;
        Some(RegexMatch {
            range: m.start..m.end,
            captures: Vec::new(),
        })
    }
}

fn is_literal_match_ascii(haystack: &[u8], pattern: &[u8], pos: usize, case_insensitive: bool) -> bool {
    if pos + pattern.len() > haystack.len() {
        return false;
    }
    let slice = &haystack[pos..pos + pattern.len()];
    if case_insensitive {
        slice.eq_ignore_ascii_case(pattern)
    } else {
        slice == pattern
    }
}

/// Tier 1 literal search, smart-case (uppercase anywhere in the pattern
/// forces case-sensitive matching), ASCII fast path vs. Unicode slow path.
pub fn find_literal(text: &str, pattern: &str, start_byte: usize, forward: bool) -> Option<SearchMatch> {
    if pattern.is_empty() {
        return Some(SearchMatch {
            range: start_byte..start_byte,
        });
    }
    let case_insensitive = !pattern.chars().any(char::is_uppercase);

    if pattern.is_ascii() && text.is_ascii() {
        let haystack = text.as_bytes();
        let needle = pattern.as_bytes();
        if forward {
            for pos in start_byte..=haystack.len().saturating_sub(needle.len()) {
                if is_literal_match_ascii(haystack, needle, pos, case_insensitive) {
                    return Some(SearchMatch {
                        range: pos..pos + needle.len(),
                    });
                }
            }
        } else {
            let upper = start_byte.min(haystack.len().saturating_sub(needle.len()));
            for pos in (0..=upper).rev() {
                if is_literal_match_ascii(haystack, needle, pos, case_insensitive) {
                    return Some(SearchMatch {
                        range: pos..pos + needle.len(),
                    });
                }
            }
        }
        return None;
    }

    // Unicode slow path: char-by-char comparison, case-folded if needed.
    let hay_chars: Vec<(usize, char)> = text.char_indices().collect();
    let needle_chars: Vec<char> = if case_insensitive {
        pattern.to_lowercase().chars().collect()
    } else {
        pattern.chars().collect()
    };
    let start_idx = hay_chars.partition_point(|&(b, _)| b < start_byte);
    let try_match = |i: usize| -> Option<SearchMatch> {
        if i + needle_chars.len() > hay_chars.len() {
            return None;
        }
        for (k, &nc) in needle_chars.iter().enumerate() {
            let hc = hay_chars[i + k].1;
            let hc = if case_insensitive {
                hc.to_lowercase().next().unwrap_or(hc)
            } else {
                hc
            };
            if hc != nc {
                return None;
            }
        }
        let start = hay_chars[i].0;
        let end = hay_chars
            .get(i + needle_chars.len())
            .map(|&(b, _)| b)
            .unwrap_or(text.len());
        Some(SearchMatch { range: start..end })
    };
    if forward {
        (start_idx..hay_chars.len()).find_map(try_match)
    } else {
        (0..=start_idx.min(hay_chars.len())).rev().find_map(try_match)
    }
}

/// Find the next match from `cursor_offset`, wrapping once if necessary.
/// Returns the match plus a `Notification` if a wrap occurred.
pub fn find_next(
    text: &str,
    state: &mut SearchState,
    engine: Option<&dyn RegexEngine>,
    cursor_offset: usize,
    notification_id: u64,
) -> EditResult<(Option<SearchMatch>, Option<Notification>)> {
    if state.pattern.is_empty() {
        return Ok((None, None));
    }
    let first = search_once(text, state, engine, cursor_offset)?;
    if let Some(m) = first {
        state.last_match_pos = Some(m.range.start);
        return Ok((Some(m), None));
    }
    let wrap_from = if state.forward { 0 } else { text.len() };
    let second = search_once(text, state, engine, wrap_from)?;
    match second {
        Some(m) => {
            state.last_match_pos = Some(m.range.start);
            Ok((
                Some(m),
                Some(Notification::info(notification_id, "Search wrapped")),
            ))
        }
        None => Ok((None, None)),
    }
}

fn search_once(
    text: &str,
    state: &SearchState,
    engine: Option<&dyn RegexEngine>,
    from: usize,
) -> EditResult<Option<SearchMatch>> {
    match state.kind {
        SearchKind::Literal => Ok(find_literal(text, &state.pattern, from, state.forward)),
        SearchKind::Regex => {
            let engine = engine.ok_or_else(|| {
                EditError::state("NO_REGEX_ENGINE", "regex search requires an injected RegexEngine")
            })?;
            let mut flags = RegexFlags::empty();
            if state.case_insensitive {
                flags |= RegexFlags::CASE_INSENSITIVE;
            }
            let compiled = engine.compile(&state.pattern, flags)?;
            Ok(compiled.exec(text, from).map(|m| SearchMatch { range: m.range }))
        }
    }
}

/// Pre-compute every match for the interactive Find session. Cached on
/// `SearchState` until the pattern or buffer changes.
pub fn find_all(
    text: &str,
    state: &mut SearchState,
    engine: Option<&dyn RegexEngine>,
) -> EditResult<Vec<SearchMatch>> {
    if !state.invalid {
        if let Some(cached) = &state.cached_all {
            return Ok(cached.clone());
        }
    }
    let mut matches = Vec::new();
    match state.kind {
        SearchKind::Literal => {
            let mut pos = 0;
            while let Some(m) = find_literal(text, &state.pattern, pos, true) {
                let next = if m.range.is_empty() { m.range.end + 1 } else { m.range.end };
                matches.push(m);
                if next > text.len() {
                    break;
                }
                pos = next;
            }
        }
        SearchKind::Regex => {
            let engine = engine.ok_or_else(|| {
                EditError::state("NO_REGEX_ENGINE", "regex search requires an injected RegexEngine")
            })?;
            let mut flags = RegexFlags::empty();
            if state.case_insensitive {
                flags |= RegexFlags::CASE_INSENSITIVE;
            }
            let compiled = engine.compile(&state.pattern, flags)?;
            let mut pos = 0;
            while let Some(m) = compiled.exec(text, pos) {
                let next = if m.range.is_empty() { m.range.end + 1 } else { m.range.end };
                matches.push(SearchMatch { range: m.range });
                if next > text.len() {
                    break;
                }
                pos = next;
            }
        }
    }
    state.invalid = false;
    state.cached_all = Some(matches.clone());
    Ok(matches)
}

/// Caller's answer to a single Replace prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAnswer {
    Yes,
    No,
    All,
    Cancel,
}

/// Step-machine outcome driving the outer event loop, per the "coroutine-shaped
/// prompt loop" design note: the core never blocks on UI input itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceStep {
    ShowMatch { at: Range<usize> },
    Done { replacements: usize },
    Cancelled,
}

/// Caller-implemented responder that answers a pending Replace prompt.
/// Distinct from the `ReplaceStep` state machine: the machine *represents*
/// the prompt; `PromptResponder` is one way a caller might source answers
/// (e.g. scripted in tests, or real UI input in a consumer of this crate).
pub trait PromptResponder {
    fn answer(&mut self, at: &Range<usize>) -> PromptAnswer;
}

/// Drives `find -> prompt -> replace` across the whole document (or from the
/// cursor, per `advance_from_last_match`), calling `apply` to perform each
/// accepted replacement on the buffer. `apply` receives the match range and
/// the replacement text, and must return the byte length it actually wrote,
/// since capture-group expansion can change the replacement's length.
pub fn replace(
    text: &str,
    state: &mut SearchState,
    engine: Option<&dyn RegexEngine>,
    replacement_template: &str,
    responder: &mut dyn PromptResponder,
    mut apply: impl FnMut(&Range<usize>, &str) -> EditResult<()>,
) -> EditResult<ReplaceStep> {
    let mut pos = if state.advance_from_last_match {
        state.last_match_pos.unwrap_or(0)
    } else {
        0
    };
    let mut replacements = 0usize;
    let mut replace_all = false;

    loop {
        let found = search_once(text, state, engine, pos)?;
        let m = match found {
            Some(m) => m,
            None => return Ok(ReplaceStep::Done { replacements }),
        };

        let answer = if replace_all {
            PromptAnswer::Yes
        } else {
            responder.answer(&m.range)
        };

        match answer {
            PromptAnswer::Cancel => return Ok(ReplaceStep::Cancelled),
            PromptAnswer::No => {
                pos = if m.range.is_empty() { m.range.end + 1 } else { m.range.end };
            }
            PromptAnswer::Yes => {
                apply(&m.range, replacement_template)?;
                replacements += 1;
                pos = m.range.start + replacement_template.len().max(1);
                if !replace_all {
                    return Ok(ReplaceStep::ShowMatch { at: m.range });
                }
            }
            PromptAnswer::All => {
                replace_all = true;
                apply(&m.range, replacement_template)?;
                replacements += 1;
                pos = m.range.start + replacement_template.len().max(1);
            }
        }
        if pos > text.len() {
            return Ok(ReplaceStep::Done { replacements });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_find_smart_case() {
        let m = find_literal("Hello world", "hello", 0, true);
        assert_eq!(m.unwrap().range, 0..5);
        let m = find_literal("Hello world", "Hello", 0, true);
        assert_eq!(m.unwrap().range, 0..5);
        // uppercase in pattern forces case sensitivity
        assert!(find_literal("hello world", "Hello", 0, true).is_none());
    }

    #[test]
    fn find_all_collects_every_occurrence() {
        let mut state = SearchState::default();
        state.set_pattern("a", SearchKind::Literal);
        let matches = find_all("aaa", &mut state, None).unwrap();
        assert_eq!(matches.len(), 3);
    }

    #[test]
    fn find_next_wraps_and_notifies() {
        let mut state = SearchState::default();
        state.set_pattern("foo", SearchKind::Literal);
        let (m, notice) = find_next("foo bar foo", &mut state, None, 1, 11).unwrap();
        assert_eq!(m.unwrap().range, 0..3);
        assert!(notice.is_some());
    }

    struct AllResponder;
    impl PromptResponder for AllResponder {
        fn answer(&mut self, _at: &Range<usize>) -> PromptAnswer {
            PromptAnswer::All
        }
    }

    #[test]
    fn replace_all_is_grouped_by_caller_and_covers_every_match() {
        let mut state = SearchState::default();
        state.set_pattern("a", SearchKind::Literal);
        let mut responder = AllResponder;
        let mut applied = Vec::new();
        let step = replace("aaa", &mut state, None, "bb", &mut responder, |range, repl| {
            applied.push((range.clone(), repl.to_string()));
            Ok(())
        })
        .unwrap();
        match step {
            ReplaceStep::Done { replacements } => assert_eq!(replacements, 3),
            other => panic!("expected Done, got {other:?}"),
        }
    }
}
