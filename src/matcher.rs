use crate::filter::FilterRule;
use aho_corasick::AhoCorasick;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::warn;

/// Lines carrying this marker are synthetic test traffic and are always shown
/// in stream mode, whatever the filter says.
pub const SIMULATION_MARKER: &str = "[LOGSIFT-SIMULATION]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    File,
    Stream,
}

// Approximate classifier for "this looks like a structured log line". Shell
// output that happens to match one of these is treated as a log line.
static CLOCK_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,2}:\d{2}:\d{2}").unwrap());
static KERNEL_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[?\s*\d+\.\d+\]?").unwrap());
static LEVEL_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z]/").unwrap());

pub fn looks_like_log_line(line: &str) -> bool {
    CLOCK_TIME.is_match(line) || KERNEL_TIME.is_match(line) || LEVEL_TAG.is_match(line)
}

/// Case-aware set of literal terms searched in one pass.
#[derive(Debug, Clone)]
struct TermSet {
    automaton: AhoCorasick,
    case_sensitive: bool,
    len: usize,
}

impl TermSet {
    fn new(terms: &[String], case_sensitive: bool) -> Option<Self> {
        if terms.is_empty() {
            return None;
        }
        let patterns: Vec<String> = terms
            .iter()
            .map(|t| fold_case(t, case_sensitive))
            .collect();
        let automaton = match AhoCorasick::new(&patterns) {
            Ok(automaton) => automaton,
            Err(e) => {
                warn!(error = %e, terms = patterns.len(), "term set not built, terms ignored");
                return None;
            }
        };
        Some(Self {
            automaton,
            case_sensitive,
            len: patterns.len(),
        })
    }

    fn any_in(&self, line: &str) -> bool {
        if self.case_sensitive {
            self.automaton.is_match(line)
        } else {
            self.automaton.is_match(&line.to_lowercase())
        }
    }

    fn present_in(&self, line: &str) -> Vec<bool> {
        let mut seen = vec![false; self.len];
        let folded;
        let haystack = if self.case_sensitive {
            line
        } else {
            folded = line.to_lowercase();
            folded.as_str()
        };
        for m in self.automaton.find_overlapping_iter(haystack) {
            seen[m.pattern().as_usize()] = true;
        }
        seen
    }
}

fn fold_case(term: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        term.to_string()
    } else {
        term.to_lowercase()
    }
}

/// A [`FilterRule`] with its terms trimmed, deduplicated and compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    excludes: Option<TermSet>,
    includes: Option<TermSet>,
    groups: Vec<Vec<usize>>,
    show_raw_lines: bool,
}

impl CompiledRule {
    pub fn new(rule: &FilterRule) -> Self {
        let exclude_terms: Vec<String> = rule
            .exclude_terms
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        let mut include_terms: Vec<String> = Vec::new();
        let mut ids: HashMap<String, usize> = HashMap::new();
        let mut groups = Vec::new();
        for group in &rule.include_groups {
            let mut members = Vec::new();
            for term in group.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
                let key = fold_case(term, rule.include_case_sensitive);
                let id = *ids.entry(key).or_insert_with(|| {
                    include_terms.push(term.to_string());
                    include_terms.len() - 1
                });
                if !members.contains(&id) {
                    members.push(id);
                }
            }
            if !members.is_empty() {
                groups.push(members);
            }
        }

        Self {
            excludes: TermSet::new(&exclude_terms, rule.exclude_case_sensitive),
            includes: TermSet::new(&include_terms, rule.include_case_sensitive),
            groups,
            show_raw_lines: rule.show_raw_lines,
        }
    }

    /// No term survived trimming: every line passes.
    pub fn is_passthrough(&self) -> bool {
        self.excludes.is_none() && self.groups.is_empty()
    }

    pub fn matches(&self, line: &str, mode: SourceMode) -> bool {
        if mode == SourceMode::Stream {
            if line.contains(SIMULATION_MARKER) {
                return true;
            }
            if self.show_raw_lines && !looks_like_log_line(line) {
                return true;
            }
        }

        if let Some(excludes) = &self.excludes {
            if excludes.any_in(line) {
                return false;
            }
        }

        let Some(includes) = &self.includes else {
            return true;
        };
        let present = includes.present_in(line);
        self.groups
            .iter()
            .any(|group| group.iter().all(|&id| present[id]))
    }
}

/// `None` means no filter is configured.
pub fn matches(line: &str, rule: Option<&CompiledRule>, mode: SourceMode) -> bool {
    match rule {
        Some(rule) => rule.matches(line, mode),
        None => true,
    }
}
