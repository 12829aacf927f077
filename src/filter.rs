use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Compound line predicate: OR of AND include groups, a flat exclude list and
/// independent case flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRule {
    pub include_groups: Vec<Vec<String>>,
    pub exclude_terms: Vec<String>,
    pub include_case_sensitive: bool,
    pub exclude_case_sensitive: bool,
    pub highlight_case_sensitive: bool,
    /// Stream mode only: force-include lines that don't look like structured
    /// log lines (shell echo, prompts).
    pub show_raw_lines: bool,
}

impl Default for FilterRule {
    fn default() -> Self {
        Self {
            include_groups: Vec::new(),
            exclude_terms: Vec::new(),
            include_case_sensitive: false,
            exclude_case_sensitive: false,
            highlight_case_sensitive: false,
            show_raw_lines: true,
        }
    }
}

impl FilterRule {
    /// Builds a rule from the textual include/exclude fields.
    ///
    /// Include: `a && b || c` means (a AND b) OR c. Exclude: `x || y` rejects
    /// lines containing x or y. Terms with spaces or operators can be quoted.
    pub fn parse(include: &str, exclude: &str) -> Result<Self> {
        let include_groups = if include.trim().is_empty() {
            Vec::new()
        } else {
            parse_groups(include)?
        };
        let exclude_terms = if exclude.trim().is_empty() {
            Vec::new()
        } else {
            let groups = parse_groups(exclude)?;
            if groups.iter().any(|g| g.len() > 1) {
                return Err(anyhow!("'&&' is not allowed in the exclude list"));
            }
            groups.into_iter().flatten().collect()
        };
        Ok(Self {
            include_groups,
            exclude_terms,
            ..Self::default()
        })
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.include_case_sensitive = case_sensitive;
        self.exclude_case_sensitive = case_sensitive;
        self.highlight_case_sensitive = case_sensitive;
        self
    }

    /// True when trimming leaves no include and no exclude term.
    pub fn is_unfiltered(&self) -> bool {
        let no_include = self
            .include_groups
            .iter()
            .all(|group| group.iter().all(|t| t.trim().is_empty()));
        let no_exclude = self.exclude_terms.iter().all(|t| t.trim().is_empty());
        no_include && no_exclude
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    And,
    Or,
    Term(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '&' => {
                chars.next();
                if chars.next() == Some('&') {
                    tokens.push(Token::And);
                } else {
                    return Err(anyhow!("Expected '&&'"));
                }
            }
            '|' => {
                chars.next();
                if chars.next() == Some('|') {
                    tokens.push(Token::Or);
                } else {
                    return Err(anyhow!("Expected '||'"));
                }
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut term = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some('\\') => {
                            if let Some(escaped) = chars.next() {
                                term.push(escaped);
                            }
                        }
                        Some(ch) => term.push(ch),
                        None => return Err(anyhow!("Unterminated string")),
                    }
                }
                tokens.push(Token::Term(term));
            }
            _ => {
                let mut term = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch == '&' || ch == '|' || ch == ' ' || ch == '\t' {
                        break;
                    }
                    term.push(ch);
                    chars.next();
                }
                tokens.push(Token::Term(term));
            }
        }
    }
    Ok(tokens)
}

/// Adjacent bare words are joined with a space, so `connection reset` is one
/// term.
fn parse_groups(input: &str) -> Result<Vec<Vec<String>>> {
    let tokens = tokenize(input)?;
    let mut groups = Vec::new();
    let mut group: Vec<String> = Vec::new();
    let mut term: Option<String> = None;

    for (pos, token) in tokens.into_iter().enumerate() {
        match token {
            Token::Term(t) => match term.as_mut() {
                Some(current) => {
                    current.push(' ');
                    current.push_str(&t);
                }
                None => term = Some(t),
            },
            Token::And | Token::Or => {
                let Some(t) = term.take() else {
                    return Err(anyhow!("Missing term before operator at position {}", pos));
                };
                group.push(t);
                if token == Token::Or {
                    groups.push(std::mem::take(&mut group));
                }
            }
        }
    }
    match term {
        Some(t) => group.push(t),
        None => return Err(anyhow!("Unexpected end of expression")),
    }
    groups.push(group);
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn groups(v: &[&[&str]]) -> Vec<Vec<String>> {
        v.iter()
            .map(|g| g.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn or_of_and_groups() {
        let rule = FilterRule::parse("error && db || fatal", "").unwrap();
        assert_eq!(rule.include_groups, groups(&[&["error", "db"], &["fatal"]]));
        assert!(rule.exclude_terms.is_empty());
    }

    #[test]
    fn quoted_terms_keep_operators() {
        let rule = FilterRule::parse(r#""a||b" && 'x && y'"#, "").unwrap();
        assert_eq!(rule.include_groups, groups(&[&["a||b", "x && y"]]));
    }

    #[test]
    fn bare_words_join_into_one_term() {
        let rule = FilterRule::parse("connection reset || timeout", "").unwrap();
        assert_eq!(
            rule.include_groups,
            groups(&[&["connection reset"], &["timeout"]])
        );
    }

    #[test]
    fn exclude_list_is_flat() {
        let rule = FilterRule::parse("", "debug || trace").unwrap();
        assert_eq!(rule.exclude_terms, vec!["debug", "trace"]);
        assert!(FilterRule::parse("", "a && b").is_err());
    }

    #[test]
    fn dangling_operators_are_errors() {
        assert!(FilterRule::parse("error &&", "").is_err());
        assert!(FilterRule::parse("|| error", "").is_err());
        assert!(FilterRule::parse("a & b", "").is_err());
        assert!(FilterRule::parse("\"open", "").is_err());
    }

    #[test]
    fn blank_rule_is_unfiltered() {
        assert!(FilterRule::default().is_unfiltered());
        let rule = FilterRule {
            include_groups: groups(&[&["  "], &[]]),
            exclude_terms: vec![" ".into()],
            ..FilterRule::default()
        };
        assert!(rule.is_unfiltered());
        assert!(!FilterRule::parse("x", "").unwrap().is_unfiltered());
    }
}
