//! Script templates.
//!
//! Rendering is two-phase. Phase one composes text: fragments are
//! concatenated into a [`Template`] made of [`Segment`]s. Phase two substitutes
//! `{{ name }}` placeholders in a single pass against a closed [`ParamSet`].
//! A placeholder with no value is an error, never emitted silently, and a
//! substituted value is never rescanned.

mod fragments;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex_lite::Regex;

use crate::error::{Error, Result};

pub use fragments::{compose, Fragment, Preamble};

/// Indentation applied to multi-line values embedded as YAML block scalars.
pub const EMBED_INDENT: &str = "  ";

/// Get the regex matching a well-formed placeholder: {{ name }}
pub fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER_REGEX
        .get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid regex"))
}

/// A piece of template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Scanned for placeholders
    Text(String),
    /// Emitted verbatim
    Literal(String),
}

/// Composed template text, ready for substitution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a template from placeholder-bearing text.
    pub fn text(text: impl Into<String>) -> Self {
        let mut template = Self::new();
        template.push_text(text);
        template
    }

    pub fn push_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.segments.push(Segment::Text(text.into()));
        self
    }

    pub fn push_literal(&mut self, text: impl Into<String>) -> &mut Self {
        self.segments.push(Segment::Literal(text.into()));
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Placeholder names referenced by the text segments.
    pub fn placeholders(&self) -> BTreeSet<String> {
        let re = placeholder_regex();
        self.text_segments()
            .flat_map(|text| re.captures_iter(text).map(|caps| caps[1].to_string()))
            .collect()
    }

    /// Reject text with an opening `{{` that is not a well-formed placeholder.
    pub fn check(&self) -> Result<()> {
        let re = placeholder_regex();
        for text in self.text_segments() {
            let stripped = re.replace_all(text, "");
            if let Some(pos) = stripped.find("{{") {
                let context: String = stripped[pos..].chars().take(24).collect();
                return Err(Error::Template(format!(
                    "Malformed placeholder near '{}'",
                    context.trim_end()
                )));
            }
        }
        Ok(())
    }

    /// Substitute every placeholder in one pass.
    pub fn render(&self, params: &ParamSet) -> Result<String> {
        self.check()?;

        let missing: Vec<String> = self
            .placeholders()
            .into_iter()
            .filter(|name| !params.contains(name))
            .collect();
        if !missing.is_empty() {
            return Err(Error::Template(format!(
                "Unresolved placeholder(s): {}",
                missing.join(", ")
            )));
        }

        let re = placeholder_regex();
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => {
                    let rendered = re.replace_all(text, |caps: &regex_lite::Captures| {
                        params.get(&caps[1]).unwrap_or_default().to_string()
                    });
                    out.push_str(&rendered);
                }
                Segment::Literal(text) => out.push_str(text),
            }
        }
        Ok(out)
    }

    fn text_segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Text(text) => Some(text.as_str()),
            Segment::Literal(_) => None,
        })
    }
}

/// Closed set of placeholder values.
///
/// Values are single-line so that substitution never breaks the indentation
/// of an embedded block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamSet {
    values: BTreeMap<String, String>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a single-line value.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) -> Result<&mut Self> {
        let value = value.into();
        if value.contains('\n') || value.contains('\r') {
            return Err(Error::Template(format!(
                "Value for '{}' must be a single line",
                name
            )));
        }
        self.values.insert(name.to_string(), value);
        Ok(self)
    }

    /// Bind a value that lands in a shell word, quoted or not.
    pub fn insert_shell(&mut self, name: &str, value: impl Into<String>) -> Result<&mut Self> {
        let value = value.into();
        check_shell_word(name, &value)?;
        self.insert(name, value)
    }

    /// Bind several shell words joined by single spaces.
    pub fn insert_shell_words<S: AsRef<str>>(
        &mut self,
        name: &str,
        words: &[S],
    ) -> Result<&mut Self> {
        for word in words {
            check_shell_word(name, word.as_ref())?;
        }
        let joined: Vec<&str> = words.iter().map(AsRef::as_ref).collect();
        self.insert(name, joined.join(" "))
    }

    /// Bind `${var:-fallback}`: the runtime's environment value, else `fallback`.
    pub fn insert_env_default(
        &mut self,
        name: &str,
        var: &str,
        fallback: &str,
    ) -> Result<&mut Self> {
        let valid_var = var
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_uppercase() || c == '_')
            && var
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
        if !valid_var {
            return Err(Error::Template(format!(
                "Value for '{}' names an invalid variable '{}'",
                name, var
            )));
        }
        check_shell_word(name, fallback)?;
        self.insert(name, format!("${{{}:-{}}}", var, fallback))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

fn is_shell_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, '.' | '_' | '-' | '/' | ':' | '@' | '%' | '+' | '=' | ',')
}

/// True when `value` expands to itself in any shell word context.
///
/// Allowed: ASCII alphanumerics and `. _ - / : @ % + = ,`.
pub fn is_shell_word(value: &str) -> bool {
    value.chars().all(is_shell_word_char)
}

fn check_shell_word(name: &str, value: &str) -> Result<()> {
    match value.chars().find(|&c| !is_shell_word_char(c)) {
        Some(bad) => Err(Error::Template(format!(
            "Value for '{}' contains shell-unsafe character {:?}",
            name, bad
        ))),
        None => Ok(()),
    }
}

/// Prefix every non-empty line with `indent`.
///
/// Empty lines stay empty, so a block scalar never gains trailing spaces.
pub fn reindent(text: &str, indent: &str) -> String {
    text.split('\n')
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", indent, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> ParamSet {
        let mut set = ParamSet::new();
        for (k, v) in pairs {
            set.insert(k, *v).unwrap();
        }
        set
    }

    #[test]
    fn test_render_substitutes_all_spacings() {
        let template = Template::text("a={{ a }} b={{b}} c={{  a  }}");
        let out = template.render(&params(&[("a", "1"), ("b", "2")])).unwrap();
        assert_eq!(out, "a=1 b=2 c=1");
    }

    #[test]
    fn test_render_rejects_unresolved() {
        let template = Template::text("{{ jobid }} {{ tasks }} {{ nodes }}");
        let err = template.render(&params(&[("jobid", "x")])).unwrap_err();
        assert_eq!(err.code(), "TEMPLATE_ERROR");
        assert!(err.to_string().contains("nodes, tasks"));
    }

    #[test]
    fn test_render_is_single_pass() {
        let template = Template::text("{{ a }}");
        let out = template.render(&params(&[("a", "{{ b }}"), ("b", "no")])).unwrap();
        assert_eq!(out, "{{ b }}");
    }

    #[test]
    fn test_literal_segments_are_not_scanned() {
        let mut template = Template::text("x={{ a }}\n");
        template.push_literal("{{ not_a_placeholder }} {{");
        let out = template.render(&params(&[("a", "1")])).unwrap();
        assert_eq!(out, "x=1\n{{ not_a_placeholder }} {{");
        assert_eq!(
            template.placeholders().into_iter().collect::<Vec<_>>(),
            vec!["a"]
        );
    }

    #[test]
    fn test_malformed_placeholder() {
        let template = Template::text("echo {{ broken");
        assert!(template.check().is_err());
        assert!(template.render(&ParamSet::new()).is_err());

        let template = Template::text("echo {{ 9lives }}");
        assert!(template.check().is_err());
    }

    #[test]
    fn test_shell_values_are_checked() {
        let mut set = ParamSet::new();
        assert!(set.insert("a", "two\nlines").is_err());
        assert!(set.insert_shell("b", "say \"hi\"").is_err());
        assert!(set.insert_shell("c", "`id`").is_err());
        assert!(set.insert_shell("e", "a; rm -rf $HOME").is_err());
        assert!(set.insert_shell("f", "/tmp/$(touch /tmp/x)").is_err());
        assert!(set.insert_shell("g", "two words").is_err());
        assert!(set.insert_shell("h", "${JOBID:-job_a}").is_err());
        assert!(set
            .insert_shell("d", "registry-0.wf1.ns1.svc.cluster.local:5000")
            .is_ok());
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["d"]);
    }

    #[test]
    fn test_env_default_binding() {
        let mut set = ParamSet::new();
        set.insert_env_default("jobid", "JOBID", "job_wf1").unwrap();
        assert_eq!(set.get("jobid"), Some("${JOBID:-job_wf1}"));

        assert!(set.insert_env_default("x", "JOBID", "a}$(id)").is_err());
        assert!(set.insert_env_default("x", "job id", "a").is_err());
        assert!(set.insert_env_default("x", "", "a").is_err());
    }

    #[test]
    fn test_shell_word_lists() {
        let mut set = ParamSet::new();
        set.insert_shell_words("stages", &["a", "b"]).unwrap();
        assert_eq!(set.get("stages"), Some("a b"));
        assert!(set.insert_shell_words("bad", &["a", "b;c"]).is_err());
        assert!(!set.contains("bad"));
    }

    #[test]
    fn test_reindent_every_line() {
        let out = reindent("one\n  two\n\nthree\n", "  ");
        assert_eq!(out, "  one\n    two\n\n  three\n");
    }
}
