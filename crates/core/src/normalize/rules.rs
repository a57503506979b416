//! Table of known-bad title rewrites.
//!
//! Titles entered by hand and filenames produced by scan groups disagree in
//! predictable ways. Each rule is a regex substitution applied once, in table
//! order, to the lowercased name. Later rules may rely on the output of
//! earlier ones (the generic "by kirkman & azaceta" removal runs after the
//! outcast-specific rewrite).

use once_cell::sync::Lazy;
use regex_lite::Regex;

/// A single substitution in the rewrite table.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pattern: Regex,
    replacement: String,
}

impl RewriteRule {
    /// Compile a rule. `replacement` may reference capture groups as `${1}`.
    pub fn new(pattern: &str, replacement: &str) -> Result<Self, regex_lite::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.to_string(),
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    fn apply(&self, input: &str) -> String {
        self.pattern
            .replace_all(input, self.replacement.as_str())
            .into_owned()
    }
}

/// Ordered list of rewrite rules.
#[derive(Debug, Clone)]
pub struct RewriteTable {
    rules: Vec<RewriteRule>,
}

/// Default rules as `(pattern, replacement)` pairs, in application order.
const DEFAULT_RULES: &[(&str, &str)] = &[
    (r"2000ad", "2000 ad"),
    (r"(abe sapien \d+) -.*", "${1}"),
    (r"(b\.p\.r\.d\. hell on earth \d+) -.*", "${1}"),
    (r"digital exclusives edition", ""),
    (r"garth ennis'?", ""),
    (r"george romero'?s", ""),
    (r"(outcast) by kirkman & azaceta", "${1}"),
    (r"the blood queen", "blood queen"),
    (r"the black bat", "black bat"),
    (r"the devilers", "devilers"),
    (r"robin rises omega", "robin rises"),
    (r"^trinity of sin - the phantom stranger", "the phantom stranger"),
    (r"by kirkman & azaceta", ""),
];

static DEFAULT_TABLE: Lazy<RewriteTable> = Lazy::new(|| {
    let rules = DEFAULT_RULES
        .iter()
        .map(|(pattern, replacement)| {
            RewriteRule::new(pattern, replacement).expect("default rewrite rules are valid")
        })
        .collect();
    RewriteTable { rules }
});

impl Default for RewriteTable {
    fn default() -> Self {
        DEFAULT_TABLE.clone()
    }
}

impl RewriteTable {
    /// An empty table that leaves names untouched.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Build a table from `(pattern, replacement)` pairs.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, regex_lite::Error>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let rules = pairs
            .into_iter()
            .map(|(pattern, replacement)| RewriteRule::new(pattern, replacement))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Append a rule; it runs after every existing rule.
    pub fn push(&mut self, rule: RewriteRule) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule once, in order.
    pub fn apply(&self, input: &str) -> String {
        self.rules
            .iter()
            .fold(input.to_string(), |acc, rule| rule.apply(&acc))
    }
}
