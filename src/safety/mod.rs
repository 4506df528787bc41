//! Textual screening of submitted code against a blocklist.
//!
//! This is a best-effort filter. It catches the obvious ways of reaching the
//! host (shelling out, writing files, dynamic evaluation) and nothing more.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};

/// Built-in blocklist. Matched case-insensitively.
pub const DEFAULT_PATTERNS: &[&str] = &[
    r"os\.system",
    r"subprocess",
    r#"(open|file)\s*\(\s*["'][^"']+["']\s*,\s*["']w"#,
    r"exec\s*\(",
    r"eval\s*\(",
    r"import\s+os",
    r"import\s+subprocess",
    r"from\s+os\s+import",
    r"from\s+subprocess\s+import",
    r"__import__\s*\(",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    /// Index of the first matching rule. Kept server-side only.
    Rejected { rule: usize },
}

impl Verdict {
    pub fn is_rejected(self) -> bool {
        matches!(self, Verdict::Rejected { .. })
    }
}

/// Ordered, read-only set of danger patterns.
#[derive(Debug, Clone)]
pub struct DangerPatterns {
    rules: Vec<Regex>,
}

impl DangerPatterns {
    pub fn defaults() -> Self {
        Self::compile(DEFAULT_PATTERNS.iter().copied())
            .expect("built-in danger patterns compile")
    }

    pub fn compile<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let rules = patterns
            .into_iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .with_context(|| format!("invalid danger pattern: {p}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// One pattern per line; blank lines and `#` comments are skipped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading danger patterns: {}", path.display()))?;
        Self::compile(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#')),
        )
    }

    /// Loads from `path` when given, otherwise the built-in list.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::defaults()),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn screen(&self, code: &str) -> Verdict {
        match self.rules.iter().position(|r| r.is_match(code)) {
            Some(rule) => Verdict::Rejected { rule },
            None => Verdict::Accepted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rejects_each_category() {
        let patterns = DangerPatterns::defaults();
        let samples = [
            "import os\nos.system('ls')",
            "import subprocess",
            "from subprocess import run",
            "open('out.txt', 'w').write('x')",
            "file(\"x\",\"wb\")",
            "exec ('print(1)')",
            "eval(\"1+1\")",
            "from os import path",
            "m = __import__('os')",
        ];
        for code in samples {
            assert!(patterns.screen(code).is_rejected(), "should reject: {code}");
        }
    }

    #[test]
    fn matching_ignores_case() {
        let patterns = DangerPatterns::defaults();
        assert!(patterns.screen("IMPORT OS").is_rejected());
        assert!(patterns.screen("Os.System('x')").is_rejected());
    }

    #[test]
    fn accepts_ordinary_code() {
        let patterns = DangerPatterns::defaults();
        let code = "import numpy as np\nx = np.arange(3)\nprint(open('data.csv').read())\n";
        assert_eq!(patterns.screen(code), Verdict::Accepted);
    }

    #[test]
    fn reports_first_matching_rule() {
        let patterns = DangerPatterns::defaults();
        assert_eq!(patterns.screen("os.system('x')"), Verdict::Rejected { rule: 0 });
        assert_eq!(patterns.screen("eval(x)"), Verdict::Rejected { rule: 4 });
    }

    #[test]
    fn screening_is_deterministic() {
        let patterns = DangerPatterns::defaults();
        let code = "print('eval (is fine without a paren right after)')";
        assert_eq!(patterns.screen(code), patterns.screen(code));
    }

    #[test]
    fn loads_patterns_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "# network access").unwrap();
        writeln!(f, "socket").unwrap();
        writeln!(f).unwrap();
        writeln!(f, r"urllib\.request").unwrap();
        let patterns = DangerPatterns::load(Some(f.path())).unwrap();
        assert_eq!(patterns.len(), 2);
        assert!(patterns.screen("import SOCKET").is_rejected());
        assert!(!patterns.screen("import os").is_rejected());
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let err = DangerPatterns::compile(["(unclosed"]).unwrap_err();
        assert!(err.to_string().contains("(unclosed"));
    }
}
