//! Ignore pattern matching
//!
//! CVS-ignore semantics over child leaf names: a folder's patterns extend
//! a default set, a lone `!` clears everything accumulated so far, and
//! matching is pure glob against the leaf name.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// The stock ignore list of the CVS client family.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "RCS", "SCCS", "CVS", "CVS.adm", "RCSLOG", "cvslog.*", "tags", "TAGS", ".make.state",
    ".nse_depinfo", "*~", "#*", ".#*", ",*", "_$*", "*$", "*.old", "*.bak", "*.BAK", "*.orig",
    "*.rej", ".del-*", "*.a", "*.olb", "*.o", "*.obj", "*.so", "*.exe", "*.Z", "*.elc", "*.ln",
    "core",
];

/// Pattern that clears the accumulated ignore list.
const CLEAR_MARKER: &str = "!";

/// A compiled matcher for one folder's effective ignore list.
#[derive(Debug)]
pub struct IgnoreMatcher {
    set: GlobSet,
    patterns: Vec<String>,
}

impl IgnoreMatcher {
    /// Compile the effective pattern list: defaults first, then the
    /// folder's own patterns, with `!` clearing everything before it.
    pub fn compile(
        defaults: &[String],
        folder_patterns: &[String],
        case_sensitive: bool,
    ) -> Result<Self, globset::Error> {
        let mut effective: Vec<String> = defaults.to_vec();
        for pattern in folder_patterns {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }
            if pattern == CLEAR_MARKER {
                effective.clear();
            } else {
                effective.push(pattern.to_string());
            }
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in &effective {
            builder.add(
                GlobBuilder::new(pattern)
                    .case_insensitive(!case_sensitive)
                    .build()?,
            );
        }
        Ok(IgnoreMatcher {
            set: builder.build()?,
            patterns: effective,
        })
    }

    /// Match a child leaf name against the effective list.
    pub fn matches(&self, name: &str) -> bool {
        self.set.is_match(name)
    }

    /// The effective pattern list the matcher was compiled from.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Vec<String> {
        DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn default_list_applies() {
        let matcher = IgnoreMatcher::compile(&defaults(), &[], true).unwrap();
        assert!(matcher.matches("core"));
        assert!(matcher.matches("editor.bak"));
        assert!(matcher.matches("scratch~"));
        assert!(matcher.matches("CVS"));
        assert!(!matcher.matches("main.rs"));
    }

    #[test]
    fn folder_patterns_extend_defaults() {
        let matcher =
            IgnoreMatcher::compile(&defaults(), &["*.log".to_string()], true).unwrap();
        assert!(matcher.matches("build.log"));
        assert!(matcher.matches("core"));
    }

    #[test]
    fn bang_clears_accumulated_patterns() {
        let folder = vec!["!".to_string(), "*.log".to_string()];
        let matcher = IgnoreMatcher::compile(&defaults(), &folder, true).unwrap();
        assert!(matcher.matches("build.log"));
        // Defaults were cleared by the bang.
        assert!(!matcher.matches("core"));
    }

    #[test]
    fn case_sensitivity_is_configurable() {
        let folder = vec!["*.log".to_string()];
        let sensitive = IgnoreMatcher::compile(&[], &folder, true).unwrap();
        assert!(!sensitive.matches("BUILD.LOG"));
        let insensitive = IgnoreMatcher::compile(&[], &folder, false).unwrap();
        assert!(insensitive.matches("BUILD.LOG"));
    }
}
