use crate::utils::Logger;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where a bundler alias points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasTarget {
    /// A file or directory, relative targets taken against the project root
    Path(PathBuf),
    /// Another specifier, resolved again from the same importer
    Specifier(String),
}

/// Alias rules from the bundler configuration (`"@": "./src"`, `"react": "preact/compat"`)
pub struct PathAliasResolver {
    /// Longest alias first so `@app` wins over `@`
    aliases: Vec<(String, String)>,
    root: PathBuf,
}

impl PathAliasResolver {
    pub fn new(aliases: &BTreeMap<String, String>, root: PathBuf) -> Self {
        let mut aliases: Vec<(String, String)> = aliases
            .iter()
            .map(|(alias, target)| (alias.trim_end_matches('/').to_string(), target.clone()))
            .collect();
        aliases.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Self { aliases, root }
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Rewrite `specifier` through the first matching alias, exact or `alias/` prefix
    pub fn resolve(&self, specifier: &str) -> Option<AliasTarget> {
        for (alias, target) in &self.aliases {
            if specifier == alias {
                return Some(self.resolve_target(target, None));
            }

            if let Some(rest) = specifier
                .strip_prefix(alias.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
            {
                let resolved = self.resolve_target(target, Some(rest));
                Logger::debug(&format!("🔗 Resolved alias: {} → {:?}", specifier, resolved));
                return Some(resolved);
            }
        }

        None
    }

    fn resolve_target(&self, target: &str, rest: Option<&str>) -> AliasTarget {
        let is_path = target.starts_with("./")
            || target.starts_with("../")
            || target == "."
            || Path::new(target).is_absolute();

        if is_path {
            let base = Path::new(target);
            let base = if base.is_absolute() {
                base.to_path_buf()
            } else {
                self.root.join(target.strip_prefix("./").unwrap_or(target))
            };
            AliasTarget::Path(match rest {
                Some(rest) => base.join(rest),
                None => base,
            })
        } else {
            AliasTarget::Specifier(match rest {
                Some(rest) => format!("{}/{}", target.trim_end_matches('/'), rest),
                None => target.to_string(),
            })
        }
    }
}

/// One `compilerOptions.paths` rule: `prefix*suffix` → target patterns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    pub prefix: String,
    pub suffix: String,
    pub wildcard: bool,
    pub targets: Vec<String>,
}

impl PathMapping {
    pub fn parse(pattern: &str, targets: Vec<String>) -> Self {
        match pattern.split_once('*') {
            Some((prefix, suffix)) => Self {
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
                wildcard: true,
                targets,
            },
            None => Self {
                prefix: pattern.to_string(),
                suffix: String::new(),
                wildcard: false,
                targets,
            },
        }
    }

    /// The text captured by `*`, or `Some("")` for an exact pattern match
    fn capture<'s>(&self, specifier: &'s str) -> Option<&'s str> {
        if !self.wildcard {
            return (specifier == self.prefix).then_some("");
        }
        if specifier.len() < self.prefix.len() + self.suffix.len() {
            return None;
        }
        specifier
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_suffix(self.suffix.as_str()))
    }
}

/// Order rules most-specific-first: exact patterns, then longer literal prefixes
pub fn sort_path_mappings(mappings: &mut [PathMapping]) {
    mappings.sort_by(|a, b| {
        a.wildcard
            .cmp(&b.wildcard)
            .then_with(|| b.prefix.len().cmp(&a.prefix.len()))
            .then_with(|| a.prefix.cmp(&b.prefix))
    });
}

/// Candidate paths for `specifier` from the first matching rule
pub fn path_mapping_candidates(
    mappings: &[PathMapping],
    base: &Path,
    specifier: &str,
) -> Vec<PathBuf> {
    for mapping in mappings {
        if let Some(captured) = mapping.capture(specifier) {
            return mapping
                .targets
                .iter()
                .map(|target| {
                    let target = target.replacen('*', captured, 1);
                    base.join(target.strip_prefix("./").unwrap_or(&target))
                })
                .collect();
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(a, t)| (a.to_string(), t.to_string()))
            .collect()
    }

    #[test]
    fn test_exact_alias_match() {
        let resolver = PathAliasResolver::new(&aliases(&[("@", "./src")]), PathBuf::from("/project"));
        assert_eq!(
            resolver.resolve("@"),
            Some(AliasTarget::Path(PathBuf::from("/project/src")))
        );
    }

    #[test]
    fn test_pattern_alias_match() {
        let resolver = PathAliasResolver::new(&aliases(&[("@", "./src")]), PathBuf::from("/project"));
        assert_eq!(
            resolver.resolve("@/components/Button"),
            Some(AliasTarget::Path(PathBuf::from("/project/src/components/Button")))
        );
    }

    #[test]
    fn test_longest_alias_wins() {
        let resolver = PathAliasResolver::new(
            &aliases(&[("@", "./src"), ("@app", "./app")]),
            PathBuf::from("/project"),
        );
        assert_eq!(
            resolver.resolve("@app/main"),
            Some(AliasTarget::Path(PathBuf::from("/project/app/main")))
        );
        assert_eq!(resolver.resolve("@apple"), None);
    }

    #[test]
    fn test_specifier_alias() {
        let resolver = PathAliasResolver::new(
            &aliases(&[("react", "preact/compat")]),
            PathBuf::from("/project"),
        );
        assert_eq!(
            resolver.resolve("react"),
            Some(AliasTarget::Specifier("preact/compat".into()))
        );
        assert_eq!(
            resolver.resolve("react/hooks"),
            Some(AliasTarget::Specifier("preact/compat/hooks".into()))
        );
    }

    #[test]
    fn test_no_alias_match() {
        let resolver = PathAliasResolver::new(&aliases(&[("@", "./src")]), PathBuf::from("/project"));
        assert_eq!(resolver.resolve("./relative/path.js"), None);
    }

    #[test]
    fn test_path_mappings_most_specific_first() {
        let mut mappings = vec![
            PathMapping::parse("*", vec!["./vendor/*".into()]),
            PathMapping::parse("@lib/*", vec!["./lib/*".into(), "./fallback/*".into()]),
            PathMapping::parse("@lib/special/*", vec!["./special/*".into()]),
            PathMapping::parse("config", vec!["./config/index.ts".into()]),
        ];
        sort_path_mappings(&mut mappings);

        let base = Path::new("/p");
        assert_eq!(
            path_mapping_candidates(&mappings, base, "@lib/special/x"),
            vec![PathBuf::from("/p/special/x")]
        );
        assert_eq!(
            path_mapping_candidates(&mappings, base, "@lib/util"),
            vec![PathBuf::from("/p/lib/util"), PathBuf::from("/p/fallback/util")]
        );
        assert_eq!(
            path_mapping_candidates(&mappings, base, "config"),
            vec![PathBuf::from("/p/config/index.ts")]
        );
        assert_eq!(
            path_mapping_candidates(&mappings, base, "lodash"),
            vec![PathBuf::from("/p/vendor/lodash")]
        );
    }
}
