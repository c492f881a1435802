//! Attribute path candidates for a package name and version
//!
//! Some package families encode their version in the nixpkgs attribute
//! name (`nodejs_18`, `python312`, `go_1_22`). The deriver proposes those
//! attributes first, then each family's unversioned fallbacks, and always
//! ends with the sanitized package name itself.

mod families;

pub use families::parse_loose_version;

use semver::Version;

type Matcher = Box<dyn Fn(&str) -> bool + Send + Sync>;
type Deriver = Box<dyn Fn(&Version) -> String + Send + Sync>;

/// A naming convention shared by one package family
pub struct FamilyStrategy {
    name: String,
    matcher: Matcher,
    derive: Deriver,
    fallbacks: Vec<String>,
}

impl FamilyStrategy {
    pub fn new(
        name: impl Into<String>,
        matcher: impl Fn(&str) -> bool + Send + Sync + 'static,
        derive: impl Fn(&Version) -> String + Send + Sync + 'static,
        fallbacks: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            matcher: Box::new(matcher),
            derive: Box::new(derive),
            fallbacks: fallbacks.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Strategy matching any of `aliases` exactly (case-insensitive)
    pub fn for_aliases(
        name: impl Into<String>,
        aliases: &'static [&'static str],
        derive: impl Fn(&Version) -> String + Send + Sync + 'static,
        fallbacks: &[&str],
    ) -> Self {
        Self::new(
            name,
            move |pkg: &str| aliases.iter().any(|a| a.eq_ignore_ascii_case(pkg)),
            derive,
            fallbacks,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, package: &str) -> bool {
        (self.matcher)(package)
    }

    fn contribute(&self, version: Option<&Version>, out: &mut Vec<String>) {
        if let Some(version) = version {
            out.push((self.derive)(version));
        }
        out.extend(self.fallbacks.iter().cloned());
    }
}

impl std::fmt::Debug for FamilyStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FamilyStrategy")
            .field("name", &self.name)
            .field("fallbacks", &self.fallbacks)
            .finish_non_exhaustive()
    }
}

/// Ordered set of family strategies
#[derive(Debug, Default)]
pub struct FamilyRegistry {
    strategies: Vec<FamilyStrategy>,
}

impl FamilyRegistry {
    /// Registry with no families; every name degenerates to itself
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in families
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        for strategy in families::builtin() {
            registry.register(strategy);
        }
        registry
    }

    /// Append a strategy; later strategies contribute after earlier ones
    pub fn register(&mut self, strategy: FamilyStrategy) -> &mut Self {
        self.strategies.push(strategy);
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Ordered, de-duplicated attribute candidates, most specific first.
    ///
    /// Always contains the sanitized package name (unless it sanitizes to
    /// nothing). Duplicates keep their first position, so a family that
    /// lists the bare name as a fallback decides where it goes.
    pub fn candidates(&self, name: &str, version: &str) -> Vec<String> {
        let name = name.trim();
        let parsed = parse_loose_version(version);

        let mut raw = Vec::new();
        for strategy in self.strategies.iter().filter(|s| s.matches(name)) {
            strategy.contribute(parsed.as_ref(), &mut raw);
        }
        raw.push(name.to_string());

        let mut out: Vec<String> = Vec::with_capacity(raw.len());
        for candidate in raw.iter().map(|c| sanitize(c)) {
            if !candidate.is_empty() && !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        out
    }
}

/// Strip characters that cannot appear in an attribute name
pub fn sanitize(candidate: &str) -> String {
    candidate
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+'))
        .collect()
}
