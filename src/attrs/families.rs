//! Built-in package families and lenient version parsing

use super::FamilyStrategy;
use semver::Version;

/// Parse `18`, `3.12`, `v1.22.1` or `2.0.0-rc1` into a semver version.
///
/// Missing minor/patch components are padded with zero. Returns `None` for
/// versions with no leading numeric component.
pub fn parse_loose_version(version: &str) -> Option<Version> {
    let trimmed = version.trim().trim_start_matches(['v', 'V']);
    if let Ok(v) = Version::parse(trimmed) {
        return Some(v);
    }

    // Split off any pre-release/build suffix before padding
    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split);

    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    if !parts
        .iter()
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }

    let mut padded: Vec<String> = parts
        .iter()
        .map(|p| p.trim_start_matches('0'))
        .map(|p| if p.is_empty() { "0".to_string() } else { p.to_string() })
        .collect();
    while padded.len() < 3 {
        padded.push("0".to_string());
    }

    Version::parse(&format!("{}{}", padded.join("."), suffix))
        .or_else(|_| Version::parse(&padded.join(".")))
        .ok()
}

pub(super) fn builtin() -> Vec<FamilyStrategy> {
    vec![
        FamilyStrategy::for_aliases(
            "nodejs",
            &["node", "nodejs"],
            |v| format!("nodejs_{}", v.major),
            &["nodejs"],
        ),
        FamilyStrategy::for_aliases(
            "python",
            &["python", "python3"],
            |v| format!("python{}{}", v.major, v.minor),
            &["python3", "python"],
        ),
        FamilyStrategy::for_aliases(
            "go",
            &["go", "golang"],
            |v| format!("go_{}_{}", v.major, v.minor),
            &["go"],
        ),
        FamilyStrategy::for_aliases(
            "ruby",
            &["ruby"],
            |v| format!("ruby_{}_{}", v.major, v.minor),
            &["ruby"],
        ),
        FamilyStrategy::for_aliases(
            "postgresql",
            &["postgres", "postgresql"],
            |v| format!("postgresql_{}", v.major),
            &["postgresql"],
        ),
        FamilyStrategy::for_aliases(
            "jdk",
            &["java", "jdk", "openjdk"],
            |v| format!("jdk{}", v.major),
            &["jdk", "openjdk"],
        ),
        FamilyStrategy::for_aliases(
            "php",
            &["php"],
            |v| format!("php{}{}", v.major, v.minor),
            &["php"],
        ),
        FamilyStrategy::for_aliases(
            "perl",
            &["perl"],
            |v| format!("perl{}{:02}", v.major, v.minor),
            &["perl"],
        ),
    ]
}
