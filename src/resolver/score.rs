//! Deterministic ranking of search hits

use crate::model::SearchHit;
use std::cmp::Ordering;

/// OS part of a Nix system double, e.g. `linux` in `x86_64-linux`
fn os_family(system: &str) -> &str {
    system.split_once('-').map(|(_, os)| os).unwrap_or(system)
}

/// 0 = exact system, 1 = same OS family, 2 = other or unknown
fn system_rank(hit: &SearchHit, system: &str) -> u8 {
    let systems: Vec<&str> = hit
        .system
        .iter()
        .chain(hit.platforms.iter())
        .map(String::as_str)
        .collect();

    if systems.contains(&system) {
        0
    } else if systems.iter().any(|s| os_family(s) == os_family(system)) {
        1
    } else {
        2
    }
}

fn version_rank(hit: &SearchHit, version: Option<&str>) -> u8 {
    match (hit.version.as_deref(), version) {
        (Some(found), Some(wanted)) if found == wanted => 0,
        _ => 1,
    }
}

fn candidate_rank(hit: &SearchHit, candidates: &[String]) -> usize {
    candidates
        .iter()
        .position(|c| c == &hit.attribute_path)
        .unwrap_or(candidates.len())
}

/// Pick the best usable hit.
///
/// Hits without a commit are discarded. The rest are ordered by exact
/// version match, then position in `candidates`, then system closeness,
/// then the backend's relevance score. Ties keep input order.
pub fn select_best<'a>(
    hits: &'a [SearchHit],
    version: Option<&str>,
    candidates: &[String],
    system: &str,
) -> Option<&'a SearchHit> {
    hits.iter()
        .filter(|h| h.commit_hash.as_deref().is_some_and(|c| !c.is_empty()))
        .min_by(|a, b| {
            version_rank(a, version)
                .cmp(&version_rank(b, version))
                .then_with(|| candidate_rank(a, candidates).cmp(&candidate_rank(b, candidates)))
                .then_with(|| system_rank(a, system).cmp(&system_rank(b, system)))
                .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(attr: &str, version: &str, score: f64) -> SearchHit {
        SearchHit {
            attribute_path: attr.to_string(),
            version: Some(version.to_string()),
            platforms: vec!["x86_64-linux".to_string()],
            system: None,
            commit_hash: Some("c".repeat(40)),
            score,
        }
    }

    fn candidates(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn candidate_order_beats_raw_score() {
        let hits = vec![hit("B", "1.0", 9.0), hit("A", "1.0", 5.0)];
        let best = select_best(&hits, Some("1.0"), &candidates(&["A", "B"]), "x86_64-linux");
        assert_eq!(best.unwrap().attribute_path, "A");
    }

    #[test]
    fn exact_version_beats_candidate_order() {
        let hits = vec![hit("A", "0.9", 9.0), hit("B", "1.0", 1.0)];
        let best = select_best(&hits, Some("1.0"), &candidates(&["A", "B"]), "x86_64-linux");
        assert_eq!(best.unwrap().attribute_path, "B");
    }

    #[test]
    fn system_closeness_breaks_ties() {
        let mut darwin = hit("A", "1.0", 9.0);
        darwin.platforms = vec!["aarch64-darwin".to_string()];
        let mut arm_linux = hit("A", "1.0", 1.0);
        arm_linux.platforms = vec!["aarch64-linux".to_string()];
        let exact = hit("A", "1.0", 0.5);

        let hits = vec![darwin.clone(), arm_linux.clone(), exact];
        let best = select_best(&hits, Some("1.0"), &candidates(&["A"]), "x86_64-linux").unwrap();
        assert_eq!(best.score, 0.5);

        let hits = vec![darwin, arm_linux];
        let best = select_best(&hits, Some("1.0"), &candidates(&["A"]), "x86_64-linux").unwrap();
        assert_eq!(best.score, 1.0);
    }

    #[test]
    fn score_is_final_tiebreak() {
        let hits = vec![hit("A", "1.0", 2.0), hit("A", "1.0", 7.0)];
        let best = select_best(&hits, Some("1.0"), &candidates(&["A"]), "x86_64-linux");
        assert_eq!(best.unwrap().score, 7.0);
    }

    #[test]
    fn unknown_attributes_rank_after_candidates() {
        let hits = vec![hit("htop-vim", "1.0", 9.0), hit("htop", "1.0", 1.0)];
        let best = select_best(&hits, Some("1.0"), &candidates(&["htop"]), "x86_64-linux");
        assert_eq!(best.unwrap().attribute_path, "htop");
    }

    #[test]
    fn hits_without_commit_are_discarded() {
        let mut no_hash = hit("A", "1.0", 9.0);
        no_hash.commit_hash = None;
        let lone = [no_hash.clone()];
        assert!(select_best(&lone, Some("1.0"), &candidates(&["A"]), "x86_64-linux").is_none());

        let hits = vec![no_hash, hit("B", "1.0", 1.0)];
        let best = select_best(&hits, Some("1.0"), &candidates(&["A", "B"]), "x86_64-linux");
        assert_eq!(best.unwrap().attribute_path, "B");
    }

    #[test]
    fn empty_hits() {
        assert!(select_best(&[], Some("1.0"), &[], "x86_64-linux").is_none());
    }
}
