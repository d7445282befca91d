// Deterministic section merge: one section per name out of every source's candidates.

use std::collections::BTreeMap;

use tracing::error;

use crate::error::MergeError;
use crate::models::{MergedHostData, Section, SourcePriority};

/// Sort key: fresh before cached, then lower priority number, then source id, then rows.
/// The trailing components make the order total, so the result never depends on input order.
fn rank(candidate: &(SourcePriority, Section)) -> (bool, u32, &'static str, &Vec<Vec<String>>) {
    let (prio, section) = candidate;
    (
        section.cached,
        prio.priority,
        prio.source.id(),
        &section.rows,
    )
}

fn sorted(mut candidates: Vec<(SourcePriority, Section)>) -> Vec<(SourcePriority, Section)> {
    candidates.sort_by(|a, b| rank(a).cmp(&rank(b)));
    candidates
}

/// Pick the winning section among candidates of one name.
///
/// Fails with [`MergeError::Ambiguous`] when the two best candidates come from different
/// sources with the same priority and the same freshness.
pub fn merge(candidates: Vec<(SourcePriority, Section)>) -> Result<Section, MergeError> {
    let ranked = sorted(candidates);
    check_ambiguity(&ranked)?;
    ranked
        .into_iter()
        .next()
        .map(|(_, s)| s)
        .ok_or(MergeError::Empty)
}

fn check_ambiguity(ranked: &[(SourcePriority, Section)]) -> Result<(), MergeError> {
    if let [(p1, s1), (p2, s2), ..] = ranked
        && s1.cached == s2.cached
        && p1.priority == p2.priority
        && p1.source != p2.source
    {
        return Err(MergeError::Ambiguous {
            section: s1.name.clone(),
            first: p1.source,
            second: p2.source,
            priority: p1.priority,
        });
    }
    Ok(())
}

/// Group candidates by section name and merge each group. Ambiguities are logged and
/// resolved by the ranking order (smaller source id wins), keeping the outcome deterministic.
pub fn merge_sections(candidates: Vec<(SourcePriority, Section)>) -> MergedHostData {
    let mut groups: BTreeMap<String, Vec<(SourcePriority, Section)>> = BTreeMap::new();
    for c in candidates {
        groups.entry(c.1.name.clone()).or_default().push(c);
    }
    let mut data = MergedHostData::new();
    for (name, group) in groups {
        let ranked = sorted(group);
        if let Err(e) = check_ambiguity(&ranked) {
            error!(section = %name, error = %e, operation = "merge_sections", "Ambiguous section merge");
        }
        if let Some((_, section)) = ranked.into_iter().next() {
            data.insert(section);
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    fn cand(kind: SourceKind, prio: u32, name: &str, row: &str, cached: bool) -> (SourcePriority, Section) {
        let mut s = Section::new(name, kind).with_rows(vec![vec![row.to_string()]]);
        s.cached = cached;
        (SourcePriority::new(prio, kind), s)
    }

    #[test]
    fn empty_is_an_error() {
        assert_eq!(merge(Vec::new()), Err(MergeError::Empty));
    }

    #[test]
    fn same_source_fresh_beats_cached() {
        let got = merge(vec![
            cand(SourceKind::Agent, 10, "df", "old", true),
            cand(SourceKind::Agent, 10, "df", "new", false),
        ])
        .unwrap();
        assert_eq!(got.rows[0][0], "new");
    }

    #[test]
    fn ambiguous_only_between_best_candidates() {
        // The tie is among losers: no ambiguity.
        let got = merge(vec![
            cand(SourceKind::Agent, 5, "x", "a", false),
            cand(SourceKind::Snmp, 10, "x", "b", false),
            cand(SourceKind::Program, 10, "x", "c", false),
        ]);
        assert_eq!(got.unwrap().rows[0][0], "a");
    }

    #[test]
    fn merge_sections_falls_back_on_ambiguity() {
        let data = merge_sections(vec![
            cand(SourceKind::Snmp, 10, "x", "s", false),
            cand(SourceKind::Agent, 10, "x", "a", false),
        ]);
        assert_eq!(data.get("x").unwrap().source, SourceKind::Agent);
    }
}
