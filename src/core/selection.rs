use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use super::query::QueryId;

/// A stored credential that satisfies one input descriptor of a query.
///
/// A credential matching several descriptors is surfaced as several candidates, one per
/// descriptor.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateCredential {
    /// Identifier the holder selects the candidate by, unique within its query.
    pub id: String,
    /// The input descriptor satisfied, empty for raw queries.
    pub descriptor_id: String,
    pub credential: Json,
}

impl CandidateCredential {
    pub fn new(id: impl Into<String>, descriptor_id: impl Into<String>, credential: Json) -> Self {
        Self {
            id: id.into(),
            descriptor_id: descriptor_id.into(),
            credential,
        }
    }
}

/// The holder's choice of candidates, per query.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selection(BTreeMap<QueryId, BTreeSet<String>>);

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a candidate of `query`.
    pub fn select(mut self, query: QueryId, candidate_id: impl Into<String>) -> Self {
        self.0.entry(query).or_default().insert(candidate_id.into());
        self
    }

    /// Select every candidate in `candidates` for `query`.
    pub fn select_all<'a>(
        mut self,
        query: QueryId,
        candidates: impl IntoIterator<Item = &'a CandidateCredential>,
    ) -> Self {
        let selected = self.0.entry(query).or_default();
        selected.extend(candidates.into_iter().map(|c| c.id.clone()));
        self
    }

    /// Selected candidate ids for `query`, empty when nothing was selected.
    pub fn selected(&self, query: QueryId) -> impl Iterator<Item = &str> {
        self.0
            .get(&query)
            .into_iter()
            .flat_map(|ids| ids.iter().map(String::as_str))
    }

    pub fn is_selected(&self, query: QueryId, candidate_id: &str) -> bool {
        self.0
            .get(&query)
            .is_some_and(|ids| ids.contains(candidate_id))
    }

    pub fn queries(&self) -> impl Iterator<Item = QueryId> + '_ {
        self.0.keys().copied()
    }
}

/// A selection that cannot be submitted.
///
/// The mediation is left untouched; the holder may submit another selection.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum InvalidSelectionError {
    #[error("{0} is required but no credential was selected")]
    EmptyRequiredQuery(QueryId),

    #[error("credential `{candidate}` is not a candidate of {query}")]
    UnknownCandidate { query: QueryId, candidate: String },

    #[error("{0} is not part of the request")]
    UnknownQuery(QueryId),

    #[error("{0} does not take a credential selection")]
    NotSelectable(QueryId),
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn select_all_and_lookup() {
        let candidates = vec![
            CandidateCredential::new("a", "degree_input_1", json!({})),
            CandidateCredential::new("b", "degree_input_1", json!({})),
        ];

        let selection = Selection::new()
            .select_all(QueryId(0), &candidates)
            .select(QueryId(2), "c");

        assert!(selection.is_selected(QueryId(0), "b"));
        assert!(!selection.is_selected(QueryId(1), "b"));
        assert_eq!(selection.selected(QueryId(2)).collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(selection.selected(QueryId(1)).count(), 0);
        assert_eq!(selection.queries().collect::<Vec<_>>(), vec![QueryId(0), QueryId(2)]);
    }
}
