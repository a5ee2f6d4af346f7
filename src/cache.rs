use crate::model::{AthleteId, EvaluationId};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};

/// Keys of the cached reads the presentation layer works from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryKey {
    Evaluations,
    Evaluation(EvaluationId),
    TestsByEvaluation(EvaluationId),
    AthleteStats(AthleteId),
}

impl QueryKey {
    /// Array form used on the wire, e.g. `["tests-by-evaluation", 7]`.
    pub fn to_json(self) -> serde_json::Value {
        match self {
            QueryKey::Evaluations => json!(["evaluations"]),
            QueryKey::Evaluation(id) => json!(["evaluation", id]),
            QueryKey::TestsByEvaluation(id) => json!(["tests-by-evaluation", id]),
            QueryKey::AthleteStats(id) => json!(["athlete-stats", id]),
        }
    }
}

impl Serialize for QueryKey {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    TestCreated {
        evaluation_id: EvaluationId,
        athlete_id: Option<AthleteId>,
    },
    TestUpdated {
        evaluation_id: EvaluationId,
        athlete_id: Option<AthleteId>,
    },
    EvaluationCreated,
    EvaluationUpdated {
        evaluation_id: EvaluationId,
    },
    AttendanceSubmitted {
        date: NaiveDate,
    },
}

pub fn on_mutation(mutation: &Mutation) -> BTreeSet<QueryKey> {
    let mut out = BTreeSet::new();
    match mutation {
        Mutation::TestCreated {
            evaluation_id,
            athlete_id,
        }
        | Mutation::TestUpdated {
            evaluation_id,
            athlete_id,
        } => {
            out.insert(QueryKey::TestsByEvaluation(*evaluation_id));
            out.insert(QueryKey::Evaluation(*evaluation_id));
            if let Some(a) = athlete_id {
                out.insert(QueryKey::AthleteStats(*a));
            }
        }
        Mutation::EvaluationCreated => {
            out.insert(QueryKey::Evaluations);
        }
        Mutation::EvaluationUpdated { evaluation_id } => {
            out.insert(QueryKey::Evaluations);
            out.insert(QueryKey::Evaluation(*evaluation_id));
        }
        // Attendance is re-fetched explicitly by the caller, nothing cached.
        Mutation::AttendanceSubmitted { .. } => {}
    }
    out
}

#[derive(Debug, Default)]
pub struct QueryCache {
    entries: HashMap<QueryKey, serde_json::Value>,
}

impl QueryCache {
    /// Drops every stale entry and returns how many were actually cached.
    pub fn invalidate(&mut self, keys: &BTreeSet<QueryKey>) -> usize {
        keys.iter()
            .filter(|k| self.entries.remove(k).is_some())
            .count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Cached read: returns the stored value, or runs `fetch` and stores it.
    pub fn get_or_fetch<E>(
        &mut self,
        key: QueryKey,
        fetch: impl FnOnce() -> Result<serde_json::Value, E>,
    ) -> Result<serde_json::Value, E> {
        if let Some(v) = self.entries.get(&key) {
            return Ok(v.clone());
        }
        let v = fetch()?;
        self.entries.insert(key, v.clone());
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutations_hit_evaluation_tests_and_athlete_stats() {
        let keys = on_mutation(&Mutation::TestCreated {
            evaluation_id: 4,
            athlete_id: Some(9),
        });
        let expected: BTreeSet<QueryKey> = [
            QueryKey::Evaluation(4),
            QueryKey::TestsByEvaluation(4),
            QueryKey::AthleteStats(9),
        ]
        .into_iter()
        .collect();
        assert_eq!(keys, expected);

        let no_athlete = on_mutation(&Mutation::TestUpdated {
            evaluation_id: 4,
            athlete_id: None,
        });
        assert_eq!(no_athlete.len(), 2);
    }

    #[test]
    fn attendance_submit_invalidates_nothing() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).expect("date");
        assert!(on_mutation(&Mutation::AttendanceSubmitted { date }).is_empty());
    }

    #[test]
    fn invalidated_entries_are_refetched() {
        let mut cache = QueryCache::default();
        let mut calls = 0;
        let mut fetch = |cache: &mut QueryCache| {
            cache.get_or_fetch::<()>(QueryKey::Evaluation(1), || {
                calls += 1;
                Ok(json!({ "n": calls }))
            })
        };
        assert_eq!(fetch(&mut cache), Ok(json!({ "n": 1 })));
        assert_eq!(fetch(&mut cache), Ok(json!({ "n": 1 })));

        let keys = on_mutation(&Mutation::EvaluationUpdated { evaluation_id: 1 });
        assert_eq!(cache.invalidate(&keys), 1);
        assert_eq!(fetch(&mut cache), Ok(json!({ "n": 2 })));
    }

    #[test]
    fn keys_serialize_as_arrays() {
        assert_eq!(
            serde_json::to_value(QueryKey::TestsByEvaluation(3)).expect("encode"),
            json!(["tests-by-evaluation", 3])
        );
    }
}
