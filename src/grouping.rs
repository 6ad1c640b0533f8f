use crate::error::{GroupingError, GroupingResult};
use crate::record::TextRecord;
use crate::vector::cosine_similarity;
use log::{debug, error, info};
use serde::Serialize;
use std::collections::HashSet;

/// Threshold used by the public grouping surface when the caller gives none.
pub const DEFAULT_GROUPING_THRESHOLD: f64 = 0.3;

/// Threshold of the internal default overload. Kept separate from
/// [`DEFAULT_GROUPING_THRESHOLD`]; callers pick which one applies.
pub const STRICT_GROUPING_THRESHOLD: f64 = 0.75;

#[derive(Debug, Clone, Serialize)]
pub struct GroupMember<'a> {
    pub record: &'a TextRecord,
    pub score: f64,
}

/// A leader plus the records absorbed into it, best match first.
/// No members means the leader stands alone.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityGroup<'a> {
    pub leader: &'a TextRecord,
    pub members: Vec<GroupMember<'a>>,
}

impl<'a> SimilarityGroup<'a> {
    pub fn is_standalone(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len() + 1
    }

    pub fn record_ids(&self) -> Vec<i64> {
        std::iter::once(self.leader.id)
            .chain(self.members.iter().map(|m| m.record.id))
            .collect()
    }
}

/// Rejects thresholds outside `[0, 1]` (and NaN).
pub fn validate_threshold(threshold: f64) -> GroupingResult<f64> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(GroupingError::ThresholdOutOfRange(threshold))
    }
}

/// Greedy leader-based clustering over `records` in the order given.
///
/// Records without a usable embedding are left out entirely. Every other
/// record lands in exactly one group. A pair whose similarity cannot be
/// computed is logged and treated as dissimilar.
pub fn group_by_similarity(records: &[TextRecord], threshold: f64) -> Vec<SimilarityGroup<'_>> {
    let candidates: Vec<(&TextRecord, &[f64])> = records
        .iter()
        .filter_map(|record| record.usable_embedding().map(|v| (record, v)))
        .collect();

    info!(
        "Grouping {} records with embeddings out of {} total (threshold {:.2})",
        candidates.len(),
        records.len(),
        threshold
    );

    let mut groups = Vec::new();
    let mut assigned: HashSet<i64> = HashSet::with_capacity(candidates.len());

    for (leader_idx, (leader, leader_vec)) in candidates.iter().enumerate() {
        if assigned.contains(&leader.id) {
            continue;
        }

        let mut members = Vec::new();
        for (other_idx, (other, other_vec)) in candidates.iter().enumerate() {
            if other_idx == leader_idx || assigned.contains(&other.id) {
                continue;
            }

            match cosine_similarity(leader_vec, other_vec) {
                Ok(score) => {
                    debug!(
                        "Similarity between Q{} and Q{}: {:.4}",
                        leader.id, other.id, score
                    );
                    if score >= threshold {
                        members.push(GroupMember {
                            record: *other,
                            score,
                        });
                        assigned.insert(other.id);
                    }
                }
                Err(e) => {
                    error!(
                        "Error calculating similarity between Q{} and Q{}: {}",
                        leader.id, other.id, e
                    );
                }
            }
        }

        // stable: equal scores keep scan order
        members.sort_by(|a, b| b.score.total_cmp(&a.score));

        if members.is_empty() {
            debug!("Q{} has no similar questions (standalone)", leader.id);
        } else {
            info!(
                "Created group with main Q{} and {} similar questions",
                leader.id,
                members.len()
            );
        }

        assigned.insert(leader.id);
        groups.push(SimilarityGroup {
            leader: *leader,
            members,
        });
    }

    info!(
        "Grouping complete: {} groups created from {} questions",
        groups.len(),
        candidates.len()
    );

    groups
}

/// Validates `threshold` before clustering.
pub fn group_checked(
    records: &[TextRecord],
    threshold: f64,
) -> GroupingResult<Vec<SimilarityGroup<'_>>> {
    let threshold = validate_threshold(threshold)?;
    Ok(group_by_similarity(records, threshold))
}

/// Clusters with [`STRICT_GROUPING_THRESHOLD`].
pub fn group_strict(records: &[TextRecord]) -> Vec<SimilarityGroup<'_>> {
    group_by_similarity(records, STRICT_GROUPING_THRESHOLD)
}
