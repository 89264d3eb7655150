//! Reference resolution against a rebuild's reference index.
//!
//! Decoding is liberal (malformed candidates are skipped); matching is
//! strict on origin feature and selector kind, then scored on selector data
//! and fingerprints. A `loop:unknown` sentinel in the reference forces an
//! ambiguous result no matter how well the best candidate scores.

use serde::{Deserialize, Serialize};

use crate::index::ReferenceIndex;
use crate::stref::{PersistentRef, RefSet, RefType};

/// Resolver input: a single stref string or a reference set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RefInput {
    /// One stref string.
    Single(String),
    /// A bounded candidate set.
    Set(RefSet),
}

/// A scored candidate returned by an ambiguous resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// The body-map key of the candidate's body.
    pub body_key: String,
    /// Position in that body's face/edge list.
    pub index: usize,
    /// Match score, lower is better.
    pub score: f64,
}

/// Resolution outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Resolution {
    /// Exactly one subshape matched.
    #[serde(rename_all = "camelCase")]
    Found {
        /// The body-map key.
        body_key: String,
        /// Position in that body's face/edge list.
        index: usize,
    },
    /// Multiple plausible subshapes matched.
    Ambiguous {
        /// Up to five best candidates, best first.
        candidates: Vec<Candidate>,
    },
    /// No subshape matched any candidate reference.
    NotFound {
        /// Why resolution failed.
        reason: String,
    },
}

const MAX_AMBIGUOUS: usize = 5;

/// Resolve one reference (or reference set) against a reference index.
pub fn resolve(input: &RefInput, index: &ReferenceIndex) -> Resolution {
    let ordered = candidate_strings(input);
    if ordered.is_empty() {
        return Resolution::NotFound {
            reason: "empty reference set".to_string(),
        };
    }

    let mut decode_errors = 0usize;
    for stref in &ordered {
        let wanted = match PersistentRef::decode(stref) {
            Ok(r) => r,
            Err(_) => {
                decode_errors += 1;
                continue;
            }
        };
        let hits = scan(&wanted, index);
        if hits.is_empty() {
            continue;
        }
        return decide(&wanted, hits);
    }

    Resolution::NotFound {
        reason: if decode_errors == ordered.len() {
            "no candidate reference could be decoded".to_string()
        } else {
            "no matching subshape in the reference index".to_string()
        },
    }
}

/// Resolve several references at once.
pub fn resolve_many(inputs: &[RefInput], index: &ReferenceIndex) -> Vec<Resolution> {
    inputs.iter().map(|i| resolve(i, index)).collect()
}

fn candidate_strings(input: &RefInput) -> Vec<String> {
    match input {
        RefInput::Single(s) => vec![s.clone()],
        RefInput::Set(set) => {
            let mut out = Vec::with_capacity(set.candidates.len());
            if let Some(preferred) = &set.preferred {
                out.push(preferred.clone());
            }
            for c in &set.candidates {
                if Some(c) != set.preferred.as_ref() {
                    out.push(c.clone());
                }
            }
            out
        }
    }
}

fn scan(wanted: &PersistentRef, index: &ReferenceIndex) -> Vec<Candidate> {
    let mut hits = Vec::new();
    for (body_key, body) in index {
        let list = match wanted.expected_type {
            RefType::Face => &body.faces,
            RefType::Edge => &body.edges,
            // Vertices are not indexed yet; no list to scan.
            RefType::Vertex => continue,
        };
        for (i, entry) in list.iter().enumerate() {
            let candidate = match PersistentRef::decode(entry) {
                Ok(r) => r,
                Err(_) => continue,
            };
            if candidate.origin_feature_id != wanted.origin_feature_id {
                continue;
            }
            if candidate.local_selector.kind != wanted.local_selector.kind {
                continue;
            }
            hits.push(Candidate {
                body_key: body_key.clone(),
                index: i,
                score: score(wanted, &candidate),
            });
        }
    }
    hits.sort_by(|a, b| {
        a.score
            .partial_cmp(&b.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits
}

/// Lower is better. Selector-data keys present on both sides but disagreeing
/// cost 10 each; fingerprints add centroid distance, relative size, and
/// normal deviation terms.
fn score(wanted: &PersistentRef, candidate: &PersistentRef) -> f64 {
    let mut score = 0.0;

    for (key, value) in &wanted.local_selector.data {
        if let Some(other) = candidate.local_selector.data.get(key) {
            if other != value {
                score += 10.0;
            }
        }
    }

    if let (Some(a), Some(b)) = (&wanted.fingerprint, &candidate.fingerprint) {
        let dx = a.centroid[0] - b.centroid[0];
        let dy = a.centroid[1] - b.centroid[1];
        let dz = a.centroid[2] - b.centroid[2];
        score += (dx * dx + dy * dy + dz * dz).sqrt();

        let max_size = a.size.max(b.size).max(1e-12);
        score += 5.0 * (a.size - b.size).abs() / max_size;

        if let (Some(na), Some(nb)) = (a.normal, b.normal) {
            let dot = na[0] * nb[0] + na[1] * nb[1] + na[2] * nb[2];
            score += 10.0 * (1.0 - dot);
        }
    }

    score
}

fn decide(wanted: &PersistentRef, hits: Vec<Candidate>) -> Resolution {
    let forced_ambiguous = wanted.local_selector.has_unknown_loop();

    if !forced_ambiguous {
        if hits.len() == 1 {
            let hit = hits.into_iter().next().unwrap();
            return Resolution::Found {
                body_key: hit.body_key,
                index: hit.index,
            };
        }
        // Clear winner: best score under half the runner-up's
        if hits[0].score < 0.5 * hits[1].score {
            let hit = hits.into_iter().next().unwrap();
            return Resolution::Found {
                body_key: hit.body_key,
                index: hit.index,
            };
        }
    }

    Resolution::Ambiguous {
        candidates: hits.into_iter().take(MAX_AMBIGUOUS).collect(),
    }
}
