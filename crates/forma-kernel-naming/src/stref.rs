//! Persistent reference records and the `stref:v1` wire format.
//!
//! External representation: `stref:v1:<base64url(canonical-json(record))>`.
//! The decoder is liberal only in field order; it strictly enforces the
//! version tag and the required field set (`expectedType`, `originFeatureId`,
//! `localSelector.kind`).

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::canonical::to_canonical_json;

/// Wire prefix of a version-1 persistent reference.
pub const STREF_V1_PREFIX: &str = "stref:v1:";

/// Sentinel loop identifier for loops that could not be determined.
/// A reference carrying it always resolves as ambiguous.
pub const LOOP_UNKNOWN: &str = "loop:unknown";

/// Selector kind strings.
pub mod kinds {
    /// Top cap of an extrude.
    pub const EXTRUDE_TOP_CAP: &str = "extrude.topCap";
    /// Bottom cap of an extrude.
    pub const EXTRUDE_BOTTOM_CAP: &str = "extrude.bottomCap";
    /// Side face of an extrude.
    pub const EXTRUDE_SIDE: &str = "extrude.side";
    /// Edge of an extruded body.
    pub const EXTRUDE_EDGE: &str = "extrude.edge";
    /// Start cap of a revolve.
    pub const REVOLVE_START_CAP: &str = "revolve.startCap";
    /// End cap of a revolve.
    pub const REVOLVE_END_CAP: &str = "revolve.endCap";
    /// Side face of a revolve.
    pub const REVOLVE_SIDE: &str = "revolve.side";
    /// Edge of a revolved body.
    pub const REVOLVE_EDGE: &str = "revolve.edge";
    /// Face whose provenance is unknown.
    pub const FACE_UNKNOWN: &str = "face.unknown";
    /// Edge whose provenance is unknown.
    pub const EDGE_UNKNOWN: &str = "edge.unknown";
}

/// Errors from encoding or decoding persistent references.
#[derive(Debug, Clone, Error)]
pub enum StrefError {
    /// The string does not start with a `stref:` prefix.
    #[error("not a persistent reference: missing stref prefix")]
    NotAStref,
    /// The version segment is not recognized.
    #[error("unsupported stref version: {0}")]
    UnsupportedVersion(String),
    /// The payload is not valid base64url.
    #[error("invalid base64url payload: {0}")]
    InvalidBase64(String),
    /// The payload is not a valid record.
    #[error("invalid stref record: {0}")]
    InvalidRecord(String),
    /// A float in the record is NaN or infinite.
    #[error("non-finite number in reference record")]
    NonFiniteNumber,
    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(String),
}

/// The expected subshape type of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefType {
    /// A face.
    Face,
    /// An edge.
    Edge,
    /// A vertex.
    Vertex,
}

/// A selector data value: a stable string identifier or a small index.
///
/// Untagged: numbers decode as indices, everything else as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorValue {
    /// Numeric index (profile edge index, face index, edge index).
    Index(u32),
    /// Stable string identifier (loop id, segment/entity id).
    Text(String),
}

/// The local selector: which subshape of the origin feature this names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSelector {
    /// Small kind tag, e.g. `extrude.topCap`.
    pub kind: String,
    /// Stable-identifier data; raw array indices only when no stable
    /// identifier exists.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, SelectorValue>,
}

impl LocalSelector {
    /// A selector with a kind and no data.
    pub fn bare(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            data: BTreeMap::new(),
        }
    }

    /// True if any data value carries the `loop:unknown` sentinel.
    pub fn has_unknown_loop(&self) -> bool {
        self.data
            .values()
            .any(|v| matches!(v, SelectorValue::Text(t) if t == LOOP_UNKNOWN))
    }
}

/// Coarse geometric summary used for fallback matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Centroid (area-weighted for faces, length-weighted for edges).
    pub centroid: [f64; 3],
    /// Area for faces, length for edges.
    pub size: f64,
    /// Average outward normal, faces only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal: Option<[f64; 3]>,
}

impl Fingerprint {
    fn is_finite(&self) -> bool {
        self.centroid.iter().all(|c| c.is_finite())
            && self.size.is_finite()
            && self
                .normal
                .map_or(true, |n| n.iter().all(|c| c.is_finite()))
    }
}

/// A persistent reference record (version 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentRef {
    /// The expected subshape type.
    pub expected_type: RefType,
    /// Feature whose history contains this subshape. May differ from the
    /// owning body's feature after merges.
    pub origin_feature_id: String,
    /// Which subshape of the origin this names.
    pub local_selector: LocalSelector,
    /// Geometric fallback data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
}

impl PersistentRef {
    /// Encode this record as a `stref:v1:` string.
    pub fn encode(&self) -> Result<String, StrefError> {
        if let Some(fp) = &self.fingerprint {
            if !fp.is_finite() {
                return Err(StrefError::NonFiniteNumber);
            }
        }
        let json = to_canonical_json(self)?;
        Ok(format!(
            "{}{}",
            STREF_V1_PREFIX,
            URL_SAFE_NO_PAD.encode(json.as_bytes())
        ))
    }

    /// Decode a `stref:v1:` string.
    pub fn decode(s: &str) -> Result<Self, StrefError> {
        let rest = s.strip_prefix("stref:").ok_or(StrefError::NotAStref)?;
        let (version, payload) = rest
            .split_once(':')
            .ok_or_else(|| StrefError::UnsupportedVersion(rest.to_string()))?;
        if version != "v1" {
            return Err(StrefError::UnsupportedVersion(version.to_string()));
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| StrefError::InvalidBase64(e.to_string()))?;
        let record: PersistentRef = serde_json::from_slice(&bytes)
            .map_err(|e| StrefError::InvalidRecord(e.to_string()))?;
        if record.local_selector.kind.is_empty() {
            return Err(StrefError::InvalidRecord(
                "localSelector.kind is empty".to_string(),
            ));
        }
        Ok(record)
    }
}

/// A bounded set of candidate references with an optional preferred one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefSet {
    /// Candidate stref strings, 3–5 entries by convention.
    pub candidates: Vec<String>,
    /// The candidate to try first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_ref() -> PersistentRef {
        let mut data = BTreeMap::new();
        data.insert("segmentId".to_string(), SelectorValue::Text("l1".into()));
        data.insert("profileEdgeIndex".to_string(), SelectorValue::Index(0));
        PersistentRef {
            expected_type: RefType::Face,
            origin_feature_id: "e1".into(),
            local_selector: LocalSelector {
                kind: kinds::EXTRUDE_SIDE.into(),
                data,
            },
            fingerprint: Some(Fingerprint {
                centroid: [0.0, -5.0, 5.0],
                size: 100.0,
                normal: Some([0.0, -1.0, 0.0]),
            }),
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let r = sample_ref();
        let s = r.encode().unwrap();
        assert!(s.starts_with("stref:v1:"));
        let back = PersistentRef::decode(&s).unwrap();
        assert_eq!(r, back);
    }

    #[test]
    fn test_encode_deterministic() {
        let r = sample_ref();
        assert_eq!(r.encode().unwrap(), r.encode().unwrap());
        // Re-encoding a decoded record is byte-identical
        let s = r.encode().unwrap();
        let back = PersistentRef::decode(&s).unwrap();
        assert_eq!(s, back.encode().unwrap());
    }

    #[test]
    fn test_decode_rejects_wrong_version() {
        let r = sample_ref();
        let s = r.encode().unwrap().replace("stref:v1:", "stref:v9:");
        assert!(matches!(
            PersistentRef::decode(&s),
            Err(StrefError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            PersistentRef::decode("not-a-ref"),
            Err(StrefError::NotAStref)
        ));
        assert!(matches!(
            PersistentRef::decode("stref:v1:!!!"),
            Err(StrefError::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_decode_rejects_missing_required_fields() {
        // Payload lacking originFeatureId
        let json = r#"{"expectedType":"face","localSelector":{"kind":"extrude.topCap"}}"#;
        let payload = URL_SAFE_NO_PAD.encode(json.as_bytes());
        let s = format!("stref:v1:{payload}");
        assert!(matches!(
            PersistentRef::decode(&s),
            Err(StrefError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_encode_rejects_non_finite() {
        let mut r = sample_ref();
        r.fingerprint.as_mut().unwrap().size = f64::NAN;
        assert!(matches!(r.encode(), Err(StrefError::NonFiniteNumber)));
    }

    #[test]
    fn test_unknown_loop_sentinel() {
        let mut r = sample_ref();
        r.local_selector.data.insert(
            "loopId".to_string(),
            SelectorValue::Text(LOOP_UNKNOWN.into()),
        );
        assert!(r.local_selector.has_unknown_loop());
    }

    #[test]
    fn test_selector_value_untagged() {
        let v: SelectorValue = serde_json::from_str("3").unwrap();
        assert_eq!(v, SelectorValue::Index(3));
        let v: SelectorValue = serde_json::from_str("\"loop:abc\"").unwrap();
        assert_eq!(v, SelectorValue::Text("loop:abc".into()));
    }
}
