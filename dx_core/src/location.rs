//! Location Bucket Index.
//!
//! Coarse anatomical partition of the catalog. A location string falls in a
//! bucket when it contains one of the bucket's keywords or is itself
//! contained in one ("temples" hits `head`, "ey" hits `eyes`). Anything that
//! matches nothing lands in [`LocationBucket::General`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::condition::{normalize_token, ConditionId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationBucket {
    Head,
    Chest,
    Abdomen,
    Back,
    Limbs,
    Skin,
    General,
    Ent,
    Eyes,
}

impl LocationBucket {
    pub const ALL: [LocationBucket; 9] = [
        LocationBucket::Head,
        LocationBucket::Chest,
        LocationBucket::Abdomen,
        LocationBucket::Back,
        LocationBucket::Limbs,
        LocationBucket::Skin,
        LocationBucket::General,
        LocationBucket::Ent,
        LocationBucket::Eyes,
    ];

    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            LocationBucket::Head => &["head", "temple", "forehead", "skull", "brain"],
            LocationBucket::Chest => &["chest", "heart", "lung", "breast", "rib"],
            LocationBucket::Abdomen => &[
                "stomach", "abdomen", "belly", "gut", "intestine", "liver", "kidney", "pelvis",
                "bladder",
            ],
            LocationBucket::Back => &["back", "spine", "lumbar", "neck", "cervical"],
            LocationBucket::Limbs => &[
                "arm", "leg", "hand", "foot", "knee", "elbow", "wrist", "ankle", "shoulder", "hip",
                "finger", "toe",
            ],
            LocationBucket::Skin => &["skin", "face", "scalp", "nail"],
            LocationBucket::General => &["body", "general", "whole", "full"],
            LocationBucket::Ent => &["ear", "nose", "throat", "sinus", "mouth", "jaw", "gum", "tooth"],
            LocationBucket::Eyes => &["eye", "vision", "eyelid"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LocationBucket::Head => "head",
            LocationBucket::Chest => "chest",
            LocationBucket::Abdomen => "abdomen",
            LocationBucket::Back => "back",
            LocationBucket::Limbs => "limbs",
            LocationBucket::Skin => "skin",
            LocationBucket::General => "general",
            LocationBucket::Ent => "ent",
            LocationBucket::Eyes => "eyes",
        }
    }

    fn matches(self, location: &str) -> bool {
        self.keywords()
            .iter()
            .any(|kw| location.contains(kw) || kw.contains(location))
    }
}

impl std::fmt::Display for LocationBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buckets for a list of location strings. Never empty.
pub fn buckets_for<S: AsRef<str>>(locations: &[S]) -> BTreeSet<LocationBucket> {
    let mut buckets = BTreeSet::new();
    for raw in locations {
        let location = normalize_token(raw.as_ref());
        if location.is_empty() {
            continue;
        }
        buckets.extend(LocationBucket::ALL.into_iter().filter(|b| b.matches(&location)));
    }
    if buckets.is_empty() {
        buckets.insert(LocationBucket::General);
    }
    buckets
}

/// Condition → bucket assignment for a whole catalog.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocationBucketIndex {
    by_condition: BTreeMap<ConditionId, BTreeSet<LocationBucket>>,
    by_bucket: BTreeMap<LocationBucket, BTreeSet<ConditionId>>,
}

impl LocationBucketIndex {
    pub fn build(catalog: &Catalog) -> Self {
        let mut index = Self::default();
        for condition in catalog.iter() {
            let buckets = buckets_for(&condition.match_criteria.locations);
            for bucket in &buckets {
                index
                    .by_bucket
                    .entry(*bucket)
                    .or_default()
                    .insert(condition.id.clone());
            }
            index.by_condition.insert(condition.id.clone(), buckets);
        }
        index
    }

    pub fn buckets_of(&self, id: &str) -> Option<&BTreeSet<LocationBucket>> {
        self.by_condition.get(id)
    }

    pub fn conditions_in(&self, bucket: LocationBucket) -> impl Iterator<Item = &ConditionId> {
        self.by_bucket.get(&bucket).into_iter().flatten()
    }

    /// Every condition sharing at least one bucket with `buckets`.
    pub fn conditions_in_any(&self, buckets: &BTreeSet<LocationBucket>) -> BTreeSet<ConditionId> {
        buckets
            .iter()
            .flat_map(|b| self.conditions_in(*b))
            .cloned()
            .collect()
    }

    /// Number of non-empty buckets.
    pub fn bucket_count(&self) -> usize {
        self.by_bucket.len()
    }

    pub fn len(&self) -> usize {
        self.by_condition.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_condition.is_empty()
    }
}

/// Whether a condition's declared locations overlap the user's by plain substring.
pub fn direct_location_overlap<S: AsRef<str>>(declared: &[String], reported: &[S]) -> bool {
    reported.iter().any(|r| {
        let r = normalize_token(r.as_ref());
        !r.is_empty() && declared.iter().any(|d| d.contains(&r) || r.contains(d.as_str()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_containment_both_ways() {
        assert!(buckets_for(&["Temples"]).contains(&LocationBucket::Head));
        assert!(buckets_for(&["lower back"]).contains(&LocationBucket::Back));
        // "ey" is contained in "eye"
        assert!(buckets_for(&["ey"]).contains(&LocationBucket::Eyes));
    }

    #[test]
    fn test_unrecognized_maps_to_general_only() {
        let expected = BTreeSet::from([LocationBucket::General]);
        assert_eq!(buckets_for(&["zzz"]), expected);
        assert_eq!(buckets_for::<&str>(&[]), expected);
        assert_eq!(buckets_for(&["   "]), expected);
    }

    #[test]
    fn test_multiple_buckets() {
        let buckets = buckets_for(&["neck", "throat"]);
        assert!(buckets.contains(&LocationBucket::Back));
        assert!(buckets.contains(&LocationBucket::Ent));
    }

    #[test]
    fn test_direct_overlap() {
        let declared = vec!["lower abdomen".to_string()];
        assert!(direct_location_overlap(&declared, &["abdomen"]));
        assert!(!direct_location_overlap(&declared, &["knee"]));
        assert!(!direct_location_overlap(&declared, &[""]));
    }
}
