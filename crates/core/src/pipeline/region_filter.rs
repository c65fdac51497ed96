use std::collections::HashSet;

use crate::shared::region::{Region, RegionSource};

/// Drops generic object regions whose label duplicates what a dedicated
/// face detector already reports.
///
/// The policy only applies on frames where a face adapter produced a result;
/// when no face adapter ran successfully the object regions are kept, so a
/// failed face model never hides people entirely.
#[derive(Clone, Debug, Default)]
pub struct LabelSuppression {
    labels: HashSet<String>,
}

impl LabelSuppression {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_suppressed(&self, region: &Region) -> bool {
        region.source() == RegionSource::Object && self.labels.contains(region.label())
    }

    /// Returns `regions` in their original order minus suppressed ones.
    pub fn apply(&self, regions: Vec<Region>, face_adapter_active: bool) -> Vec<Region> {
        if !face_adapter_active || self.labels.is_empty() {
            return regions;
        }
        regions
            .into_iter()
            .filter(|r| !self.is_suppressed(r))
            .collect()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}
