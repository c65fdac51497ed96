use crate::shared::region::{Region, RegionSource};

/// A region enriched with its per-batch id and, for faces, an identity.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub id: u32,
    pub region: Region,
    pub name: Option<String>,
}

impl Detection {
    pub fn is_face(&self) -> bool {
        self.region.source() == RegionSource::Face
    }
}

/// All detections produced for one frame of a session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionBatch {
    pub frame_index: u64,
    pub detections: Vec<Detection>,
}

impl DetectionBatch {
    /// Numbers `regions` 0..n in order and attaches the matching names.
    ///
    /// `names` is indexed like `regions`; missing entries mean no identity.
    pub fn assemble(frame_index: u64, regions: Vec<Region>, mut names: Vec<Option<String>>) -> Self {
        names.resize(regions.len(), None);
        let detections = regions
            .into_iter()
            .zip(names)
            .enumerate()
            .map(|(id, (region, name))| Detection {
                id: id as u32,
                region,
                name,
            })
            .collect();
        Self {
            frame_index,
            detections,
        }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn faces(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter().filter(|d| d.is_face())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_assemble_assigns_unique_sequential_ids() {
        let regions = vec![
            Region::new([0.0, 0.0, 1.0, 1.0], "cup", 0.5, RegionSource::Object),
            Region::new([0.0, 0.0, 2.0, 2.0], "face", 0.9, RegionSource::Face),
            Region::new([0.0, 0.0, 3.0, 3.0], "dog", 0.7, RegionSource::Object),
        ];
        let batch = DetectionBatch::assemble(4, regions, vec![None, Some("Alice".into())]);

        let ids: HashSet<u32> = batch.detections.iter().map(|d| d.id).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(batch.detections[1].name.as_deref(), Some("Alice"));
        assert_eq!(batch.detections[2].name, None);
        assert_eq!(batch.faces().count(), 1);
        assert_eq!(batch.frame_index, 4);
    }

    #[test]
    fn test_empty_batch() {
        let batch = DetectionBatch::assemble(1, vec![], vec![]);
        assert!(batch.is_empty());
    }
}
