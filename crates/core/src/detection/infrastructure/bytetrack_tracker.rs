/// Simplified ByteTrack multi-object tracker.
///
/// Two-stage association: high-confidence detections are matched to
/// tracks first, then low-confidence detections fill the tracks left over.
/// Only high-confidence detections may start a new track, and a track
/// survives up to `max_lost` consecutive frames without a match.
use std::collections::HashSet;

use crate::shared::region::{bbox_iou, BBox};

const HIGH_THRESH: f64 = 0.5;
const MATCH_THRESH: f64 = 0.3;

#[derive(Clone, Debug)]
pub struct TrackInput {
    pub bbox: BBox,
    pub score: f64,
}

#[derive(Clone, Debug)]
struct TrackState {
    id: u32,
    bbox: BBox,
    frames_lost: usize,
}

pub struct ByteTracker {
    tracks: Vec<TrackState>,
    next_id: u32,
    max_lost: usize,
}

impl ByteTracker {
    pub fn new(max_lost: usize) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            max_lost,
        }
    }

    /// Associates one frame of detections with tracks.
    ///
    /// Returns one entry per input detection: the track id it was assigned,
    /// or `None` for a low-confidence detection that matched no track.
    pub fn update(&mut self, detections: &[TrackInput]) -> Vec<Option<u32>> {
        let mut assigned: Vec<Option<u32>> = vec![None; detections.len()];
        let mut matched_tracks: HashSet<usize> = HashSet::new();

        let (high, low): (Vec<usize>, Vec<usize>) =
            (0..detections.len()).partition(|&i| detections[i].score >= HIGH_THRESH);

        for stage in [&high, &low] {
            let free: Vec<usize> = (0..self.tracks.len())
                .filter(|t| !matched_tracks.contains(t))
                .collect();
            for (ti, di) in greedy_match(&self.tracks, &free, detections, stage) {
                let track = &mut self.tracks[ti];
                track.bbox = detections[di].bbox;
                track.frames_lost = 0;
                matched_tracks.insert(ti);
                assigned[di] = Some(track.id);
            }
        }

        for (ti, track) in self.tracks.iter_mut().enumerate() {
            if !matched_tracks.contains(&ti) {
                track.frames_lost += 1;
            }
        }

        for &di in &high {
            if assigned[di].is_none() {
                let id = self.next_id;
                self.next_id = self.next_id.wrapping_add(1).max(1);
                self.tracks.push(TrackState {
                    id,
                    bbox: detections[di].bbox,
                    frames_lost: 0,
                });
                assigned[di] = Some(id);
            }
        }

        let max_lost = self.max_lost;
        self.tracks.retain(|t| t.frames_lost <= max_lost);
        assigned
    }

    /// Ids of every track still retained, including temporarily lost ones.
    pub fn known_ids(&self) -> HashSet<u32> {
        self.tracks.iter().map(|t| t.id).collect()
    }
}

/// Greedy IoU matching: pairs sorted by descending IoU, each track and
/// detection used at most once. Returns `(track_index, detection_index)`.
fn greedy_match(
    tracks: &[TrackState],
    free_tracks: &[usize],
    detections: &[TrackInput],
    candidates: &[usize],
) -> Vec<(usize, usize)> {
    let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
    for &ti in free_tracks {
        for &di in candidates {
            let score = bbox_iou(&tracks[ti].bbox, &detections[di].bbox);
            if score >= MATCH_THRESH {
                pairs.push((ti, di, score));
            }
        }
    }
    pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

    let mut used_tracks = HashSet::new();
    let mut used_dets = HashSet::new();
    let mut matches = Vec::new();
    for (ti, di, _) in pairs {
        if !used_tracks.contains(&ti) && !used_dets.contains(&di) {
            used_tracks.insert(ti);
            used_dets.insert(di);
            matches.push((ti, di));
        }
    }
    matches
}
