use std::fmt;

/// Identifier correlating a detected face with the same subject across frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackKey {
    /// Session tracker id; stable while the tracker follows the subject.
    Tracked(u32),
    /// Track id supplied by the detector adapter itself.
    External(u32),
    /// Position of the face in the current frame's detector output.
    ///
    /// Used only with tracking disabled: the same subject gets a different key whenever
    /// detection order changes, so cached identities do not survive
    /// reordering.
    Positional(usize),
}

impl TrackKey {
    pub fn is_stable(&self) -> bool {
        !matches!(self, TrackKey::Positional(_))
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKey::Tracked(id) => write!(f, "track:{id}"),
            TrackKey::External(id) => write!(f, "ext:{id}"),
            TrackKey::Positional(idx) => write!(f, "pos:{idx}"),
        }
    }
}
