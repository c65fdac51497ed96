use std::sync::Arc;

use crate::shared::bounded_call::catch_panic;
use crate::shared::constants::UNKNOWN_IDENTITY;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

use super::face_recognizer::{FaceRecognizer, RecognitionError};
use super::identity_cache::IdentityCache;
use super::track_key::TrackKey;

/// Resolves face identities with throttled recognition.
///
/// Full recognition runs only on frames where
/// `frame_counter % interval == 0`. On every other frame the cached label
/// for the track is returned (or `"Unknown"`) without touching the model.
pub struct IdentityResolver {
    recognizer: Arc<dyn FaceRecognizer>,
    interval: u64,
}

impl IdentityResolver {
    /// `interval` of zero is treated as one (recognize every frame).
    pub fn new(recognizer: Arc<dyn FaceRecognizer>, interval: u64) -> Self {
        Self {
            recognizer,
            interval: interval.max(1),
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn recognizer_name(&self) -> &str {
        self.recognizer.name()
    }

    pub fn is_recognition_frame(&self, frame_counter: u64) -> bool {
        frame_counter % self.interval == 0
    }

    /// Returns the identity label for `region` on this frame.
    ///
    /// Only a confident match writes to `cache`; misses and failures
    /// report `"Unknown"` for this frame and leave any earlier
    /// identification in place.
    pub fn resolve(
        &self,
        cache: &mut IdentityCache,
        key: TrackKey,
        frame: &Frame,
        region: &Region,
        frame_counter: u64,
    ) -> String {
        if !self.is_recognition_frame(frame_counter) {
            return cache.get(&key).unwrap_or(UNKNOWN_IDENTITY).to_string();
        }
        match self.recognize_region(frame, region, &key) {
            Some(name) => {
                cache.insert(key, name.clone());
                name
            }
            None => UNKNOWN_IDENTITY.to_string(),
        }
    }

    /// Resolves a face that has no track key this frame.
    ///
    /// Recognition still runs on recognition frames, but nothing is read
    /// from or written to any cache, since the face cannot be followed to
    /// another frame.
    pub fn resolve_unkeyed(&self, frame: &Frame, region: &Region, frame_counter: u64) -> String {
        if !self.is_recognition_frame(frame_counter) {
            return UNKNOWN_IDENTITY.to_string();
        }
        self.recognize_region(frame, region, &"unkeyed face")
            .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
    }

    /// Name of a confident match for the crop of `region`, if any.
    fn recognize_region(
        &self,
        frame: &Frame,
        region: &Region,
        subject: &dyn std::fmt::Display,
    ) -> Option<String> {
        let Some(rect) = region.crop_rect(frame.width(), frame.height()) else {
            log::debug!("Skipping recognition for {subject}: degenerate crop");
            return None;
        };
        let crop = frame.crop(rect);

        let outcome = catch_panic(|| self.recognizer.recognize(&crop))
            .unwrap_or_else(|msg| Err(RecognitionError::Panicked(msg)));
        match outcome {
            Ok(Some(found)) => {
                log::debug!(
                    "Recognized {subject} as {} (similarity {:.3})",
                    found.name,
                    found.similarity
                );
                Some(found.name)
            }
            Ok(None) => None,
            Err(e) => {
                log::debug!("Recognition failed for {subject}: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::identity::domain::face_recognizer::IdentityMatch;
    use crate::shared::region::RegionSource;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Recognizer replaying scripted outcomes and counting invocations.
    pub(crate) struct ScriptedRecognizer {
        script: Mutex<VecDeque<Result<Option<IdentityMatch>, RecognitionError>>>,
        pub(crate) calls: AtomicUsize,
    }

    impl ScriptedRecognizer {
        pub(crate) fn new(
            script: Vec<Result<Option<IdentityMatch>, RecognitionError>>,
        ) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl FaceRecognizer for ScriptedRecognizer {
        fn name(&self) -> &str {
            "scripted"
        }

        fn recognize(&self, _crop: &Frame) -> Result<Option<IdentityMatch>, RecognitionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }
    }

    pub(crate) fn matched(name: &str) -> Result<Option<IdentityMatch>, RecognitionError> {
        Ok(Some(IdentityMatch {
            name: name.to_string(),
            similarity: 0.9,
        }))
    }

    struct PanickingRecognizer;

    impl FaceRecognizer for PanickingRecognizer {
        fn name(&self) -> &str {
            "panicking"
        }

        fn recognize(&self, _crop: &Frame) -> Result<Option<IdentityMatch>, RecognitionError> {
            panic!("backend crashed")
        }
    }

    fn frame() -> Frame {
        Frame::new(vec![0u8; 100 * 100 * 3], 100, 100, 3)
    }

    fn face() -> Region {
        Region::new([10.0, 10.0, 60.0, 60.0], "face", 0.9, RegionSource::Face)
    }

    const K1: TrackKey = TrackKey::Tracked(1);

    #[test]
    fn test_intermediate_frames_never_invoke_recognizer() {
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![]));
        let resolver = IdentityResolver::new(recognizer.clone(), 5);
        let mut cache = IdentityCache::new();

        for counter in 1..5 {
            let label = resolver.resolve(&mut cache, K1, &frame(), &face(), counter);
            assert_eq!(label, UNKNOWN_IDENTITY);
        }
        assert_eq!(recognizer.calls(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_confident_match_is_cached_and_reused() {
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![matched("Alice")]));
        let resolver = IdentityResolver::new(recognizer.clone(), 5);
        let mut cache = IdentityCache::new();

        assert_eq!(resolver.resolve(&mut cache, K1, &frame(), &face(), 5), "Alice");
        for counter in 6..10 {
            assert_eq!(
                resolver.resolve(&mut cache, K1, &frame(), &face(), counter),
                "Alice"
            );
        }
        assert_eq!(recognizer.calls(), 1);
        assert_eq!(cache.get(&K1), Some("Alice"));
    }

    #[test]
    fn test_miss_does_not_erase_confident_identity() {
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![matched("Alice"), Ok(None)]));
        let resolver = IdentityResolver::new(recognizer.clone(), 5);
        let mut cache = IdentityCache::new();

        resolver.resolve(&mut cache, K1, &frame(), &face(), 5);
        let label = resolver.resolve(&mut cache, K1, &frame(), &face(), 10);

        assert_eq!(label, UNKNOWN_IDENTITY);
        assert_eq!(cache.get(&K1), Some("Alice"));
        assert_eq!(resolver.resolve(&mut cache, K1, &frame(), &face(), 11), "Alice");
    }

    #[test]
    fn test_recognition_error_is_contained() {
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![
            matched("Alice"),
            Err(RecognitionError::EmptyGallery),
        ]));
        let resolver = IdentityResolver::new(recognizer, 1);
        let mut cache = IdentityCache::new();

        resolver.resolve(&mut cache, K1, &frame(), &face(), 1);
        let label = resolver.resolve(&mut cache, K1, &frame(), &face(), 2);

        assert_eq!(label, UNKNOWN_IDENTITY);
        assert_eq!(cache.get(&K1), Some("Alice"));
    }

    #[test]
    fn test_panicking_recognizer_reports_unknown() {
        let resolver = IdentityResolver::new(Arc::new(PanickingRecognizer), 1);
        let mut cache = IdentityCache::new();
        let label = resolver.resolve(&mut cache, K1, &frame(), &face(), 1);
        assert_eq!(label, UNKNOWN_IDENTITY);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_degenerate_crop_skips_recognition() {
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![matched("Alice")]));
        let resolver = IdentityResolver::new(recognizer.clone(), 1);
        let mut cache = IdentityCache::new();
        let outside = Region::new([150.0, 150.0, 190.0, 190.0], "face", 0.9, RegionSource::Face);

        let label = resolver.resolve(&mut cache, K1, &frame(), &outside, 1);

        assert_eq!(label, UNKNOWN_IDENTITY);
        assert_eq!(recognizer.calls(), 0);
    }

    #[test]
    fn test_unkeyed_face_is_recognized_but_never_cached() {
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![matched("Alice")]));
        let resolver = IdentityResolver::new(recognizer.clone(), 5);

        assert_eq!(resolver.resolve_unkeyed(&frame(), &face(), 5), "Alice");
        assert_eq!(resolver.resolve_unkeyed(&frame(), &face(), 6), UNKNOWN_IDENTITY);
        assert_eq!(recognizer.calls(), 1);
    }

    #[test]
    fn test_zero_interval_means_every_frame() {
        let resolver = IdentityResolver::new(Arc::new(ScriptedRecognizer::new(vec![])), 0);
        assert_eq!(resolver.interval(), 1);
        assert!(resolver.is_recognition_frame(7));
    }
}
