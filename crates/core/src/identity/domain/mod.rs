pub mod face_embedder;
pub mod face_recognizer;
pub mod identity_cache;
pub mod identity_resolver;
pub mod track_key;
