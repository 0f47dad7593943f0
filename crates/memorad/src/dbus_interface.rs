use crate::engine::Engine;
use std::sync::Arc;
use zbus::interface;

pub const BUS_NAME: &str = "org.memora.Recognizer1";
pub const OBJECT_PATH: &str = "/org/memora/Recognizer1";

/// D-Bus interface for the Memora recognition daemon.
///
/// Bus name: org.memora.Recognizer1
/// Object path: /org/memora/Recognizer1
pub struct RecognizerService {
    engine: Arc<Engine>,
}

impl RecognizerService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

#[interface(name = "org.memora.Recognizer1")]
impl RecognizerService {
    /// Identify which family member of `subject_id` appears in the encoded photo.
    ///
    /// Always answers with a recognition result JSON; failures are reported
    /// through its `error_type` rather than as D-Bus errors.
    async fn recognize(&self, image: Vec<u8>, subject_id: &str) -> zbus::fdo::Result<String> {
        tracing::info!(subject = subject_id, bytes = image.len(), "recognize requested");
        let decision = self.engine.recognize(&image, subject_id).await;
        Ok(decision.to_json().to_string())
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(self.engine.status().to_string())
    }
}
