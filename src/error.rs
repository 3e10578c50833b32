// Error taxonomy for the try-on engine.
// Only a handful of variants ever reach the user; everything else degrades
// silently so the live preview keeps running.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TryOnError {
    /// No camera, permission denied, or the stream never produced a frame.
    #[error("Camera unavailable: {0}")]
    Acquisition(String),

    /// A live stream produced nothing within one wait; it may still recover.
    #[error("No camera frame within {waited_ms} ms")]
    FrameTimeout { waited_ms: u64 },

    /// The tracking provider could not be loaded/configured.
    #[error("Face tracking library unavailable: {0}")]
    LibraryUnavailable(String),

    /// The tracker started but never reported ready within the bound.
    #[error("Face tracking never became ready after {waited_ms} ms")]
    TrackerNeverReady { waited_ms: u64 },

    /// Destination surface could not be created (zero size, allocation failure).
    #[error("Render surface missing: {0}")]
    RenderSurfaceMissing(String),

    /// GPU adapter/device/shader failure; callers fall back to the 2D backend.
    #[error("GPU backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Decal fetch or parse failure; that decal is not drawn.
    #[error("Decal asset failed ({url}): {reason}")]
    AssetFetch { url: String, reason: String },

    /// The source frame cannot be read back (non-clean origin).
    #[error("Pixel access denied")]
    PixelAccessDenied,

    #[error("Invalid color: {0:?}")]
    InvalidColor(String),

    #[error("Unknown face region: {0:?}")]
    InvalidRegion(String),

    #[error("Invalid landmark frame: {0}")]
    InvalidLandmarks(String),

    /// A single region's draw step failed; the rest of the frame continues.
    #[error("Draw failed for {region}: {reason}")]
    Draw { region: &'static str, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Window error: {0}")]
    Window(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TryOnError {
    /// Errors that get a message in the preview area.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            TryOnError::Acquisition(_)
                | TryOnError::LibraryUnavailable(_)
                | TryOnError::TrackerNeverReady { .. }
                | TryOnError::RenderSurfaceMissing(_)
        )
    }

    /// Only acquisition offers a manual retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TryOnError::Acquisition(_))
    }

    pub(crate) fn draw(region: &'static str, reason: impl Into<String>) -> Self {
        TryOnError::Draw { region, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, TryOnError>;
