pub mod config;
pub mod finalize;
pub mod paths;
pub mod session;
pub mod status;

pub use config::{RecordingConfig, RelayPassConfig, StreamPath};
pub use finalize::{CaptureError, ValidationReport};
pub use paths::RecordingPaths;
pub use session::RecordingSession;
pub use status::{ProgressTracker, RecordingState, SessionEvent, SessionStatus};
