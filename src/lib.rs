pub mod config;
pub mod control;
pub mod encoder;
pub mod http;
pub mod registry;
pub mod session;

pub use config::Config;
pub use control::{BulkReport, ControlError};
pub use encoder::{EncoderEvent, EncoderProcess, SpawnError};
pub use http::{create_router, AppState};
pub use registry::{DuplicateSessionError, SessionRegistry};
pub use session::{
    RecordingConfig, RecordingPaths, RecordingSession, RecordingState, SessionEvent, SessionStatus,
    StreamPath,
};
