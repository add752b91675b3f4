pub mod args;
pub mod process;

pub use args::{RecoveryStrategy, RECOVERY_STRATEGIES};
pub use process::{parse_progress_seconds, EncoderEvent, EncoderProcess, SpawnError};
