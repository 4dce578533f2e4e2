//! Holiday daemon: settings watcher, daily timer and socket server around a
//! shared sync engine.

mod error;
pub mod log_rotation;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod schedule;
pub mod summary;

pub use error::DaemonError;
pub use protocol::{
    request_list, request_show, request_status, request_stop, request_sync, request_today,
    send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking};
pub use summary::{phase_label, CountrySummary, LastSyncSummary, SyncSummary};
