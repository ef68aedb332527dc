//! State tracked during a scan
//!
//! - `ScanStatus`: lifecycle of the whole scan
//! - `CrawlStats`: counters reported to the status collaborator
//! - `HostState`: per-registrable-domain request spacing

mod host_state;
mod scan_status;
mod stats;

pub use host_state::HostState;
pub use scan_status::ScanStatus;
pub use stats::CrawlStats;
