//! Peer session orchestration.
//!
//! Provides:
//! - `SessionCore` - Connection lifecycle, handshake and sends
//! - `SessionManager` / `SessionHandle` - The state-owner task and its API
//! - `InteractionLogger` - Experiment recording with CSV export
//! - `DragThrottle` - Rate shaping for continuous input
//! - `EventStore` - Session event feed with history

mod dispatch;
pub mod events;
pub mod logger;
pub mod manager;
pub mod shaping;
pub mod state;
pub mod storage;

pub use events::{EventStore, SessionEvent};
pub use logger::InteractionLogger;
pub use manager::{SessionHandle, SessionManager};
pub use shaping::{DragThrottle, precision_steps};
pub use state::{SessionCore, SessionError, SessionSnapshot};
pub use storage::{CsvExporter, ExportError, InteractionLog, InteractionLogEntry};
