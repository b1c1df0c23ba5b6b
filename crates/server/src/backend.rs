//! Seams to the interception layer the server is embedded in
//!
//! The server does not know how calls are dispatched, how state is read or
//! how objects are fetched. The host implements [`Backend`] for those and
//! hands the server a [`CallRecord`] for every intercepted call.

use transport::{DataKind, DataRequest, DataResponse, EventKind, StateCursor};

/// Dense numeric identifier of an interceptable function
pub type CallId = usize;

/// Name of the module that hosts the server; it cannot be toggled remotely
pub const DEBUGGER_MODULE: &str = "debugger";

/// One intercepted call as seen by the dispatch layer
pub trait CallRecord {
    fn id(&self) -> CallId;

    fn name(&self) -> &str;

    /// Human readable rendering of the call and its arguments
    ///
    /// Only rendered when the call is reported to the client.
    fn dump(&self) -> String;
}

/// Load state of a module in the interception chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleStatus {
    pub loaded: bool,
    pub active: bool,
}

/// Reasons an object data request could not be served
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("inside glBegin/glEnd")]
    UnsafeState,

    #[error("invalid {kind} id {id}")]
    InvalidId { kind: DataKind, id: u32 },

    #[error("{0} is not available")]
    MissingCapability(String),

    #[error("{0}")]
    Failed(String),
}

/// Everything the command server needs from the traced API
///
/// Methods are called on the debug thread only, while it is inside the
/// interception wrapper; any API calls a method makes are passed straight
/// through without being intercepted again.
pub trait Backend: Send + Sync {
    /// Size of the call id space; ids are `0..function_count()`
    fn function_count(&self) -> usize;

    fn function_id(&self, name: &str) -> Option<CallId>;

    /// True between the begin and end of an atomic drawing block
    fn in_atomic_block(&self) -> bool;

    /// Whether state queries may be issued right now
    fn is_query_safe(&self) -> bool {
        !self.in_atomic_block()
    }

    /// Finish outstanding rendering so the client sees up to date results
    fn finish_rendering(&self) {}

    /// Root of the live state tree
    fn state_root(&self) -> Box<dyn StateCursor + '_>;

    fn read_object(&self, request: &DataRequest) -> Result<DataResponse, ObjectError>;

    fn module_status(&self, name: &str) -> Option<ModuleStatus>;

    fn set_module_active(&self, name: &str, active: bool);

    /// Check whether `call`, which has just completed, raised `event`
    ///
    /// Returns a description of the event if it fired. Only called for events
    /// the client has enabled, in [`EventKind::ALL`] order.
    fn detect_event(&self, call: &dyn CallRecord, event: EventKind) -> Option<String>;
}
