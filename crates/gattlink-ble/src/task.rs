//! Role Task Trait Definition
//!
//! Each BLE role runs as an independent async task that owns its adapter and
//! state machine. Callers talk to it only through the cloneable handle returned
//! at construction, so every transition happens on the task's own loop.

use std::fmt;

use gattlink_core::Result;

// ----------------------------------------------------------------------------
// Role Task Trait
// ----------------------------------------------------------------------------

/// BLE role served by a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Central,
    Peripheral,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Central => f.write_str("central"),
            Role::Peripheral => f.write_str("peripheral"),
        }
    }
}

/// Common interface for role tasks
///
/// `run` processes handle commands and adapter events in arrival order until
/// every handle is dropped, a shutdown command arrives, or the adapter's event
/// channel closes. A task can only be run once.
#[async_trait::async_trait]
pub trait RoleTask: Send {
    async fn run(&mut self) -> Result<()>;

    fn role(&self) -> Role;
}
