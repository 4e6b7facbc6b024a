//! Session lifecycle management.
//!
//! There is exactly one session per process. Its state is owned by the
//! [`SessionController`]; everything else reads snapshots.

mod controller;
mod state;

pub use controller::{SessionController, SessionError, LOGOUT_FAILED_REASON};
pub use state::SessionState;
