//! Stateful session over one open connection.

use tracing::{debug, warn};

use crate::{
    client::RfcConnection,
    error::{RfcError, RfcResult},
};

/// A connection with a started session. The session is ended exactly once:
/// by an explicit [`Session::end`] or, failing that, on drop.
pub struct Session {
    connection: Box<dyn RfcConnection>,
    active: bool,
}

impl Session {
    pub fn start(mut connection: Box<dyn RfcConnection>) -> RfcResult<Self> {
        connection.begin_session().map_err(RfcError::Session)?;
        debug!("RFC session started");
        Ok(Self {
            connection,
            active: true,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn connection(&mut self) -> &mut dyn RfcConnection {
        self.connection.as_mut()
    }

    /// End the session. Later calls are no-ops. A failure to end is logged,
    /// never returned: it must not mask the error that caused the teardown.
    pub fn end(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        match self.connection.end_session() {
            Ok(()) => debug!("RFC session ended"),
            Err(e) => warn!("Failed to end RFC session: {}", e),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.end();
    }
}
