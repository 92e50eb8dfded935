//! Commands sent from the session handle to its worker thread

use transport::Request;

use crate::error::SessionError;

#[derive(Debug)]
pub(crate) enum Command {
    /// Check the request against the session state and write it.
    ///
    /// The result only says whether the request was written; replies arrive
    /// as events.
    Send {
        request: Request,
        response_tx: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Ask the debuggee to exit, then close the connection once it has or
    /// the shutdown timeout passes.
    Shutdown,
}
