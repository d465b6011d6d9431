use crate::{
    context::Context,
    error::ProcessError,
    process::Process,
    response::{responder_fn, Action, Response},
};

/// Closes the process once it has been restarted `max_restarts` times.
///
/// Below the limit it passes, so it is meant to precede a decisive responder
/// such as [`restart`](crate::restart) or [`backoff`](crate::backoff).
pub fn limit(max_restarts: u32) -> Response {
    Response::new(move |process: &Process| {
        let process = process.clone();
        responder_fn(move |_: &Context, err| {
            if process.restarts() >= max_restarts {
                return (
                    Action::Close,
                    Some(ProcessError::RestartLimit {
                        limit: max_restarts,
                    }),
                );
            }
            (Action::Pass, err)
        })
    })
}
