use std::error::Error as StdError;
use std::io::ErrorKind;

use crate::error::Error;

fn error_chain_has_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    error_chain_matches(err, ErrorKind::ConnectionRefused, "connection refused")
}

fn error_chain_has_timeout(err: &(dyn StdError + 'static)) -> bool {
    error_chain_matches(err, ErrorKind::TimedOut, "timed out")
}

fn error_chain_matches(err: &(dyn StdError + 'static), kind: ErrorKind, needle: &str) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>()
            && io_err.kind() == kind
        {
            return true;
        }

        if source.to_string().to_ascii_lowercase().contains(needle) {
            return true;
        }

        current = source.source();
    }

    false
}

/// Maps a failed send into a transport error with a hint at the likely fix.
pub(crate) fn request_error(err: reqwest::Error, api_url: &str, timeout_secs: u64) -> Error {
    if err.is_timeout() || error_chain_has_timeout(&err) {
        return Error::Transport(format!(
            "request timed out after {timeout_secs}s while calling '{api_url}'; \
             increase AEH_TIMEOUT_SECS or try again later"
        ));
    }

    if err.is_connect() {
        if error_chain_has_connection_refused(&err) {
            return Error::Transport(format!(
                "connection refused by '{api_url}'; check AEH_API_URL if you have overridden it"
            ));
        }

        return Error::Transport(format!(
            "failed to connect to '{api_url}'; check your network connectivity ({err})"
        ));
    }

    if err.is_builder() {
        return Error::Transport(format!("error creating HTTP request for '{api_url}' ({err})"));
    }

    Error::Transport(format!("error doing HTTP request to '{api_url}' ({err})"))
}
