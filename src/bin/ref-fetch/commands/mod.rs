//! Command implementations

pub mod cache;
pub mod completions;
pub mod fetch;

use std::process::ExitCode;

use ref_fetch::core::FetchError;
use ref_fetch::util::diagnostic;
use ref_fetch::util::Shell;

/// Report an error that stops the command before any work.
pub(crate) fn fatal(shell: &Shell, err: &FetchError) -> ExitCode {
    if shell.is_json() {
        shell.error(err);
    } else {
        diagnostic::emit(&err.to_diagnostic(), shell.use_color());
    }
    ExitCode::from(1)
}
