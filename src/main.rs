//! CLI entry point for mixhound.

use std::process::ExitCode;

use anyhow::Result;

mod app;
mod cli;

/// Process outcome mapped to an exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Everything requested succeeded.
    Success,
    /// Some downloads failed, some succeeded.
    Partial,
    /// Nothing requested succeeded.
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => Self::SUCCESS,
            ProcessExit::Failure => Self::from(1),
            ProcessExit::Partial => Self::from(2),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let exit = app::run_mixhound().await?;
    Ok(exit.into())
}
