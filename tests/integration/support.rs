//! Shared helpers for the integration tests

use std::path::Path;

use husk_interpreter::{ExitStatus, Shell, Template};

/// A quiet shell that reports failures as normal statuses
pub fn shell() -> Shell {
    Shell::new().quiet().nothrow()
}

pub fn run(script: impl Into<Template>) -> ExitStatus {
    shell().run(script).unwrap()
}

pub fn run_in(dir: &Path, script: impl Into<Template>) -> ExitStatus {
    shell().cwd(dir).run(script).unwrap()
}

/// Open file descriptors of this process
pub fn open_fds() -> usize {
    std::fs::read_dir("/proc/self/fd").map_or(0, Iterator::count)
}
