// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
pub mod task;

pub use task::{CancelToken, InitTask, TaskError, TaskPoll};

/// Installs the process-wide subscriber. Safe to call more than once.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_twice_is_harmless() {
        init_tracing();
        init_tracing();
        tracing::info!(target: "prism::task", "subscriber installed");
    }
}
