// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Low-level primitives shared by `proxy_link`, `devices` and `vm_control`: owned descriptors,
//! an eventfd wrapper, `SCM_RIGHTS` fd passing, process reaping, and the crate-wide error type
//! and logging setup. Mirrors the role the `base` crate plays in the wider workspace: every
//! other crate here talks to the kernel through this one.

mod descriptor;
mod error;
mod event;
mod process;
mod scm_socket;

pub use descriptor::{AsRawDescriptor, RawDescriptor, SafeDescriptor, INVALID_DESCRIPTOR};
pub use error::{Error, Result};
pub use event::{Event, EVENT_SENTINEL};
pub use process::{wait_for_pid, Child, Pid};
pub use scm_socket::{ScmSocket, SCM_SOCKET_MAX_FDS};

pub use log::{debug, error, info, trace, warn};

use once_cell::sync::OnceCell;

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Installs the process-wide `env_logger`. Idempotent: the host binary and every `#[test]`
/// harness can call this unconditionally.
pub fn init_logging() {
    LOGGER_INIT.get_or_init(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_micros()
            .init();
    });
}
