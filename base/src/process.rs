// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! `waitpid(2)` helpers used by `devices::worker` to reap the remote process on `stop_worker`.

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use log::warn;

use crate::error::{Error, Result};

pub type Pid = libc::pid_t;

/// Blocking `waitpid(pid, options)`. Returns the reaped pid and its exit status.
pub fn wait_for_pid(pid: Pid, options: libc::c_int) -> Result<(Pid, ExitStatus)> {
    let mut status: libc::c_int = 0;
    loop {
        // SAFETY: status is a valid out-param on the stack.
        let ret = unsafe { libc::waitpid(pid, &mut status, options) };
        if ret == -1 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(Error::WaitPid(err));
        }
        return Ok((ret, ExitStatus::from_raw(status)));
    }
}

/// Handle to a forked/spawned worker process. Dropping it without calling [`Child::wait`] logs
/// a warning, matching the discipline every other owned kernel resource in this crate follows.
pub struct Child {
    pid: Pid,
    waited: bool,
}

impl Child {
    pub fn new(pid: Pid) -> Child {
        Child { pid, waited: false }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Reaps the process, translating a normal exit or a fatal signal into an exit code.
    pub fn wait(mut self) -> Result<u8> {
        self.waited = true;
        let (_, status) = wait_for_pid(self.pid, 0)?;
        if let Some(code) = status.code() {
            Ok(code as u8)
        } else if let Some(signal) = status.signal() {
            warn!("worker pid {} killed by signal {}", self.pid, signal);
            Ok(128u8.wrapping_add(signal as u8))
        } else {
            Err(Error::ExitStatus)
        }
    }
}

impl Drop for Child {
    fn drop(&mut self) {
        if !self.waited {
            warn!("worker pid {} dropped without being waited on", self.pid);
        }
    }
}
