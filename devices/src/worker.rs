// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Worker lifecycle: fork the worker, establish the command socket, publish the channel to the
//! host, reap on shutdown. The child is handed one end of a `socketpair` on `stdin` and execs
//! the worker binary directly; nothing jails the fork, so callers that need sandboxing should
//! wrap `command` in their own jail before passing it here.

use std::ffi::CString;
use std::os::unix::io::FromRawFd;
use std::os::unix::io::RawFd;
use std::os::unix::net::UnixStream;

use base::wait_for_pid;
use base::Child;
use base::Pid;
use proxy_link::Channel;

use crate::error::Error;
use crate::error::Result;

/// Handle to a forked worker process, owned exclusively by the `ProxyDevice` that started it.
pub struct WorkerHandle {
    child: Child,
}

impl WorkerHandle {
    pub fn pid(&self) -> Pid {
        self.child.pid()
    }

    /// Reaps the process, consuming the handle. Used directly by `ProxyDevice`'s `Drop` once it
    /// has already raised `HUP` on the worker's end of the channel.
    pub fn wait(self) -> Result<u8> {
        self.child.wait().map_err(Error::Base)
    }
}

/// Forks and execs `command`, handing it one end of a fresh `SOCK_STREAM` socketpair as `stdin`.
/// Returns the host's end wrapped in a [`Channel`] plus a handle to reap the child later.
pub fn start_worker(command: &str) -> Result<(Channel, WorkerHandle)> {
    let mut fds: [RawFd; 2] = [-1, -1];
    // SAFETY: fds is a valid 2-element out-param on the stack.
    let ret = unsafe {
        libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr())
    };
    if ret != 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }
    let (host_fd, worker_fd) = (fds[0], fds[1]);

    let program = CString::new(command)
        .map_err(|_| Error::ForkWorker("command contains an interior NUL byte".to_owned()))?;

    // SAFETY: fork() is safe to call; the child below only calls async-signal-safe functions
    // (dup2, close, execvp) before either execing or exiting.
    let pid = unsafe { libc::fork() };
    match pid {
        -1 => {
            let err = std::io::Error::last_os_error();
            // SAFETY: both fds are owned, freshly created descriptors.
            unsafe {
                libc::close(host_fd);
                libc::close(worker_fd);
            }
            Err(Error::Io(err))
        }
        0 => {
            // SAFETY: this is the freshly forked child, about to exec or exit; none of this
            // runs concurrently with the parent's use of host_fd/worker_fd.
            unsafe {
                if libc::dup2(worker_fd, libc::STDIN_FILENO) == -1 {
                    libc::_exit(1);
                }
                libc::close(host_fd);
                libc::close(worker_fd);

                let argv: [*const libc::c_char; 2] = [program.as_ptr(), std::ptr::null()];
                libc::execvp(program.as_ptr(), argv.as_ptr());
                // execvp only returns on failure.
                libc::_exit(1);
            }
        }
        child_pid => {
            // SAFETY: worker_fd is only used by the child from here on; the parent keeps
            // host_fd as the sole owner of its own stream.
            unsafe {
                libc::close(worker_fd);
            }
            // SAFETY: host_fd was just created by socketpair(2) above and is owned by nobody
            // else in this process.
            let stream = unsafe { UnixStream::from_raw_fd(host_fd) };
            let channel = Channel::new(stream);
            let worker = WorkerHandle {
                child: Child::new(child_pid),
            };
            Ok((channel, worker))
        }
    }
}

/// Closes the host's end of the channel, which raises `HUP` on the worker's end and lets its
/// dispatch loop shut down on its own, then reaps the process.
pub fn stop_worker(channel: Channel, worker: WorkerHandle) -> Result<u8> {
    drop(channel);
    worker.wait()
}

/// Blocks for `pid` to exit without going through a [`WorkerHandle`]; used when the caller
/// already observed the channel hang up via some other path and just needs to reap.
pub fn reap(pid: Pid) -> Result<()> {
    wait_for_pid(pid, 0).map_err(Error::Base)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_stop_true_worker() {
        let (channel, worker) = start_worker("/bin/sh").unwrap();
        drop(channel);
        // /bin/sh reading EOF on stdin exits 0.
        let code = worker.wait().unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn nonexistent_command_still_forks_and_the_child_exits_nonzero() {
        let (channel, worker) = start_worker("/no/such/binary-ipc-core-test").unwrap();
        drop(channel);
        let code = worker.wait().unwrap();
        assert_eq!(code, 1);
    }
}
