// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The worker side of the multi-process device IPC core: the capability trait a hosted device
//! implements ([`RemoteDevice`]) and the dispatch loop that drives it off the command channel
//! the worker inherited as `stdin`.

mod device;
mod dispatch;

pub use device::RemoteDevice;
pub use dispatch::run_dispatch_loop;

use std::os::unix::io::FromRawFd;
use std::os::unix::net::UnixStream;

use proxy_link::Channel;
use proxy_link::Result;

/// Entry point for a freshly exec'd worker process: the command socket arrives as fd 0, so this
/// wraps it into a [`Channel`] and runs `device` through [`run_dispatch_loop`] until the host
/// disconnects.
pub fn worker_main(device: &mut dyn RemoteDevice) -> Result<()> {
    base::init_logging();

    // SAFETY: the host process that exec'd us set fd 0 up as one end of a connected
    // SOCK_STREAM socketpair before exec, and this is the first and only place that takes
    // ownership of it.
    let stream = unsafe { UnixStream::from_raw_fd(0) };
    let channel = Channel::new(stream);
    run_dispatch_loop(&channel, device)
}
