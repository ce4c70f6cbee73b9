// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! `eventfd(2)` wrapper. Backs the reply-rendezvous ticket (proxy_link::ticket) and the irqfd
//! handed to the worker at `SET_IRQFD` time.

use std::mem;
use std::time::Duration;

use crate::descriptor::{AsRawDescriptor, RawDescriptor, SafeDescriptor};
use crate::error::{Error, Result};

/// Sentinel reply value meaning "remote or transport error". Reserved; never a real reply.
pub const EVENT_SENTINEL: u64 = u64::MAX;

/// An eventfd, counter semantics (`EFD_SEMAPHORE` is not used: reads always drain the full
/// 64-bit counter and reset it to zero, matching a single-shot reply ticket).
#[derive(Debug)]
pub struct Event {
    descriptor: SafeDescriptor,
}

impl Event {
    pub fn new() -> Result<Event> {
        // SAFETY: eventfd(2) with no flags beyond CLOEXEC returns a fresh owned fd or -1.
        let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(Error::CreateEvent(std::io::Error::last_os_error()));
        }
        // SAFETY: fd was just created and is owned by nobody else.
        Ok(Event {
            descriptor: unsafe { SafeDescriptor::from_raw_descriptor(fd) },
        })
    }

    /// Writes `value` into the counter, waking anyone blocked in `poll`/`read`.
    pub fn write(&self, value: u64) -> Result<()> {
        let buf = value.to_ne_bytes();
        // SAFETY: buf is a valid 8-byte buffer and descriptor is a valid eventfd.
        let ret = unsafe {
            libc::write(
                self.descriptor.as_raw_descriptor(),
                buf.as_ptr() as *const libc::c_void,
                mem::size_of::<u64>(),
            )
        };
        if ret != mem::size_of::<u64>() as isize {
            return Err(Error::WriteEvent(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Blocking read of the 8-byte counter value.
    pub fn read(&self) -> Result<u64> {
        let mut buf = [0u8; mem::size_of::<u64>()];
        // SAFETY: buf is a valid 8-byte buffer and descriptor is a valid eventfd.
        let ret = unsafe {
            libc::read(
                self.descriptor.as_raw_descriptor(),
                buf.as_mut_ptr() as *mut libc::c_void,
                mem::size_of::<u64>(),
            )
        };
        if ret != mem::size_of::<u64>() as isize {
            return Err(Error::ReadEvent(std::io::Error::last_os_error()));
        }
        Ok(u64::from_ne_bytes(buf))
    }

    /// Waits up to `timeout` for the counter to become readable, without consuming it.
    /// Returns `Ok(true)` if readable, `Ok(false)` on timeout.
    pub fn wait_readable(&self, timeout: Duration) -> Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.descriptor.as_raw_descriptor(),
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        loop {
            // SAFETY: pfd is a single valid pollfd on the stack.
            let ret = unsafe { libc::poll(&mut pfd, 1, millis) };
            if ret < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(Error::Poll(err));
            }
            return Ok(ret > 0);
        }
    }

    pub fn try_clone(&self) -> Result<Event> {
        Ok(Event {
            descriptor: self.descriptor.try_clone()?,
        })
    }
}

impl AsRawDescriptor for Event {
    fn as_raw_descriptor(&self) -> RawDescriptor {
        self.descriptor.as_raw_descriptor()
    }
}

impl From<Event> for SafeDescriptor {
    fn from(evt: Event) -> Self {
        evt.descriptor
    }
}

impl From<SafeDescriptor> for Event {
    fn from(descriptor: SafeDescriptor) -> Self {
        Event { descriptor }
    }
}
