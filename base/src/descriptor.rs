// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Ownership wrapper for raw file descriptors, shared by every component that hands a kernel
//! object (socket, eventfd, memfd) across a process boundary.

use std::fs::File;
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd};
use std::os::unix::net::UnixStream;

use crate::error::{Error, Result};

/// Platform descriptor type. An alias rather than a newtype so existing `RawFd`-based libc and
/// std APIs compose without conversions.
pub type RawDescriptor = RawFd;

pub const INVALID_DESCRIPTOR: RawDescriptor = -1;

/// Types that expose a borrowed descriptor without transferring ownership.
pub trait AsRawDescriptor {
    fn as_raw_descriptor(&self) -> RawDescriptor;
}

impl AsRawDescriptor for File {
    fn as_raw_descriptor(&self) -> RawDescriptor {
        self.as_raw_fd()
    }
}

impl AsRawDescriptor for UnixStream {
    fn as_raw_descriptor(&self) -> RawDescriptor {
        self.as_raw_fd()
    }
}

/// An owned descriptor, closed on drop. `Message::fds` and `ReplyTicket` hold their kernel
/// objects behind this instead of bare `RawFd`s so a dropped message or ticket cannot leak.
#[derive(Debug)]
pub struct SafeDescriptor {
    descriptor: RawDescriptor,
}

impl SafeDescriptor {
    /// Takes ownership of `fd`. The caller must not use `fd` again.
    ///
    /// # Safety
    /// `fd` must be a valid, open descriptor, not owned elsewhere.
    pub unsafe fn from_raw_descriptor(fd: RawDescriptor) -> Self {
        SafeDescriptor { descriptor: fd }
    }

    /// Duplicates the underlying descriptor with `dup(2)`.
    pub fn try_clone(&self) -> Result<SafeDescriptor> {
        // SAFETY: self.descriptor is a valid fd owned by this struct for its whole lifetime.
        let fd = unsafe { libc::dup(self.descriptor) };
        if fd < 0 {
            return Err(Error::DupDescriptor(std::io::Error::last_os_error()));
        }
        // SAFETY: dup(2) returned a freshly-owned descriptor.
        Ok(unsafe { SafeDescriptor::from_raw_descriptor(fd) })
    }
}

impl AsRawDescriptor for SafeDescriptor {
    fn as_raw_descriptor(&self) -> RawDescriptor {
        self.descriptor
    }
}

impl Drop for SafeDescriptor {
    fn drop(&mut self) {
        if self.descriptor >= 0 {
            // SAFETY: self.descriptor is owned exclusively by this struct.
            unsafe {
                libc::close(self.descriptor);
            }
        }
    }
}

impl FromRawFd for SafeDescriptor {
    unsafe fn from_raw_fd(fd: RawFd) -> Self {
        SafeDescriptor::from_raw_descriptor(fd)
    }
}

impl From<File> for SafeDescriptor {
    fn from(file: File) -> Self {
        // SAFETY: into_raw_fd() transfers ownership out of `file`.
        unsafe { SafeDescriptor::from_raw_descriptor(file.into_raw_fd()) }
    }
}

impl From<SafeDescriptor> for File {
    fn from(descriptor: SafeDescriptor) -> Self {
        let fd = descriptor.descriptor;
        std::mem::forget(descriptor);
        // SAFETY: fd was owned by descriptor, ownership transfers here.
        unsafe { File::from_raw_fd(fd) }
    }
}
