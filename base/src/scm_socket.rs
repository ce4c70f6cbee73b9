// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! `sendmsg`/`recvmsg` with `SCM_RIGHTS` ancillary data, the mechanism `proxy_link::message`
//! uses to carry up to 8 descriptors alongside the fixed message header.

use std::io::{IoSlice, IoSliceMut};
use std::mem;
use std::os::unix::io::RawFd;
use std::os::unix::net::UnixStream;

use crate::descriptor::AsRawDescriptor;
use crate::error::{Error, Result};

/// Maximum descriptors a single `sendmsg`/`recvmsg` call here will carry. Matches the wire
/// protocol's `REMOTE_MAX_FDS`.
pub const SCM_SOCKET_MAX_FDS: usize = 8;

fn cmsg_space(fd_count: usize) -> usize {
    // SAFETY: CMSG_SPACE is a pure computation on an integer argument.
    unsafe { libc::CMSG_SPACE((fd_count * mem::size_of::<RawFd>()) as u32) as usize }
}

/// Types that can exchange data plus ancillary descriptors over a connected `SOCK_STREAM`
/// socket. Implemented for `UnixStream`; `proxy_link::Channel` is generic over this trait so
/// tests can substitute a socketpair wrapper.
pub trait ScmSocket {
    /// Sends `bufs` as the message body and attaches `fds` via `SCM_RIGHTS`. Returns the number
    /// of bytes written from `bufs`.
    fn send_vectored_with_fds(&self, bufs: &[IoSlice], fds: &[RawFd]) -> Result<usize>;

    /// Receives into `bufs`, collecting any ancillary descriptors into `fds` (truncated to its
    /// capacity). Returns `(bytes_read, fds_received)`.
    fn recv_vectored_with_fds(
        &self,
        bufs: &mut [IoSliceMut],
        fds: &mut [RawFd],
    ) -> Result<(usize, usize)>;
}

impl ScmSocket for UnixStream {
    fn send_vectored_with_fds(&self, bufs: &[IoSlice], fds: &[RawFd]) -> Result<usize> {
        let mut cmsg_buf = vec![0u8; if fds.is_empty() { 0 } else { cmsg_space(fds.len()) }];

        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = bufs.as_ptr() as *mut libc::iovec;
        msg.msg_iovlen = bufs.len() as _;

        if !fds.is_empty() {
            msg.msg_control = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
            msg.msg_controllen = cmsg_buf.len() as _;

            // SAFETY: cmsg_buf is sized by cmsg_space() for exactly this payload and msg is a
            // freshly zeroed, locally owned msghdr.
            unsafe {
                let cmsg: *mut libc::cmsghdr = libc::CMSG_FIRSTHDR(&msg);
                (*cmsg).cmsg_level = libc::SOL_SOCKET;
                (*cmsg).cmsg_type = libc::SCM_RIGHTS;
                (*cmsg).cmsg_len = libc::CMSG_LEN((fds.len() * mem::size_of::<RawFd>()) as u32)
                    as libc::size_t;
                let data = libc::CMSG_DATA(cmsg) as *mut RawFd;
                std::ptr::copy_nonoverlapping(fds.as_ptr(), data, fds.len());
            }
        }

        loop {
            // SAFETY: msg points at valid iovecs/cmsg buffers alive for the call's duration.
            let ret = unsafe {
                libc::sendmsg(self.as_raw_descriptor(), &msg, libc::MSG_NOSIGNAL)
            };
            if ret >= 0 {
                return Ok(ret as usize);
            }
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted
                || err.kind() == std::io::ErrorKind::WouldBlock
            {
                continue;
            }
            return Err(Error::Io(err));
        }
    }

    fn recv_vectored_with_fds(
        &self,
        bufs: &mut [IoSliceMut],
        fds: &mut [RawFd],
    ) -> Result<(usize, usize)> {
        let max_fds = fds.len().min(SCM_SOCKET_MAX_FDS);
        let mut cmsg_buf = vec![0u8; cmsg_space(max_fds)];

        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = bufs.as_mut_ptr() as *mut libc::iovec;
        msg.msg_iovlen = bufs.len() as _;
        msg.msg_control = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
        msg.msg_controllen = cmsg_buf.len() as _;

        let ret = loop {
            // SAFETY: msg points at valid iovecs/cmsg buffers alive for the call's duration.
            let ret = unsafe { libc::recvmsg(self.as_raw_descriptor(), &mut msg, 0) };
            if ret >= 0 {
                break ret;
            }
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted
                || err.kind() == std::io::ErrorKind::WouldBlock
            {
                continue;
            }
            return Err(Error::Io(err));
        };

        let mut fd_count = 0;
        if msg.msg_controllen > 0 {
            // SAFETY: msg was populated by the recvmsg call above and is still valid.
            unsafe {
                let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
                while !cmsg.is_null() {
                    if (*cmsg).cmsg_level == libc::SOL_SOCKET
                        && (*cmsg).cmsg_type == libc::SCM_RIGHTS
                    {
                        let data = libc::CMSG_DATA(cmsg) as *const RawFd;
                        let n = ((*cmsg).cmsg_len as usize
                            - libc::CMSG_LEN(0) as usize)
                            / mem::size_of::<RawFd>();
                        let n = n.min(fds.len());
                        std::ptr::copy_nonoverlapping(data, fds.as_mut_ptr(), n);
                        fd_count = n;
                    }
                    cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
                }
            }
        }

        Ok((ret as usize, fd_count))
    }
}
