// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! One duplex endpoint over a connected `SOCK_STREAM` socket, with independent send/receive
//! locks so a synchronous requester blocked in `recv` never stalls an unrelated sender. Exposes
//! its raw descriptor for a caller's own event loop to poll on instead of registering directly
//! with a particular reactor implementation.

use std::io::IoSlice;
use std::io::IoSliceMut;
use std::os::unix::io::RawFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use base::AsRawDescriptor;
use base::RawDescriptor;
use base::SafeDescriptor;
use base::ScmSocket;
use sync::Mutex;
use zerocopy::AsBytes;
use zerocopy::FromZeroes;

use crate::error::Error;
use crate::error::Result;
use crate::message::Message;
use crate::message::RawHeader;
use crate::message::HEADER_SIZE;
use crate::message::MAX_FDS;

bitflags::bitflags! {
    /// Readiness conditions a caller's event loop cares about.
    pub struct PollEvents: u32 {
        const READABLE = 1 << 0;
        const HANGUP   = 1 << 1;
        const ERROR    = 1 << 2;
    }
}

/// One duplex endpoint wrapping a connected Unix-domain stream socket. Exactly one per remote
/// device; owned by the proxy device handle on the host side, by the worker's dispatch loop on
/// the remote side.
pub struct Channel {
    stream: UnixStream,
    send_lock: Mutex<()>,
    recv_lock: Mutex<()>,
}

impl Channel {
    pub fn new(stream: UnixStream) -> Channel {
        Channel {
            stream,
            send_lock: Mutex::new(()),
            recv_lock: Mutex::new(()),
        }
    }

    /// Sends a full message: header segment (with any fds attached via `SCM_RIGHTS`), then the
    /// bytestream payload if present. Both segments are written under one acquisition of the
    /// send lock so framing cannot be interleaved with a concurrent sender.
    pub fn send(&self, msg: &Message) -> Result<()> {
        msg.validate()?;

        let header = msg.raw_header();
        let header_bytes = header.as_bytes();
        let raw_fds: Vec<RawFd> = msg.fds.iter().map(|fd| fd.as_raw_descriptor()).collect();

        let _guard = self.send_lock.lock();

        self.send_all(header_bytes, &raw_fds)?;
        if msg.bytestream && !msg.data2.is_empty() {
            self.send_all(&msg.data2, &[])?;
        }
        Ok(())
    }

    /// Writes all of `buf`, advancing past whatever a short `sendmsg` already accepted before
    /// retrying with the unsent remainder. `fds` are attached only to the first call.
    fn send_all(&self, buf: &[u8], fds: &[RawFd]) -> Result<()> {
        let mut offset = 0;
        let mut fds = fds;
        while offset < buf.len() {
            let n = self
                .stream
                .send_vectored_with_fds(&[IoSlice::new(&buf[offset..])], fds)
                .map_err(Error::Base)?;
            fds = &[];
            if n == 0 {
                return Err(Error::Disconnect);
            }
            offset += n;
        }
        Ok(())
    }

    /// Receives one full message: header segment first (collecting any `SCM_RIGHTS` fds), then
    /// the bytestream payload if the header says `bytestream`. Blocks until a full message is
    /// read.
    pub fn recv(&self) -> Result<Message> {
        let _guard = self.recv_lock.lock();

        let mut header = RawHeader::new_zeroed();
        let mut fd_buf = [0 as RawFd; MAX_FDS];
        let (n, nfds) = self
            .stream
            .recv_vectored_with_fds(
                &mut [IoSliceMut::new(header.as_bytes_mut())],
                &mut fd_buf,
            )
            .map_err(Error::Base)?;
        if n == 0 {
            return Err(Error::Disconnect);
        }
        if n != HEADER_SIZE {
            return Err(Error::ShortRead(HEADER_SIZE, n));
        }

        // SAFETY: recv_vectored_with_fds returns descriptors newly dup'd into this process by
        // the kernel via SCM_RIGHTS; ownership transfers to us here.
        let fds: Vec<SafeDescriptor> = fd_buf[..nfds]
            .iter()
            .map(|&fd| unsafe { SafeDescriptor::from_raw_descriptor(fd) })
            .collect();

        let bytestream = header.bytestream();
        let size = header.payload_size();

        let data2 = if bytestream && size > 0 {
            self.recv_exact(size)?
        } else {
            Vec::new()
        };

        Message::from_raw(header, fds, data2)
    }

    fn recv_exact(&self, size: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            let (n, _) = self
                .stream
                .recv_vectored_with_fds(&mut [IoSliceMut::new(&mut buf[filled..])], &mut [])
                .map_err(Error::Base)?;
            if n == 0 {
                return Err(Error::Disconnect);
            }
            filled += n;
        }
        Ok(buf)
    }

    /// Blocks up to `timeout` (or indefinitely, if `None`) for the socket to become
    /// readable/hung-up/errored, for a caller's own event loop to drive the dispatch loop.
    pub fn wait_ready(&self, timeout: Option<Duration>) -> Result<PollEvents> {
        let mut pfd = libc::pollfd {
            fd: self.stream.as_raw_descriptor(),
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout
            .map(|d| d.as_millis().min(libc::c_int::MAX as u128) as libc::c_int)
            .unwrap_or(-1);
        loop {
            // SAFETY: pfd is a single valid pollfd on the stack.
            let ret = unsafe { libc::poll(&mut pfd, 1, millis) };
            if ret < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(Error::Io(err));
            }
            let mut events = PollEvents::empty();
            if ret > 0 {
                if pfd.revents & libc::POLLIN != 0 {
                    events |= PollEvents::READABLE;
                }
                if pfd.revents & libc::POLLHUP != 0 {
                    events |= PollEvents::HANGUP;
                }
                if pfd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
                    events |= PollEvents::ERROR;
                }
            }
            return Ok(events);
        }
    }

    pub fn try_clone(&self) -> Result<Channel> {
        Ok(Channel::new(self.stream.try_clone().map_err(Error::Io)?))
    }
}

impl AsRawDescriptor for Channel {
    fn as_raw_descriptor(&self) -> RawDescriptor {
        self.stream.as_raw_descriptor()
    }
}
