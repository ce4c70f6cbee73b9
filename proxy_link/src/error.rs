// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use remain::sorted;
use thiserror::Error;

/// Errors raised by the wire codec, channel and reply-rendezvous layers.
#[sorted]
#[derive(Error, Debug)]
pub enum Error {
    #[error("low-level descriptor/event primitive failed: {0}")]
    Base(#[from] base::Error),
    #[error("peer closed the channel")]
    Disconnect,
    #[error("message is not a recognized command: {0}")]
    InvalidCommand(u32),
    #[error("message has {0} fds, more than REMOTE_MAX_FDS (8)")]
    InvalidFdCount(usize),
    #[error("message size {0} exceeds the bytestream max (256)")]
    InvalidSize(usize),
    #[error("I/O error: {0}")]
    Io(std::io::Error),
    #[error("short read: expected {0} bytes, got {1}")]
    ShortRead(usize, usize),
    #[error("command {0:?} requires {1} fds, message carried {2}")]
    WrongFdCount(crate::message::Command, usize, usize),
}

pub type Result<T> = std::result::Result<T, Error>;
