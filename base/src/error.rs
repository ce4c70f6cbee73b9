// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::io;

use remain::sorted;
use thiserror::Error;

/// Errors raised by the low-level descriptor, event and process primitives in this crate.
#[sorted]
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to create eventfd: {0}")]
    CreateEvent(io::Error),
    #[error("failed to duplicate descriptor: {0}")]
    DupDescriptor(io::Error),
    #[error("child process exited with an unexpected status")]
    ExitStatus,
    #[error("failed to fork worker process: {0}")]
    Fork(io::Error),
    #[error("I/O error: {0}")]
    Io(io::Error),
    #[error("poll() failed: {0}")]
    Poll(io::Error),
    #[error("failed to read eventfd: {0}")]
    ReadEvent(io::Error),
    #[error("waitpid failed: {0}")]
    WaitPid(io::Error),
    #[error("failed to write eventfd: {0}")]
    WriteEvent(io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
