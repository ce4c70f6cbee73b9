// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use remain::sorted;
use thiserror::Error;

/// Errors raised by the host-side proxy device shim and worker lifecycle management.
#[sorted]
#[derive(Error, Debug)]
pub enum Error {
    #[error("low-level descriptor/process primitive failed: {0}")]
    Base(#[from] base::Error),
    #[error("worker command is not a valid argv[0]: {0}")]
    ForkWorker(String),
    #[error("failed to create command socketpair or fork worker process: {0}")]
    Io(std::io::Error),
    #[error("wire protocol error: {0}")]
    ProxyLink(#[from] proxy_link::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
