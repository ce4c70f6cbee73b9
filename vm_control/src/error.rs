// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use remain::sorted;
use thiserror::Error;

#[sorted]
#[derive(Error, Debug)]
pub enum Error {
    #[error("rdev_id {0:?} is already registered")]
    AlreadyExists(String),
    #[error("proxy device shim failed: {0}")]
    Device(#[from] devices::Error),
    #[error("no remote device registered under rdev_id {0:?}")]
    NotFound(String),
    #[error("wire protocol error: {0}")]
    ProxyLink(#[from] proxy_link::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
