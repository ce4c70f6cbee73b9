// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Control surface for the multi-process device IPC core (C7).
//!
//! The registry in [`remote`] is synchronous, meaning that each [`remote::RemoteCommand`] run
//! against a [`remote::DeviceRegistry`] gets exactly one [`remote::RemoteResponse`] back, the same
//! convention this crate's `VmRequest`/`VmResponse` pair used for whole-VM control.

mod error;
pub mod remote;

pub use error::Error;
pub use error::Result;
pub use remote::DeviceRegistry;
pub use remote::RemoteCommand;
pub use remote::RemoteProcInfo;
pub use remote::RemoteResponse;
