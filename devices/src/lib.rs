// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Host-side halves of the multi-process device IPC core: the proxy device shim that traps PCI
//! config/BAR accesses and forwards them over a [`proxy_link::Channel`] (C5, [`proxy`]), and the
//! worker lifecycle that forks and execs the worker process on the other end of that channel
//! (C6, [`worker`]).

pub mod bus;
pub mod error;
pub mod ids;
pub mod pci_address;
pub mod proxy;
pub mod worker;

pub use bus::BusAccessInfo;
pub use bus::BusDevice;
pub use bus::BusRange;
pub use error::Error;
pub use error::Result;
pub use ids::CrosvmDeviceId;
pub use ids::DeviceId;
pub use ids::PciId;
pub use pci_address::PciAddress;
pub use proxy::BarRegion;
pub use proxy::ProxyDevice;
pub use proxy::NUM_BAR_REGIONS;
pub use worker::start_worker;
pub use worker::stop_worker;
pub use worker::WorkerHandle;
