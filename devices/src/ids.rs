// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Device identity vocabulary used for `debug_label`/logging context: the two variants this
//! workspace still has a caller for.

use std::fmt;

/// A real PCI device's identity (bus/device pair), as assigned by the guest firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciId {
    bus: u8,
    dev: u8,
}

impl PciId {
    pub fn new(bus: u8, dev: u8) -> PciId {
        PciId { bus, dev }
    }
}

impl fmt::Display for PciId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}", self.bus, self.dev)
    }
}

/// Identity for devices internal to this workspace rather than a guest-visible PCI function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrosvmDeviceId {
    ProxyDevice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceId {
    PciId(PciId),
    CrosvmDeviceId(CrosvmDeviceId),
}

impl From<PciId> for DeviceId {
    fn from(id: PciId) -> DeviceId {
        DeviceId::PciId(id)
    }
}

impl From<CrosvmDeviceId> for DeviceId {
    fn from(id: CrosvmDeviceId) -> DeviceId {
        DeviceId::CrosvmDeviceId(id)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::PciId(id) => write!(f, "{}", id),
            DeviceId::CrosvmDeviceId(CrosvmDeviceId::ProxyDevice) => write!(f, "proxy"),
        }
    }
}
