// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! `PciAddress`: the bus/device/function triple this workspace's control surface keys devices
//! by, without the PCIe ECAM/segment machinery a full bus-address type would carry.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PciAddress {
    pub bus: u8,
    pub dev: u8,
    pub func: u8,
}

impl PciAddress {
    pub fn new(bus: u8, dev: u8, func: u8) -> PciAddress {
        PciAddress { bus, dev, func }
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.dev, self.func)
    }
}
