// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A minimal `RemoteDevice`: a config-space and BAR-region store that echoes back whatever was
//! last written, with no real hardware backing it. This is the default `--command` target for
//! `rdevice-host rdevice-add` and the worker end of `devices::proxy`'s and `remote_worker`'s
//! integration tests against a real forked process: parse nothing beyond what's needed to stand
//! up the dispatch loop, then block in it for the rest of the process's life.

use std::collections::HashMap;

use base::SafeDescriptor;
use proxy_link::SyncSysmem;
use remote_worker::worker_main;
use remote_worker::RemoteDevice;

const CONFIG_SPACE_SIZE: usize = 4096;

struct EchoDevice {
    config: Vec<u8>,
    bar: HashMap<u64, u64>,
    reset_count: u32,
}

impl EchoDevice {
    fn new() -> EchoDevice {
        EchoDevice {
            config: vec![0u8; CONFIG_SPACE_SIZE],
            bar: HashMap::new(),
            reset_count: 0,
        }
    }
}

impl RemoteDevice for EchoDevice {
    fn read_config(&mut self, addr: u32, len: u32) -> u32 {
        let mut val = 0u32;
        for i in 0..len.min(4) {
            val |= (self.config[addr as usize + i as usize] as u32) << (8 * i);
        }
        val
    }

    fn write_config(&mut self, addr: u32, val: u32, len: u32) {
        for i in 0..len.min(4) {
            self.config[addr as usize + i as usize] = (val >> (8 * i)) as u8;
        }
    }

    fn read_bar(&mut self, addr: u64, _size: u32, _memory: bool) -> u64 {
        *self.bar.get(&addr).unwrap_or(&0)
    }

    fn write_bar(&mut self, addr: u64, val: u64, _size: u32, _memory: bool) {
        self.bar.insert(addr, val);
    }

    fn reset(&mut self) {
        self.reset_count += 1;
        self.bar.clear();
        log::info!("device reset (reset #{})", self.reset_count);
    }

    fn pci_info(&mut self) -> u64 {
        0
    }

    fn sync_sysmem(&mut self, _sysmem: SyncSysmem, fds: Vec<SafeDescriptor>) {
        log::info!("SYNC_SYSMEM: {} region(s) ignored by the echo device", fds.len());
    }

    fn set_irqfd(&mut self, intx: i32, _irqfd: SafeDescriptor) {
        log::info!("SET_IRQFD intx={}", intx);
    }

    fn device_add(&mut self, opts: &str) -> bool {
        log::info!("DEVICE_ADD: {}", opts);
        true
    }

    fn device_del(&mut self, opts: &str) -> bool {
        log::info!("DEVICE_DEL: {}", opts);
        true
    }

    fn drive_add(&mut self, opts: &str) -> bool {
        log::info!("DRIVE_ADD: {}", opts);
        true
    }
}

fn main() {
    base::init_logging();
    let mut device = EchoDevice::new();
    if let Err(e) = worker_main(&mut device) {
        log::error!("worker exiting: {}", e);
        std::process::exit(1);
    }
}
