// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Proxy device shim: masquerades as the device to the hypervisor, translating PCI config-space
//! and BAR accesses into `proxy_link` messages and forwarding them to whatever worker process
//! `devices::worker::start_worker` launched. Config reads and BAR reads block the calling thread
//! on the reply ticket; writes are fire-and-forget.

use log::error;
use log::info;
use log::warn;
use proxy_link::send_and_wait;
use proxy_link::BarAccess;
use proxy_link::Command;
use proxy_link::ConfAccess;
use proxy_link::Data1;
use proxy_link::IrqFd;
use proxy_link::Message;
use proxy_link::PCI_CFG_SPACE_EXP_SIZE;
use proxy_link::SENTINEL;

use base::AsRawDescriptor;
use base::SafeDescriptor;

use crate::bus::BusAccessInfo;
use crate::bus::BusDevice;
use crate::bus::BusRange;
use crate::error::Error;
use crate::error::Result;
use crate::ids::CrosvmDeviceId;
use crate::ids::DeviceId;
use crate::worker::start_worker;
use crate::worker::WorkerHandle;

/// Number of PCI BAR slots a device may register.
pub const NUM_BAR_REGIONS: usize = 6;

/// One BAR window this device responds on: its address range plus whether it is a memory (`true`)
/// or I/O (`false`) region, forwarded as `BarAccess::memory`.
#[derive(Debug, Clone, Copy)]
pub struct BarRegion {
    pub range: BusRange,
    pub memory: bool,
}

/// Host-side shim for a single PCI device emulated by a worker process. Owns the `proxy_link`
/// channel and the worker's pid exclusively; dropping it stops the worker.
pub struct ProxyDevice {
    channel: proxy_link::Channel,
    worker: Option<WorkerHandle>,
    debug_label: String,
    /// Local shadow of PCI config space, updated on every config write so callers that only need
    /// a cached read (e.g. capability-walking code in the host bus layer) don't pay a round trip.
    shadow: Vec<u8>,
    bar_regions: [Option<BarRegion>; NUM_BAR_REGIONS],
}

impl ProxyDevice {
    /// Forks and execs `command`, wiring up a fresh `proxy_link::Channel` to it. `command`
    /// should be a worker binary built on `remote_worker::worker_main`.
    pub fn new(command: &str, debug_label: impl Into<String>) -> Result<ProxyDevice> {
        let (channel, worker) = start_worker(command)?;
        Ok(ProxyDevice {
            channel,
            worker: Some(worker),
            debug_label: debug_label.into(),
            shadow: vec![0u8; PCI_CFG_SPACE_EXP_SIZE as usize],
            bar_regions: [None; NUM_BAR_REGIONS],
        })
    }

    /// Registers BAR slot `index` so later `read`/`write` calls against `BusAccessInfo { id:
    /// index, .. }` clamp their access size to the region's `min_access_size`/`max_access_size`
    /// and tag the message as memory- or I/O-mapped.
    pub fn register_bar(&mut self, index: usize, region: BarRegion) {
        self.bar_regions[index] = Some(region);
    }

    pub fn pid(&self) -> base::Pid {
        self.worker.as_ref().map(WorkerHandle::pid).unwrap_or(-1)
    }

    /// The underlying channel, for callers (e.g. `vm_control`'s control surface) that need to
    /// send commands this trait doesn't cover, such as `DRIVE_ADD`/`DEVICE_DEL`.
    pub fn channel(&self) -> &proxy_link::Channel {
        &self.channel
    }

    /// Sends `SET_IRQFD` with the eventfd the worker should write to in order to raise `intx`.
    /// Called once at realize time; after this, interrupt delivery bypasses the command socket
    /// entirely.
    pub fn set_irqfd(&self, intx: i32, irqfd: SafeDescriptor) -> Result<()> {
        let msg = Message::new(Command::SetIrqfd, Data1::IrqFd(IrqFd { intx }))
            .with_ticket(irqfd);
        self.channel.send(&msg).map_err(Error::ProxyLink)
    }

    fn clamped_size(&self, bar_index: usize, size: u32) -> u32 {
        match self.bar_regions.get(bar_index).and_then(Option::as_ref) {
            Some(region) => size.clamp(region.range.min_access_size, region.range.max_access_size),
            None => size,
        }
    }

    fn is_memory(&self, bar_index: usize) -> bool {
        self.bar_regions
            .get(bar_index)
            .and_then(Option::as_ref)
            .map(|r| r.memory)
            .unwrap_or(true)
    }

    fn write_shadow(&mut self, addr: u32, val: u32, len: u32) {
        let addr = addr as usize;
        if addr + len as usize > self.shadow.len() {
            return;
        }
        for i in 0..len as usize {
            self.shadow[addr + i] = (val >> (8 * i)) as u8;
        }
    }

    /// Reads the local config-space shadow without a round trip to the worker; used by
    /// capability-walking code that doesn't need to hit the socket.
    pub fn cached_config_read(&self, addr: u32, len: u32) -> u32 {
        let addr = addr as usize;
        let mut val = 0u32;
        for i in 0..(len as usize).min(4) {
            if let Some(byte) = self.shadow.get(addr + i) {
                val |= (*byte as u32) << (8 * i);
            }
        }
        val
    }
}

impl BusDevice for ProxyDevice {
    fn device_id(&self) -> DeviceId {
        CrosvmDeviceId::ProxyDevice.into()
    }

    fn debug_label(&self) -> String {
        self.debug_label.clone()
    }

    /// `CONF_WRITE`: updates the local shadow, then forwards fire-and-forget.
    fn config_register_write(&mut self, reg_idx: usize, offset: u64, data: &[u8]) {
        let addr = reg_idx as u32 + offset as u32;
        let len = data.len() as u32;
        let mut val = 0u32;
        for (i, byte) in data.iter().enumerate().take(4) {
            val |= (*byte as u32) << (8 * i);
        }

        if addr < PCI_CFG_SPACE_EXP_SIZE {
            self.write_shadow(addr, val, len);
        }

        let msg = Message::new(Command::ConfWrite, Data1::ConfAccess(ConfAccess { addr, val, len }));
        if let Err(e) = self.channel.send(&msg) {
            error!("{}: failed to send CONF_WRITE: {}", self.debug_label, e);
        }
    }

    /// `CONF_READ`: blocks on the reply ticket for up to 1s; addresses at or beyond
    /// `PCI_CFG_SPACE_EXP_SIZE` are rejected locally without bothering the worker, matching the
    /// worker's own out-of-range clamp.
    fn config_register_read(&self, reg_idx: usize) -> u32 {
        let addr = reg_idx as u32;
        if addr >= PCI_CFG_SPACE_EXP_SIZE {
            return 0;
        }
        let msg = Message::new(
            Command::ConfRead,
            Data1::ConfAccess(ConfAccess { addr, val: 0, len: 4 }),
        );
        match send_and_wait(&self.channel, msg) {
            Ok(SENTINEL) => {
                warn!("{}: CONF_READ at {:#x} returned the error sentinel", self.debug_label, addr);
                0
            }
            Ok(v) => v as u32,
            Err(e) => {
                error!("{}: CONF_READ failed: {}", self.debug_label, e);
                0
            }
        }
    }

    /// `BAR_READ`: synchronous, addressed by `info.id` into the registered BAR slot.
    fn read(&mut self, info: BusAccessInfo, data: &mut [u8]) {
        let size = self.clamped_size(info.id, data.len() as u32);
        let memory = self.is_memory(info.id);
        let msg = Message::new(
            Command::BarRead,
            Data1::BarAccess(BarAccess {
                addr: info.absolute_addr(),
                val: 0,
                size,
                memory,
            }),
        );
        let val = match send_and_wait(&self.channel, msg) {
            Ok(v) => v,
            Err(e) => {
                error!("{}: BAR_READ failed: {}", self.debug_label, e);
                0
            }
        };
        let len = data.len();
        data.copy_from_slice(&val.to_ne_bytes()[..len]);
    }

    /// `BAR_WRITE`, fire-and-forget.
    fn write(&mut self, info: BusAccessInfo, data: &[u8]) {
        let mut val = 0u64;
        for (i, byte) in data.iter().enumerate().take(8) {
            val |= (*byte as u64) << (8 * i);
        }
        let size = self.clamped_size(info.id, data.len() as u32);
        let memory = self.is_memory(info.id);
        let msg = Message::new(
            Command::BarWrite,
            Data1::BarAccess(BarAccess {
                addr: info.absolute_addr(),
                val,
                size,
                memory,
            }),
        );
        if let Err(e) = self.channel.send(&msg) {
            error!("{}: failed to send BAR_WRITE: {}", self.debug_label, e);
        }
    }
}

impl Drop for ProxyDevice {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let pid = worker.pid();
            // Drop can't move `self.channel` out to hand to `stop_worker`, so raise HUP on the
            // worker's end directly: shutting down our end has the same effect as closing it.
            // SAFETY: self.channel owns a valid, connected socket until this struct is dropped.
            unsafe {
                libc::shutdown(self.channel.as_raw_descriptor(), libc::SHUT_RDWR);
            }
            match worker.wait() {
                Ok(code) => info!("{}: worker pid {} exited with {}", self.debug_label, pid, code),
                Err(e) => error!("{}: failed to reap worker pid {}: {}", self.debug_label, pid, e),
            }
        }
    }
}
