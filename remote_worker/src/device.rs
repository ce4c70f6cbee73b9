// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The capability interface a worker's dispatch loop invokes: one trait object injected at
//! construction, rather than a class hierarchy of device kinds.

use base::SafeDescriptor;
use proxy_link::SyncSysmem;

/// One device model hosted by a worker process for the process's entire lifetime: the worker
/// hosts exactly one device, and its lifetime equals the process's lifetime.
pub trait RemoteDevice: Send {
    /// `CONF_READ`. `addr` is the PCI config-space byte offset, already clamped against
    /// `PCI_CFG_SPACE_EXP_SIZE` by the dispatch loop before this is called.
    fn read_config(&mut self, addr: u32, len: u32) -> u32;

    /// `CONF_WRITE`, fire-and-forget.
    fn write_config(&mut self, addr: u32, val: u32, len: u32);

    /// `BAR_READ`. `addr` is the absolute guest address (`region_base + offset`).
    fn read_bar(&mut self, addr: u64, size: u32, memory: bool) -> u64;

    /// `BAR_WRITE`, fire-and-forget.
    fn write_bar(&mut self, addr: u64, val: u64, size: u32, memory: bool);

    /// `DEVICE_RESET`.
    fn reset(&mut self);

    /// `GET_PCI_INFO`. Encoding of the returned info is device-specific; this core only
    /// transports the resulting scalar back over the ticket.
    fn pci_info(&mut self) -> u64;

    /// `SYNC_SYSMEM`. Binding `fds` as guest RAM backed by the regions described in `sysmem` is
    /// left to the concrete device; this core only delivers the fds and the gpa/size/offset
    /// arrays.
    fn sync_sysmem(&mut self, sysmem: SyncSysmem, fds: Vec<SafeDescriptor>);

    /// `SET_IRQFD`. After this call, interrupt delivery for `intx` bypasses the command socket
    /// entirely: the device writes directly to `irqfd` to raise the interrupt.
    fn set_irqfd(&mut self, intx: i32, irqfd: SafeDescriptor);

    /// `DEVICE_ADD`. `opts` is the JSON-encoded option dictionary from the control surface.
    /// Returns whether the operation succeeded.
    fn device_add(&mut self, opts: &str) -> bool;

    /// `DEVICE_DEL`.
    fn device_del(&mut self, opts: &str) -> bool;

    /// `DRIVE_ADD`.
    fn drive_add(&mut self, opts: &str) -> bool;

    /// `CONNECT_DEV`. `device_id` is the id string from the payload. Returns whether this
    /// worker accepts being associated with that id.
    fn connect_dev(&mut self, device_id: &str) -> bool {
        let _ = device_id;
        true
    }
}
