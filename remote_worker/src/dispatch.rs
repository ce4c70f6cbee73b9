// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The worker's dispatch loop. One iteration reads exactly one [`Message`] and routes it to a
//! [`RemoteDevice`] by [`Command`]; a malformed message is logged and dropped without tearing
//! down the channel, while a transport-level error or hangup ends the loop.

use proxy_link::notify;
use proxy_link::BarAccess;
use proxy_link::Channel;
use proxy_link::Command;
use proxy_link::ConfAccess;
use proxy_link::Data1;
use proxy_link::Error;
use proxy_link::IrqFd;
use proxy_link::PollEvents;
use proxy_link::Result;
use proxy_link::PCI_CFG_SPACE_EXP_SIZE;
use proxy_link::SENTINEL;

use crate::device::RemoteDevice;

/// Runs the dispatch loop until the channel hangs up or hits a transport error. Returns `Ok(())`
/// on a clean peer-initiated shutdown; any other termination is an `Err`.
pub fn run_dispatch_loop(channel: &Channel, device: &mut dyn RemoteDevice) -> Result<()> {
    loop {
        let events = channel.wait_ready(None)?;
        if events.contains(PollEvents::ERROR) {
            log::error!("command channel reported an error condition");
            return Err(Error::Disconnect);
        }
        if events.contains(PollEvents::HANGUP) && !events.contains(PollEvents::READABLE) {
            log::info!("host closed the command channel, shutting down");
            return Ok(());
        }

        let msg = match channel.recv() {
            Ok(msg) => msg,
            Err(Error::Disconnect) => {
                log::info!("host closed the command channel, shutting down");
                return Ok(());
            }
            Err(err @ (Error::InvalidCommand(_)
            | Error::InvalidFdCount(_)
            | Error::InvalidSize(_)
            | Error::WrongFdCount(..))) => {
                // A malformed message does not get a command to dispatch on, so there is nothing
                // to reply to; log it and keep serving the channel, matching process_msg's
                // "Unknown command" handling rather than tearing the worker down.
                log::warn!("dropping malformed message: {}", err);
                continue;
            }
            Err(err) => return Err(err),
        };

        dispatch_one(device, msg)?;
    }
}

fn dispatch_one(device: &mut dyn RemoteDevice, msg: proxy_link::Message) -> Result<()> {
    match msg.cmd {
        Command::Init => {
            // No-op: nothing to initialize on this side of the channel.
        }
        Command::ConfRead => {
            let ticket = ticket_of(msg.cmd, msg.fds)?;
            let access = conf_access_of(msg.data1)?;
            let val = if out_of_range(access.addr, access.len) {
                SENTINEL
            } else {
                device.read_config(access.addr, access.len) as u64
            };
            notify(ticket, val)?;
        }
        Command::ConfWrite => {
            let access = conf_access_of(msg.data1)?;
            if !out_of_range(access.addr, access.len) {
                device.write_config(access.addr, access.val, access.len);
            }
        }
        Command::BarRead => {
            let ticket = ticket_of(msg.cmd, msg.fds)?;
            let access = bar_access_of(msg.data1)?;
            let val = device.read_bar(access.addr, access.size, access.memory);
            notify(ticket, val)?;
        }
        Command::BarWrite => {
            let access = bar_access_of(msg.data1)?;
            device.write_bar(access.addr, access.val, access.size, access.memory);
        }
        Command::SyncSysmem => {
            if let Data1::SyncSysmem(sysmem) = msg.data1 {
                device.sync_sysmem(sysmem, msg.fds);
            }
        }
        Command::SetIrqfd => {
            let mut fds = msg.fds;
            let irqfd = fds
                .pop()
                .ok_or(Error::WrongFdCount(Command::SetIrqfd, 1, 0))?;
            if let Data1::IrqFd(IrqFd { intx }) = msg.data1 {
                device.set_irqfd(intx, irqfd);
            }
        }
        Command::GetPciInfo => {
            let ticket = ticket_of(msg.cmd, msg.fds)?;
            notify(ticket, device.pci_info())?;
        }
        Command::DeviceReset => {
            device.reset();
        }
        Command::DeviceAdd | Command::DeviceDel | Command::DriveAdd | Command::ConnectDev => {
            let ticket = ticket_of(msg.cmd, msg.fds)?;
            let opts = String::from_utf8_lossy(&msg.data2).into_owned();
            let ok = match msg.cmd {
                Command::DeviceAdd => device.device_add(&opts),
                Command::DeviceDel => device.device_del(&opts),
                Command::DriveAdd => device.drive_add(&opts),
                Command::ConnectDev => device.connect_dev(&opts),
                _ => unreachable!(),
            };
            notify(ticket, ok as u64)?;
        }
        Command::RetMsg => {
            log::warn!("unexpected RET_MSG received by worker, dropping");
        }
    }
    Ok(())
}

fn ticket_of(cmd: Command, mut fds: Vec<base::SafeDescriptor>) -> Result<base::SafeDescriptor> {
    fds.pop().ok_or(Error::WrongFdCount(cmd, 1, 0))
}

/// Whether the `[addr, addr + len)` access window extends past config space, including the case
/// where `addr + len` itself overflows `u32`.
fn out_of_range(addr: u32, len: u32) -> bool {
    match addr.checked_add(len) {
        Some(end) => end > PCI_CFG_SPACE_EXP_SIZE,
        None => true,
    }
}

fn conf_access_of(data1: Data1) -> Result<ConfAccess> {
    match data1 {
        Data1::ConfAccess(c) => Ok(c),
        _ => Err(Error::InvalidSize(0)),
    }
}

fn bar_access_of(data1: Data1) -> Result<BarAccess> {
    match data1 {
        Data1::BarAccess(b) => Ok(b),
        _ => Err(Error::InvalidSize(0)),
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;

    use base::SafeDescriptor;
    use proxy_link::send_and_wait;
    use proxy_link::Message;

    use super::*;

    /// An in-memory stand-in used only by these tests.
    struct FakeDevice {
        config: [u8; 256],
        bar: std::collections::HashMap<u64, u64>,
        reset_count: u32,
    }

    impl FakeDevice {
        fn new() -> FakeDevice {
            FakeDevice {
                config: [0u8; 256],
                bar: std::collections::HashMap::new(),
                reset_count: 0,
            }
        }
    }

    impl RemoteDevice for FakeDevice {
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
        }

        fn pci_info(&mut self) -> u64 {
            0xcafe
        }

        fn sync_sysmem(&mut self, _sysmem: proxy_link::SyncSysmem, _fds: Vec<SafeDescriptor>) {}

        fn set_irqfd(&mut self, _intx: i32, _irqfd: SafeDescriptor) {}

        fn device_add(&mut self, _opts: &str) -> bool {
            true
        }

        fn device_del(&mut self, _opts: &str) -> bool {
            true
        }

        fn drive_add(&mut self, _opts: &str) -> bool {
            true
        }
    }

    fn run_worker_once(worker: Channel, device: &mut dyn RemoteDevice) {
        let msg = worker.recv().unwrap();
        dispatch_one(device, msg).unwrap();
    }

    #[test]
    fn config_write_then_read_round_trips() {
        let (host, worker) = UnixStream::pair().unwrap();
        let host = Channel::new(host);
        let worker = Channel::new(worker);
        let mut device = FakeDevice::new();

        let write = Message::new(
            Command::ConfWrite,
            Data1::ConfAccess(ConfAccess {
                addr: 0x10,
                val: 0xdead_beef,
                len: 4,
            }),
        );
        host.send(&write).unwrap();
        run_worker_once(worker, &mut device);
        assert_eq!(device.read_config(0x10, 4), 0xdead_beef);
    }

    #[test]
    fn config_read_out_of_range_yields_sentinel_without_touching_device() {
        let (host, worker) = UnixStream::pair().unwrap();
        let host = Channel::new(host);
        let worker_clone_thread_device = std::thread::spawn(move || {
            let worker = Channel::new(worker);
            let mut device = FakeDevice::new();
            run_worker_once(worker, &mut device);
            device.reset_count
        });

        let read = Message::new(
            Command::ConfRead,
            Data1::ConfAccess(ConfAccess {
                addr: PCI_CFG_SPACE_EXP_SIZE,
                val: 0,
                len: 4,
            }),
        );
        let reply = send_and_wait(&host, read).unwrap();
        assert_eq!(reply, SENTINEL);
        worker_clone_thread_device.join().unwrap();
    }

    #[test]
    fn config_read_overlapping_the_boundary_yields_sentinel_without_panicking() {
        let (host, worker) = UnixStream::pair().unwrap();
        let host = Channel::new(host);
        let worker_thread = std::thread::spawn(move || {
            let worker = Channel::new(worker);
            let mut device = FakeDevice::new();
            run_worker_once(worker, &mut device);
        });

        // addr is in range on its own, but addr + len reaches past PCI_CFG_SPACE_EXP_SIZE; this
        // must not reach FakeDevice::read_config, which would index past its backing array.
        let read = Message::new(
            Command::ConfRead,
            Data1::ConfAccess(ConfAccess {
                addr: PCI_CFG_SPACE_EXP_SIZE - 2,
                val: 0,
                len: 4,
            }),
        );
        let reply = send_and_wait(&host, read).unwrap();
        assert_eq!(reply, SENTINEL);
        worker_thread.join().unwrap();
    }

    #[test]
    fn config_write_overlapping_the_boundary_is_dropped() {
        let (host, worker) = UnixStream::pair().unwrap();
        let host = Channel::new(host);
        let worker_thread = std::thread::spawn(move || {
            let worker = Channel::new(worker);
            let mut device = FakeDevice::new();
            run_worker_once(worker, &mut device);
            device
        });

        let write = Message::new(
            Command::ConfWrite,
            Data1::ConfAccess(ConfAccess {
                addr: PCI_CFG_SPACE_EXP_SIZE - 2,
                val: 0xdead_beef,
                len: 4,
            }),
        );
        host.send(&write).unwrap();
        worker_thread.join().unwrap();
    }

    #[test]
    fn bar_write_then_read_same_offset() {
        let (host, worker) = UnixStream::pair().unwrap();
        let host = Channel::new(host);
        let device = std::sync::Arc::new(std::sync::Mutex::new(FakeDevice::new()));

        let worker_thread = {
            let device = device.clone();
            std::thread::spawn(move || {
                let worker = Channel::new(worker);
                let write = worker.recv().unwrap();
                dispatch_one(&mut *device.lock().unwrap(), write).unwrap();
                let read = worker.recv().unwrap();
                dispatch_one(&mut *device.lock().unwrap(), read).unwrap();
            })
        };

        let write = Message::new(
            Command::BarWrite,
            Data1::BarAccess(BarAccess {
                addr: 0x1000,
                val: 0x42,
                size: 4,
                memory: true,
            }),
        );
        host.send(&write).unwrap();

        let read = Message::new(
            Command::BarRead,
            Data1::BarAccess(BarAccess {
                addr: 0x1000,
                val: 0,
                size: 4,
                memory: true,
            }),
        );
        let reply = send_and_wait(&host, read).unwrap();
        assert_eq!(reply, 0x42);
        worker_thread.join().unwrap();
    }

    #[test]
    fn device_reset_has_no_reply() {
        let (host, worker) = UnixStream::pair().unwrap();
        let host = Channel::new(host);
        let worker = Channel::new(worker);
        let mut device = FakeDevice::new();

        host.send(&Message::new(Command::DeviceReset, Data1::None))
            .unwrap();
        run_worker_once(worker, &mut device);
        assert_eq!(device.reset_count, 1);
    }

    #[test]
    fn device_add_replies_with_status_over_ticket() {
        let (host, worker) = UnixStream::pair().unwrap();
        let host = Channel::new(host);
        let worker_thread = std::thread::spawn(move || {
            let worker = Channel::new(worker);
            let mut device = FakeDevice::new();
            run_worker_once(worker, &mut device);
        });

        let add = Message::with_bytestream(Command::DeviceAdd, br#"{"id":"net0"}"#.to_vec());
        let reply = send_and_wait(&host, add).unwrap();
        assert_eq!(reply, 1);
        worker_thread.join().unwrap();
    }
}
