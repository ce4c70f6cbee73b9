// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Exercises [`run_dispatch_loop`] end-to-end over a real socketpair, standing in for the host
//! process on one end and a worker-hosted device on the other: the worker exits gracefully when
//! the host closes its end of the channel.

use std::os::unix::net::UnixStream;
use std::thread;

use base::SafeDescriptor;
use proxy_link::Channel;
use proxy_link::SyncSysmem;
use remote_worker::run_dispatch_loop;
use remote_worker::RemoteDevice;

struct NullDevice;

impl RemoteDevice for NullDevice {
    fn read_config(&mut self, _addr: u32, _len: u32) -> u32 {
        0
    }

    fn write_config(&mut self, _addr: u32, _val: u32, _len: u32) {}

    fn read_bar(&mut self, _addr: u64, _size: u32, _memory: bool) -> u64 {
        0
    }

    fn write_bar(&mut self, _addr: u64, _val: u64, _size: u32, _memory: bool) {}

    fn reset(&mut self) {}

    fn pci_info(&mut self) -> u64 {
        0
    }

    fn sync_sysmem(&mut self, _sysmem: SyncSysmem, _fds: Vec<SafeDescriptor>) {}

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

#[test]
fn dispatch_loop_exits_cleanly_when_host_closes_channel() {
    let (host, worker) = UnixStream::pair().unwrap();

    let worker_thread = thread::spawn(move || {
        let channel = Channel::new(worker);
        let mut device = NullDevice;
        run_dispatch_loop(&channel, &mut device)
    });

    drop(host);

    let result = worker_thread.join().unwrap();
    assert!(result.is_ok());
}
