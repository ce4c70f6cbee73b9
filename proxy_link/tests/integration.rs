// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Socket-pair-level tests exercising two real threads as stand-ins for the host and worker
//! processes.

use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::thread;
use std::time::Duration;

use base::AsRawDescriptor;
use base::Event;
use base::SafeDescriptor;
use proxy_link::Channel;
use proxy_link::Command;
use proxy_link::Data1;
use proxy_link::IrqFd;
use proxy_link::Message;
use proxy_link::PollEvents;

#[test]
fn fd_passing_set_irqfd() {
    let (host, worker) = UnixStream::pair().unwrap();
    let host = Channel::new(host);
    let worker = Channel::new(worker);

    let irq_event = Event::new().unwrap();
    let irq_fd_for_msg = irq_event.try_clone().unwrap();

    let msg = Message::new(Command::SetIrqfd, Data1::IrqFd(IrqFd { intx: 0 }))
        .with_ticket(SafeDescriptor::from(irq_fd_for_msg));
    host.send(&msg).unwrap();

    let got = worker.recv().unwrap();
    assert_eq!(got.cmd, Command::SetIrqfd);
    assert_eq!(got.fds.len(), 1);

    // The worker writes to the fd it received to raise an interrupt; bypasses the command
    // socket entirely from here on.
    let received_irqfd = Event::from(got.fds.into_iter().next().unwrap());
    received_irqfd.write(1).unwrap();

    assert!(irq_event.wait_readable(Duration::from_millis(200)).unwrap());
    assert_eq!(irq_event.read().unwrap(), 1);
}

#[test]
fn worker_exit_surfaces_as_hangup_on_host() {
    let (host, worker) = UnixStream::pair().unwrap();
    let host = Channel::new(host);

    let handle = thread::spawn(move || {
        // Stand-in for the worker process exiting: drop its end of the socket.
        drop(worker);
    });
    handle.join().unwrap();

    let events = host.wait_ready(Some(Duration::from_secs(1))).unwrap();
    assert!(events.contains(PollEvents::HANGUP) || events.contains(PollEvents::READABLE));
}

#[test]
fn channel_raw_descriptor_is_pollable() {
    let (a, _b) = UnixStream::pair().unwrap();
    let fd = a.as_raw_fd();
    let channel = Channel::new(a);
    assert_eq!(channel.as_raw_descriptor(), fd);
}
