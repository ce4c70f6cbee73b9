// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The multi-process device IPC core's wire layer: message framing plus ancillary fd transfer
//! (C1, [`message`]), a locked duplex channel over it (C2, [`channel`]), and a synchronous
//! request/reply rendezvous built on top using an eventfd ticket (C3, [`ticket`]). Everything
//! else in this workspace — the worker's dispatch loop, the host's proxy device shim, the
//! control surface — is built on these three pieces and never talks to the socket directly.

mod channel;
mod error;
mod message;
mod ticket;

pub use channel::Channel;
pub use channel::PollEvents;
pub use error::Error;
pub use error::Result;
pub use message::BarAccess;
pub use message::Command;
pub use message::ConfAccess;
pub use message::Data1;
pub use message::IrqFd;
pub use message::Message;
pub use message::SyncSysmem;
pub use message::MAX_BYTESTREAM;
pub use message::MAX_FDS;
pub use message::PCI_CFG_SPACE_EXP_SIZE;
pub use message::SENTINEL;
pub use ticket::notify;
pub use ticket::send_and_wait;
pub use ticket::REPLY_TIMEOUT;
