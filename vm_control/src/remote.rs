// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Control surface: a registry of proxy devices this host process owns, plus the synchronous
//! request/response API the `rdevice-host` CLI drives: add a device (forking its worker),
//! remove one, forward a drive-add request to an already-running worker, and list what's
//! currently registered.
//!
//! `rdevice-add` here forks a brand new worker process rather than forwarding a message to one
//! already running: this workspace's worker hosts exactly one `RemoteDevice` for its whole
//! lifetime, so "adding a remote device" and "starting its worker" are the same event. The
//! wire-level `DEVICE_ADD` command stays reserved for hot-adding a device inside an
//! already-running worker, which this registry never does.

use std::collections::BTreeMap;
use std::fmt;

use log::info;
use proxy_link::send_and_wait;
use proxy_link::Command;
use proxy_link::Message;
use proxy_link::PollEvents;
use proxy_link::SENTINEL;

use crate::error::Error;
use crate::error::Result;

struct ProxyHandle {
    device: devices::ProxyDevice,
    id: String,
    command: String,
}

/// Every proxy device this host process currently owns, keyed by `rdev_id`. Dropping an entry
/// (via [`DeviceRegistry::execute`]'s `DeviceDel` path, or the registry itself going away) stops
/// its worker through `ProxyDevice`'s `Drop` impl.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, ProxyHandle>,
}

/// One request into the registry, one per `rdevice-host` subcommand.
#[derive(Debug, Clone)]
pub enum RemoteCommand {
    /// Forks `command` and registers the resulting worker under `rdev_id`; `id` is the
    /// guest-facing device id reported back by `QueryRemote`.
    DeviceAdd {
        rdev_id: String,
        id: String,
        command: String,
    },
    /// Stops and reaps the worker registered under `rdev_id`.
    DeviceDel { rdev_id: String },
    /// Forwards a `DRIVE_ADD` bytestream message to the worker already registered under
    /// `rdev_id`, in the form `"{opts},id={id}"`.
    DriveAdd {
        rdev_id: String,
        id: String,
        opts: String,
    },
    /// Lists every device currently registered.
    QueryRemote,
}

/// One entry of a `QueryRemote` listing.
#[derive(Debug, Clone)]
pub struct RemoteProcInfo {
    pub pid: base::Pid,
    pub rdev_id: String,
    pub id: String,
    pub command: String,
}

/// Indication of success or failure of a [`RemoteCommand`]: every request gets exactly one
/// response, never a bare `Result` the CLI has to pattern-match twice.
#[derive(Debug, Clone)]
pub enum RemoteResponse {
    Ok,
    Remotes(Vec<RemoteProcInfo>),
    Err(String),
}

impl fmt::Display for RemoteResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteResponse::Ok => write!(f, "ok"),
            RemoteResponse::Err(e) => write!(f, "error: {}", e),
            RemoteResponse::Remotes(remotes) => {
                writeln!(f, "{:<8}\t{:<16}\t{:<16}\t{:<16}", "PID", "RID", "ID", "COMMAND")?;
                for r in remotes {
                    writeln!(f, "{:<8}\t{:<16}\t{:<16}\t{:<16}", r.pid, r.rdev_id, r.id, r.command)?;
                }
                Ok(())
            }
        }
    }
}

impl DeviceRegistry {
    pub fn new() -> DeviceRegistry {
        DeviceRegistry::default()
    }

    /// Executes `cmd` and encapsulates the outcome as a [`RemoteResponse`] rather than bubbling
    /// a bare error up to the caller.
    pub fn execute(&mut self, cmd: RemoteCommand) -> RemoteResponse {
        match self.try_execute(cmd) {
            Ok(response) => response,
            Err(e) => RemoteResponse::Err(e.to_string()),
        }
    }

    fn try_execute(&mut self, cmd: RemoteCommand) -> Result<RemoteResponse> {
        match cmd {
            RemoteCommand::DeviceAdd { rdev_id, id, command } => self.device_add(rdev_id, id, command),
            RemoteCommand::DeviceDel { rdev_id } => self.device_del(&rdev_id),
            RemoteCommand::DriveAdd { rdev_id, id, opts } => self.drive_add(&rdev_id, id, opts),
            RemoteCommand::QueryRemote => Ok(self.query_remote()),
        }
    }

    fn device_add(&mut self, rdev_id: String, id: String, command: String) -> Result<RemoteResponse> {
        if self.devices.contains_key(&rdev_id) {
            return Err(Error::AlreadyExists(rdev_id));
        }
        let device = devices::ProxyDevice::new(&command, format!("proxy:{}", id))?;
        info!(
            "rdevice-add: started {} (pid {}) as rdev_id {:?}",
            command,
            device.pid(),
            rdev_id
        );
        self.devices.insert(rdev_id, ProxyHandle { device, id, command });
        Ok(RemoteResponse::Ok)
    }

    fn device_del(&mut self, rdev_id: &str) -> Result<RemoteResponse> {
        let handle = self
            .devices
            .remove(rdev_id)
            .ok_or_else(|| Error::NotFound(rdev_id.to_owned()))?;
        // Best-effort notification; the worker is stopped either way once `handle` drops below.
        let msg = Message::with_bytestream(Command::DeviceDel, Vec::new());
        let _ = send_and_wait(handle.device.channel(), msg);
        info!("rdevice-del: stopping rdev_id {:?} (pid {})", rdev_id, handle.device.pid());
        drop(handle);
        Ok(RemoteResponse::Ok)
    }

    fn drive_add(&mut self, rdev_id: &str, id: String, opts: String) -> Result<RemoteResponse> {
        let handle = self
            .devices
            .get(rdev_id)
            .ok_or_else(|| Error::NotFound(rdev_id.to_owned()))?;
        let payload = format!("{},id={}", opts, id).into_bytes();
        let msg = Message::with_bytestream(Command::DriveAdd, payload);
        let reply = send_and_wait(handle.device.channel(), msg).map_err(Error::ProxyLink)?;
        if reply == SENTINEL {
            return Err(Error::NotFound(format!(
                "{rdev_id}: worker did not acknowledge DRIVE_ADD"
            )));
        }
        Ok(RemoteResponse::Ok)
    }

    /// Blocks until the worker registered under `rdev_id` hangs up. A real host process keeps a
    /// `ProxyDevice` alive for exactly as long as the device's guest-visible lifetime;
    /// `rdevice-host rdevice-add` uses this so the CLI invocation that forked the worker doesn't
    /// immediately reap it by returning.
    pub fn wait_for_hangup(&self, rdev_id: &str) -> Result<()> {
        let handle = self
            .devices
            .get(rdev_id)
            .ok_or_else(|| Error::NotFound(rdev_id.to_owned()))?;
        loop {
            let events = handle
                .device
                .channel()
                .wait_ready(None)
                .map_err(Error::ProxyLink)?;
            if events.contains(PollEvents::HANGUP) {
                return Ok(());
            }
        }
    }

    fn query_remote(&self) -> RemoteResponse {
        let remotes = self
            .devices
            .iter()
            .map(|(rdev_id, handle)| RemoteProcInfo {
                pid: handle.device.pid(),
                rdev_id: rdev_id.clone(),
                id: handle.id.clone(),
                command: handle.command.clone(),
            })
            .collect();
        RemoteResponse::Remotes(remotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_add_then_query_remote_lists_it() {
        let mut registry = DeviceRegistry::new();
        let response = registry.execute(RemoteCommand::DeviceAdd {
            rdev_id: "rdev0".to_owned(),
            id: "net0".to_owned(),
            command: "/bin/sh".to_owned(),
        });
        assert!(matches!(response, RemoteResponse::Ok));

        match registry.execute(RemoteCommand::QueryRemote) {
            RemoteResponse::Remotes(remotes) => {
                assert_eq!(remotes.len(), 1);
                assert_eq!(remotes[0].rdev_id, "rdev0");
                assert_eq!(remotes[0].id, "net0");
                assert_eq!(remotes[0].command, "/bin/sh");
                assert!(remotes[0].pid > 0);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn duplicate_rdev_id_is_rejected() {
        let mut registry = DeviceRegistry::new();
        registry.execute(RemoteCommand::DeviceAdd {
            rdev_id: "rdev0".to_owned(),
            id: "net0".to_owned(),
            command: "/bin/sh".to_owned(),
        });
        let response = registry.execute(RemoteCommand::DeviceAdd {
            rdev_id: "rdev0".to_owned(),
            id: "net1".to_owned(),
            command: "/bin/sh".to_owned(),
        });
        assert!(matches!(response, RemoteResponse::Err(_)));
    }

    #[test]
    fn device_del_unknown_rdev_id_is_not_found() {
        let mut registry = DeviceRegistry::new();
        let response = registry.execute(RemoteCommand::DeviceDel {
            rdev_id: "does-not-exist".to_owned(),
        });
        assert!(matches!(response, RemoteResponse::Err(_)));
    }

    #[test]
    fn device_del_removes_entry() {
        let mut registry = DeviceRegistry::new();
        registry.execute(RemoteCommand::DeviceAdd {
            rdev_id: "rdev0".to_owned(),
            id: "net0".to_owned(),
            command: "/bin/sh".to_owned(),
        });
        let response = registry.execute(RemoteCommand::DeviceDel {
            rdev_id: "rdev0".to_owned(),
        });
        assert!(matches!(response, RemoteResponse::Ok));

        match registry.execute(RemoteCommand::QueryRemote) {
            RemoteResponse::Remotes(remotes) => assert!(remotes.is_empty()),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn drive_add_on_missing_rdev_id_is_not_found() {
        let mut registry = DeviceRegistry::new();
        let response = registry.execute(RemoteCommand::DriveAdd {
            rdev_id: "does-not-exist".to_owned(),
            id: "disk0".to_owned(),
            opts: "file=disk.img".to_owned(),
        });
        assert!(matches!(response, RemoteResponse::Err(_)));
    }
}
