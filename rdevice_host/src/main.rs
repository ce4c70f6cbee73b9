// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Host-side CLI for the multi-process device IPC core's control surface
//! (`vm_control::remote`). Stands in for the monitor/QMP/HMP commands a real hypervisor would
//! expose around the same registry: adding and removing remote devices, forwarding drive-add
//! options, and listing what's currently registered.

use argh::FromArgs;
use vm_control::DeviceRegistry;
use vm_control::RemoteCommand;

#[derive(FromArgs, Debug)]
/// Drive the remote-device control surface: fork/stop workers, forward drive-add options, list
/// currently registered remote devices.
struct Cli {
    #[argh(subcommand)]
    command: Subcommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum Subcommand {
    RdeviceAdd(RdeviceAdd),
    RdeviceDel(RdeviceDel),
    RdriveAdd(RdriveAdd),
    QueryRemote(QueryRemote),
}

#[derive(FromArgs, PartialEq, Debug)]
/// fork a worker process and register it under a new rdev_id (`rdevice_add`)
#[argh(subcommand, name = "rdevice-add")]
struct RdeviceAdd {
    /// the worker binary to fork and exec, e.g. `rdevice-worker`
    #[argh(option)]
    command: String,
    /// this proxy handle's id, used by later rdevice-del/rdrive-add calls
    #[argh(option)]
    rdev_id: String,
    /// the guest-visible device id reported back by query-remote
    #[argh(option)]
    id: String,
}

#[derive(FromArgs, PartialEq, Debug)]
/// stop the worker registered under rdev_id and remove it from the registry (`rdevice_del`)
#[argh(subcommand, name = "rdevice-del")]
struct RdeviceDel {
    #[argh(option)]
    rdev_id: String,
}

#[derive(FromArgs, PartialEq, Debug)]
/// forward a DRIVE_ADD request to the worker already registered under rdev_id (`rdrive_add`)
#[argh(subcommand, name = "rdrive-add")]
struct RdriveAdd {
    #[argh(option)]
    rdev_id: String,
    /// the new drive's id
    #[argh(option)]
    id: String,
    /// comma-separated `key=value` drive options, without the trailing `id=...`
    #[argh(option)]
    opts: String,
}

#[derive(FromArgs, PartialEq, Debug)]
/// list every remote device currently registered (`query-remote` / `info remote`)
#[argh(subcommand, name = "query-remote")]
struct QueryRemote {}

fn main() {
    base::init_logging();
    let cli: Cli = argh::from_env();
    let mut registry = DeviceRegistry::new();

    let response = match cli.command {
        Subcommand::RdeviceAdd(args) => {
            let response = registry.execute(RemoteCommand::DeviceAdd {
                rdev_id: args.rdev_id.clone(),
                id: args.id,
                command: args.command,
            });
            // A single CLI invocation both forks the worker and owns the ProxyDevice handle for
            // this example binary, so block here until the worker goes away rather than letting
            // the process exit and reap the worker out from under the guest. A real host keeps
            // the registry alive inside its own long-running event loop instead of a one-shot
            // CLI process.
            if matches!(response, vm_control::RemoteResponse::Ok) {
                if let Err(e) = registry.wait_for_hangup(&args.rdev_id) {
                    log::error!("rdevice-add: {}", e);
                }
            }
            response
        }
        Subcommand::RdeviceDel(args) => registry.execute(RemoteCommand::DeviceDel {
            rdev_id: args.rdev_id,
        }),
        Subcommand::RdriveAdd(args) => registry.execute(RemoteCommand::DriveAdd {
            rdev_id: args.rdev_id,
            id: args.id,
            opts: args.opts,
        }),
        Subcommand::QueryRemote(QueryRemote {}) => registry.execute(RemoteCommand::QueryRemote),
    };

    print!("{}", response);
    if matches!(response, vm_control::RemoteResponse::Err(_)) {
        std::process::exit(1);
    }
}
