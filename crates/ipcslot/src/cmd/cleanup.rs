use ipcslot_channel::ChannelNames;
use ipcslot_sys::{NamedSegment, NamedSignal, Semaphore, SharedMemory};
use serde::Serialize;
use tracing::info;

use crate::cmd::names::entries;
use crate::cmd::CleanupArgs;
use crate::exit::{sys_error, CliResult, SUCCESS};
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Serialize)]
struct CleanupEntry {
    role: &'static str,
    name: String,
    removed: bool,
}

/// Unlink every object a channel under `name` may have left behind.
///
/// Removing the names of a live channel disconnects future clients from it,
/// so only run this once the server is known to be gone.
pub fn run(args: CleanupArgs, format: OutputFormat) -> CliResult<i32> {
    let names = ChannelNames::derive(&args.name);
    let mut results = Vec::new();
    for (role, object) in entries(&names) {
        let removed = if role == "segment" {
            SharedMemory::remove(object)
        } else {
            Semaphore::remove(object)
        }
        .map_err(|err| sys_error("cleanup failed", err))?;

        if removed {
            info!(object, role, "removed stale object");
        }
        results.push(CleanupEntry {
            role,
            name: object.to_string(),
            removed,
        });
    }

    match format {
        OutputFormat::Json => print_json(&results),
        OutputFormat::Table => print_table(
            &["ROLE", "NAME", "REMOVED"],
            results
                .iter()
                .map(|r| vec![r.role.to_string(), r.name.clone(), r.removed.to_string()])
                .collect(),
        ),
        OutputFormat::Pretty | OutputFormat::Raw => {
            let removed = results.iter().filter(|r| r.removed).count();
            println!("removed {removed} of {} objects for {}", results.len(), args.name);
        }
    }

    Ok(SUCCESS)
}
