use ipcslot_channel::ChannelNames;
use ipcslot_sys::name;
use serde::Serialize;

use crate::cmd::NamesArgs;
use crate::exit::{sys_error, CliResult, SUCCESS};
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Serialize)]
struct NameEntry {
    role: &'static str,
    name: String,
    os_name: String,
}

const SIGNAL_ROLES: [&str; 3] = ["client_signal", "server_signal", "shared_signal"];

/// The segment followed by every signal, each with its role label.
pub(crate) fn entries(names: &ChannelNames) -> Vec<(&'static str, &str)> {
    let mut entries = vec![("segment", names.segment.as_str())];
    entries.extend(SIGNAL_ROLES.into_iter().zip(names.all_signals()));
    entries
}

pub fn run(args: NamesArgs, format: OutputFormat) -> CliResult<i32> {
    let names = ChannelNames::derive(&args.name);
    let mut rows = Vec::new();
    for (role, object) in entries(&names) {
        name::validate(object).map_err(|err| sys_error("invalid channel name", err))?;
        rows.push(NameEntry {
            role,
            name: object.to_string(),
            os_name: name::os_name(object),
        });
    }

    match format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Table => print_table(
            &["ROLE", "NAME", "OS NAME"],
            rows.iter()
                .map(|row| vec![row.role.to_string(), row.name.clone(), row.os_name.clone()])
                .collect(),
        ),
        OutputFormat::Pretty | OutputFormat::Raw => {
            for row in &rows {
                println!("{}: {}", row.role, row.os_name);
            }
        }
    }

    Ok(SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_label_each_object() {
        let names = ChannelNames::derive("chan1");
        assert_eq!(
            entries(&names),
            [
                ("segment", "chan1"),
                ("client_signal", "chan1_cs"),
                ("server_signal", "chan1_ss"),
                ("shared_signal", "chan1_sig"),
            ]
        );
    }
}
