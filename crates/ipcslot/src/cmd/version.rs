use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("ipcslot {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: ipcslot");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("IPCSLOT_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("backend: {}", backend());
    println!(
        "max_name_len: {}",
        ipcslot_sys::name::MAX_NAME_LEN
    );
    println!(
        "default_segment_size: {}",
        ipcslot_channel::DEFAULT_SEGMENT_SIZE
    );

    Ok(SUCCESS)
}

fn backend() -> &'static str {
    if cfg!(windows) {
        "win32 events + file mappings"
    } else if cfg!(any(target_os = "macos", target_os = "ios")) {
        "posix semaphores (polled timed wait) + shm"
    } else {
        "posix semaphores + shm"
    }
}
