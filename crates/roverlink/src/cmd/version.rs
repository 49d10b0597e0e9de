use roverlink_frame::{MessageType, EXTENDED_HEADER_SIZE, MAX_COMPACT_LEN};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("roverlink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: roverlink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("ROVERLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("transports: radio, udp");
    println!(
        "protocols: compact (max {MAX_COMPACT_LEN} bytes), extended ({EXTENDED_HEADER_SIZE}-byte header)"
    );
    let types: Vec<String> = MessageType::ALL
        .iter()
        .map(|ty| format!("{}=0x{:02X}", ty.name(), ty.id()))
        .collect();
    println!("message_types: {}", types.join(", "));

    Ok(SUCCESS)
}
