//! CLI smoke entry point.
//!
//! Opens an in-memory provenance store and prints linkage facts so a build
//! can be sanity-checked without a host service.

use std::process::ExitCode;

fn main() -> ExitCode {
    println!("provenance_core ping={}", provenance_core::ping());
    println!("provenance_core version={}", provenance_core::core_version());

    match provenance_core::open_db_in_memory() {
        Ok(conn) => match provenance_core::db::migrations::schema_version(&conn) {
            Ok(version) => {
                println!("provenance_core schema_version={version}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("provenance_core schema_read_failed error={err}");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            eprintln!("provenance_core store_open_failed error={err}");
            ExitCode::FAILURE
        }
    }
}
