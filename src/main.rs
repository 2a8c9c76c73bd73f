//! # Voxel Terrain Entry Point
//!
//! Calls into the library's `run()` and exits non-zero if it fails.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release
//! ```

use std::process::ExitCode;

fn main() -> ExitCode {
    match voxel_terrain::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("voxel-terrain: {error:#}");
            ExitCode::FAILURE
        }
    }
}
