//! Loomline server binary: both frontends over one store.
//! Run with: cargo run --bin loomline-server

use std::process::ExitCode;

use loomline::start_loomline;

fn main() -> ExitCode {
    start_loomline::run()
}
