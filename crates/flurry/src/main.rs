//! flurry CLI: polls buckets and emits newly staged files.

use std::process::ExitCode;

use flurry::{Application, Config};

fn main() -> ExitCode {
    Application::<Config>::run()
}
