use std::process::ExitCode;

fn main() -> ExitCode {
    routetracker_cli::run()
}
