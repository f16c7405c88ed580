use std::process::ExitCode;

fn main() -> ExitCode {
    dentalfly_cli::run()
}
