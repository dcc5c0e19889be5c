use std::process::ExitCode;

fn main() -> ExitCode {
    tripflow_cli::run()
}
