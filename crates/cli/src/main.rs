use std::process::ExitCode;

fn main() -> ExitCode {
    orgflow_cli::run()
}
