use std::process::ExitCode;

fn main() -> ExitCode {
    agentmart_cli::run()
}
