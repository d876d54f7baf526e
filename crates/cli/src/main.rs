use std::process::ExitCode;

fn main() -> ExitCode {
    sitelens_cli::run()
}
