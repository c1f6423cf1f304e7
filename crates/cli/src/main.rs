use std::process::ExitCode;

fn main() -> ExitCode {
    fabmarket_cli::run()
}
