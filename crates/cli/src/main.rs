use std::process::ExitCode;

fn main() -> ExitCode {
    tenderdesk_cli::run()
}
