use std::process::ExitCode;

fn main() -> ExitCode {
    backoffice_till_lib::run()
}
