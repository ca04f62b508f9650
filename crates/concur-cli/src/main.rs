#![forbid(unsafe_code)]

fn main() {
    std::process::exit(concur_cli::run());
}
