#![forbid(unsafe_code)]

fn main() {
    std::process::exit(qbench_cli::run());
}
