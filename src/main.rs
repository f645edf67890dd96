use clap::Parser;
use peg_toolchain::cli::{run, Args};

fn main() {
    env_logger::init();
    let args = Args::parse();
    std::process::exit(run(args));
}
