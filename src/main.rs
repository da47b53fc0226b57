mod cli;
mod common;
mod exec;
mod jobs;
mod logger;
mod parse;
mod signal;

use std::process;

use cli::Cli;

fn print_usage() -> ! {
    println!("Usage: jsh [-hvp]");
    println!("   -h   print this message");
    println!("   -v   verbose diagnostics");
    println!("   -p   do not emit a command prompt");
    process::exit(1);
}

fn main() {
    let mut emit_prompt = true;
    let mut verbose = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-h" => print_usage(),
            "-v" => verbose = true,
            "-p" => emit_prompt = false,
            _ => print_usage(),
        }
    }

    logger::init(verbose);
    exec::append_default_path();
    // The registry must exist before the first handler can fire.
    jobs::init();
    signal::install();

    let mut client = Cli::new(emit_prompt);
    client.go();
}
