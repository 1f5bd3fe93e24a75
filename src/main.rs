use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    scantables::cli::run_scantables(std::env::args().skip(1))
}
