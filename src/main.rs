use quadraster::io::PathReader;
use quadraster::{PagedEnvironment, RasterReader, ReaderConfig};
use std::env;
use std::process::ExitCode;
use std::time::Instant;

fn main() -> ExitCode {
    let Some(path) = env::args().nth(1) else {
        eprintln!("usage: quadraster <dataset>");
        return ExitCode::FAILURE;
    };
    println!("Opening {path}");

    let t0 = Instant::now();
    let dataset = match PagedEnvironment::open_named(PathReader::new(&path), path.as_str()) {
        Ok(dataset) => dataset,
        Err(e) => {
            eprintln!("Failed to open {path}: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!("Opened in {:.6}s", t0.elapsed().as_secs_f64());

    let reader = RasterReader::from_env(dataset, ReaderConfig::default());
    println!("{reader}");
    match reader.determine_extent() {
        Ok((z, region)) => println!("Extent: level {z} {region}"),
        Err(e) => println!("Extent: {e}"),
    }
    ExitCode::SUCCESS
}
