fn main() {
    let args: Vec<String> = std::env::args().collect();
    if let Err(err) = pfile::run(&args) {
        eprintln!("pfile: {}", err);
        std::process::exit(1);
    }
}
