fn main() {
    if let Err(err) = proms_prep::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
