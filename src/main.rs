fn main() {
    if let Err(err) = inventory_merge::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
