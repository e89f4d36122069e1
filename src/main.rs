fn main() {
    if let Err(e) = lou::core::Host::run() {
        eprintln!("Host failed to start: {}", e);
        std::process::exit(1);
    }
}
