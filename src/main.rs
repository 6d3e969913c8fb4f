fn main() {
    if let Err(err) = event_lagbe_lib::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
