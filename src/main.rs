fn main() {
    if let Err(err) = xlsform_convert::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
