fn main() -> std::process::ExitCode {
    adwright_cli::run()
}
