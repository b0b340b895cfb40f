use std::process::ExitCode;

use clap::Parser;

fn main() -> ExitCode {
    let args = tabel_diff::cli::Args::parse();
    match tabel_diff::cli::run(args) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("Ошибка: {err:#}");
            ExitCode::from(1)
        }
    }
}
