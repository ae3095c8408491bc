//! Writes the hvprog(1) man page
//!
//! Usage: gen-manpage [output-dir]   (defaults to ./man)

use clap::CommandFactory;
use std::path::PathBuf;

#[path = "../cli.rs"]
mod cli;
#[allow(dead_code)]
#[path = "../programmers.rs"]
mod programmers;

fn main() -> std::io::Result<()> {
    let output_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));
    std::fs::create_dir_all(&output_dir)?;

    let mut page = Vec::new();
    clap_mangen::Man::new(cli::Cli::command()).render(&mut page)?;

    let path = output_dir.join("hvprog.1");
    std::fs::write(&path, page)?;
    println!("{}", path.display());
    Ok(())
}
