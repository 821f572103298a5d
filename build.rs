use clap::CommandFactory;
use clap_complete::{generate_to, shells};
use std::env;
use std::io::Error;
use std::path::{Path, PathBuf};

include!("src/args.rs");

const BIN_NAME: &str = "plasmosim";

fn main() -> Result<(), Error> {
    println!("cargo:rerun-if-changed=src/args.rs");
    let mut cmd = Args::command();

    // bash, zsh and fish completions next to the build artifacts
    if let Some(out_dir) = env::var_os("OUT_DIR") {
        let out_dir = PathBuf::from(out_dir);
        generate_to(shells::Bash, &mut cmd, BIN_NAME, &out_dir)?;
        generate_to(shells::Zsh, &mut cmd, BIN_NAME, &out_dir)?;
        generate_to(shells::Fish, &mut cmd, BIN_NAME, &out_dir)?;
    }

    // installed for fish users directly
    let Some(home_dir) = env::var_os("HOME") else {
        return Ok(());
    };
    let fish_completions_dir = Path::new(&home_dir).join(".config/fish/completions");
    if fish_completions_dir.exists() {
        let path = generate_to(shells::Fish, &mut cmd, BIN_NAME, fish_completions_dir)?;
        println!("cargo:warning=fish completions for {BIN_NAME} written to {path:?}");
    }

    Ok(())
}
