// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: manifest path
fn manifest_arg() -> Arg {
    Arg::new("manifest")
        .short('m')
        .long("manifest")
        .value_name("PATH")
        .default_value("registry.json")
        .help("Registry manifest (JSON)")
}

fn build_cli() -> Command {
    Command::new("unity-nuget")
        .version(env!("CARGO_PKG_VERSION"))
        .author("unity-nuget Contributors")
        .about("Mirror NuGet packages as Unity Package Manager packages")
        .subcommand_required(true)
        .subcommand(
            Command::new("build")
                .about("Run one build pass over the manifest and print the catalog")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("PATH")
                        .help("Configuration file (TOML)"),
                )
                .arg(manifest_arg())
                .arg(Arg::new("feed").long("feed").value_name("DIR").help("Local feed directory"))
                .arg(Arg::new("filter").long("filter").help("Only build entries matching this regex"))
                .arg(Arg::new("output").short('o').long("output").help("Write the catalog listing here"))
                .arg(
                    Arg::new("full")
                        .long("full")
                        .action(ArgAction::SetTrue)
                        .help("Write full package documents instead of summaries"),
                ),
        )
        .subcommand(
            Command::new("check-manifest")
                .about("Load and validate a registry manifest")
                .arg(manifest_arg()),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = manifest_dir.join("man").join("unity-nuget.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
