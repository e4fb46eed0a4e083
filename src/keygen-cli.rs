//! Generates the RSA key pairs the two servers sign with, and Argon2 hashes
//! of voter secrets for the credential authority's registry.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

use vn_election::model::{authority::hash_secret, signature::generate_keypair};

const PROGRAM_NAME: &str = "keygen-cli";

const ABOUT_TEXT: &str = "Generate keys and secret hashes for the voting servers.

EXIT CODES:
     0: Success.
     1: Error.";

const NAME: &str = "NAME";
const OUT_DIR: &str = "OUT_DIR";
const BITS: &str = "BITS";
const SECRET: &str = "SECRET";

const DEFAULT_BITS: usize = 2048;

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .subcommand_required(true)
        .subcommand(
            Command::new("keys")
                .about("Write `<NAME>-rsa` and `<NAME>-rsa.pub` PEM files")
                .arg(
                    Arg::new(NAME)
                        .help("Key name, e.g. `cla` or `ctf`")
                        .action(ArgAction::Set)
                        .required(true),
                )
                .arg(
                    Arg::new(OUT_DIR)
                        .long("out-dir")
                        .help("Directory to write the key files to")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(PathBuf))
                        .default_value("keys"),
                )
                .arg(
                    Arg::new(BITS)
                        .long("bits")
                        .help("Modulus size in bits")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(usize))
                        .default_value("2048"),
                ),
        )
        .subcommand(
            Command::new("hash")
                .about("Print the Argon2 hash of a voter secret, for the `voters` table")
                .arg(
                    Arg::new(SECRET)
                        .action(ArgAction::Set)
                        .required(true),
                ),
        )
}

fn write_keys(name: &str, out_dir: &Path, bits: usize) -> Result<(), String> {
    let private_path = out_dir.join(format!("{name}-rsa"));
    let public_path = out_dir.join(format!("{name}-rsa.pub"));
    for path in [&private_path, &public_path] {
        if path.exists() {
            return Err(format!("{} already exists", path.display()));
        }
    }

    let (private, public) = generate_keypair(bits).map_err(|e| e.to_string())?;
    fs::create_dir_all(out_dir).map_err(|e| format!("{}: {e}", out_dir.display()))?;
    write_private(&private_path, &private)
        .map_err(|e| format!("{}: {e}", private_path.display()))?;
    fs::write(&public_path, public).map_err(|e| format!("{}: {e}", public_path.display()))?;
    println!("Wrote {} and {}", private_path.display(), public_path.display());
    Ok(())
}

/// Create a new file readable only by its owner.
fn write_private(path: &Path, pem: &str) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    options.open(path)?.write_all(pem.as_bytes())
}

/// Run the chosen subcommand and return the exit code.
fn run(args: &ArgMatches) -> u8 {
    let result = match args.subcommand() {
        Some(("keys", sub)) => {
            // Required and defaulted arguments are guaranteed to be present.
            let name: &String = sub.get_one(NAME).unwrap();
            let out_dir: &PathBuf = sub.get_one(OUT_DIR).unwrap();
            let bits = sub.get_one::<usize>(BITS).copied().unwrap_or(DEFAULT_BITS);
            write_keys(name, out_dir, bits)
        }
        Some(("hash", sub)) => {
            let secret: &String = sub.get_one(SECRET).unwrap();
            hash_secret(secret)
                .map(|hash| println!("{hash}"))
                .map_err(|e| e.to_string())
        }
        _ => unreachable!("a subcommand is required"),
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    }
}

fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args);
    std::process::exit(exit_code.into())
}
