use std::path::PathBuf;

use boot_diag::release::{self, DigestSource};
use clap::Parser;

/// Package the flashing files of a build into a release zip.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the build directory, defaults to `build` in the project root.
    #[arg(long)]
    build_dir: Option<PathBuf>,
    /// Path to the output directory, defaults to `release` in the project root.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Secure boot signing key, the public key digest for secure boot builds is derived from it. Relative paths
    /// are taken from the project root.
    #[arg(long, default_value = "keys/secure_boot_signing_key.pem")]
    signing_key: PathBuf,
    /// Precomputed secure boot public key digest, used instead of the signing key.
    #[arg(long)]
    digest: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let project_root = release::find_project_root(&std::env::current_dir()?);
    let build_dir = args
        .build_dir
        .unwrap_or_else(|| project_root.join("build"));
    let output_dir = args
        .output_dir
        .unwrap_or_else(|| project_root.join("release"));

    let signing_key = project_root.join(&args.signing_key);
    let digest = match args.digest.as_deref() {
        Some(path) => DigestSource::Digest(path),
        None => DigestSource::SigningKey(&signing_key),
    };

    let output = release::build_release(&build_dir, &output_dir, digest)?;
    log::info!("flash package ready: {output:?}");
    Ok(())
}
