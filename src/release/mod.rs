//! Host side release packaging.
//!
//! Takes the flashing manifest and project description out of a build directory, rewrites the manifest so the
//! release can be flashed onto a fresh device, and packs everything into a zip together with a flash script.

use std::path::{Path, PathBuf};

pub mod flash_script;
pub mod manifest;
pub mod package;
pub mod project;
pub mod secure_boot;

pub use manifest::{FlashOffset, FlasherArgs};
pub use project::ProjectDescription;

/// Name of the flashing manifest, both in the build directory and in the package.
pub const FLASHER_ARGS_FILE: &str = "flasher_args.json";
/// Name of the project description in the build directory.
pub const PROJECT_DESCRIPTION_FILE: &str = "project_description.json";
/// Name of the secure boot public key digest in the package.
pub const DIGEST_FILE: &str = "digest.bin";
/// Name of the flash script in the package.
pub const FLASH_SCRIPT_FILE: &str = "flash.sh";

/// Errors from building a release.
#[derive(thiserror::Error, Debug)]
pub enum ReleaseError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// A required input file is not present.
    #[error("{0:?} not found")]
    MissingInput(PathBuf),
    /// A flash offset did not parse as a hexadecimal address.
    #[error("invalid flash offset {0:?}")]
    InvalidOffset(String),
    /// Secure boot is enabled, but no public key digest was provided.
    #[error("secure boot is enabled but no public key digest was provided")]
    MissingDigest,
    /// The signing key is not a PEM encoded RSA key.
    #[error("invalid signing key: {0}")]
    InvalidSigningKey(String),
    /// Secure boot V2 needs an RSA-3072 key.
    #[error("signing key has {0} bits, secure boot needs 3072")]
    UnsupportedKeySize(usize),
}

/// Where the secure boot public key digest comes from.
#[derive(Debug, Copy, Clone)]
pub enum DigestSource<'a> {
    /// Derive it from the signing key (or its public key) PEM.
    SigningKey(&'a Path),
    /// Use a precomputed digest file as is.
    Digest(&'a Path),
}

impl DigestSource<'_> {
    pub fn path(&self) -> &Path {
        match self {
            DigestSource::SigningKey(p) | DigestSource::Digest(p) => p,
        }
    }

    /// Read or derive the digest.
    pub fn digest(&self) -> Result<Vec<u8>, ReleaseError> {
        let path = self.path();
        if !path.is_file() {
            return Err(ReleaseError::MissingInput(path.to_path_buf()));
        }
        match self {
            DigestSource::SigningKey(p) => {
                log::info!("generating secure boot v2 public key digest from {p:?}");
                let pem = std::fs::read_to_string(p)?;
                Ok(secure_boot::public_key_digest(&pem)?.to_vec())
            }
            DigestSource::Digest(p) => {
                log::info!("using secure boot public key digest {p:?}");
                Ok(std::fs::read(p)?)
            }
        }
    }
}

/// First ancestor of `start` that holds a `.git` entry, or `start` itself.
pub fn find_project_root(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .unwrap_or(start)
        .to_path_buf()
}

/// Build the release package for `build_dir` into `output_dir`, returns the path of the written zip.
///
/// `digest` is only consulted when the build has secure boot enabled.
pub fn build_release(
    build_dir: &Path,
    output_dir: &Path,
    digest: DigestSource<'_>,
) -> Result<PathBuf, ReleaseError> {
    if !build_dir.is_dir() {
        return Err(ReleaseError::MissingInput(build_dir.to_path_buf()));
    }

    let flasher_args = FlasherArgs::load(build_dir)?.prepare_release();
    let project = ProjectDescription::load(build_dir)?;
    let release_name = project.release_file_name();

    let digest = if flasher_args.is_secure_boot() {
        Some(digest.digest()?)
    } else {
        None
    };

    std::fs::create_dir_all(output_dir)?;
    let output = output_dir.join(release_name);
    let file = std::fs::File::create(&output)?;
    package::write_package(file, build_dir, flasher_args, digest.as_deref())?;
    log::info!("release package created: {output:?}");
    Ok(output)
}
