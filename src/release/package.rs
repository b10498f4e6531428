use std::io::{Seek, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::flash_script::flash_script;
use super::{FlasherArgs, ReleaseError, DIGEST_FILE, FLASHER_ARGS_FILE, FLASH_SCRIPT_FILE};

/// Write the release zip into `writer`.
///
/// Contains the manifest, the flash script, the public key digest for secure boot builds, and every flash file the
/// manifest lists that exists in `build_dir`. The writer is handed back once the archive is finished.
pub fn write_package<W: Write + Seek>(
    writer: W,
    build_dir: &Path,
    mut args: FlasherArgs,
    digest: Option<&[u8]>,
) -> Result<W, ReleaseError> {
    if args.is_secure_boot() {
        if digest.is_none() {
            return Err(ReleaseError::MissingDigest);
        }
        if let Some(security) = args.security.as_mut() {
            security.digest_file = Some(DIGEST_FILE.to_string());
        }
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(writer);

    zip.start_file(FLASHER_ARGS_FILE, options)?;
    zip.write_all(&args.to_json_pretty()?)?;

    zip.start_file(FLASH_SCRIPT_FILE, options.unix_permissions(0o755))?;
    zip.write_all(flash_script(&args).as_bytes())?;

    if args.is_secure_boot() {
        if let Some(digest) = digest {
            zip.start_file(DIGEST_FILE, options)?;
            zip.write_all(digest)?;
        }
    }

    for (offset, file) in args.flash_files.iter() {
        let path = build_dir.join(file);
        if !path.is_file() {
            log::warn!("skipping {file} at {offset}, {path:?} does not exist");
            continue;
        }
        log::debug!("adding {file} at {offset}");
        zip.start_file(file.as_str(), options)?;
        zip.write_all(&std::fs::read(&path)?)?;
    }

    Ok(zip.finish()?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::release::test_util::*;
    use std::io::{Cursor, Read};

    fn read_entry<R: std::io::Read + Seek>(
        archive: &mut zip::ZipArchive<R>,
        name: &str,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut data = vec![];
        archive.by_name(name)?.read_to_end(&mut data)?;
        Ok(data)
    }

    #[test]
    fn test_plain_package() -> Result<(), Box<dyn std::error::Error>> {
        init();
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("boot_diag.bin"), b"app")?;
        std::fs::create_dir_all(dir.path().join("bootloader"))?;
        std::fs::write(dir.path().join("bootloader/bootloader.bin"), b"boot")?;
        // Partition table is left out on purpose, it must be skipped.

        let args: FlasherArgs = serde_json::from_str(PLAIN_FLASHER_ARGS)?;
        let args = args.prepare_release();
        let cursor = write_package(Cursor::new(vec![]), dir.path(), args, None)?;

        let mut archive = zip::ZipArchive::new(cursor)?;
        let mut names = archive.file_names().map(str::to_string).collect::<Vec<_>>();
        names.sort();
        assert_eq!(
            names,
            vec![
                "boot_diag.bin",
                "bootloader/bootloader.bin",
                "flash.sh",
                "flasher_args.json",
            ]
        );
        assert_eq!(read_entry(&mut archive, "boot_diag.bin")?, b"app");
        assert_eq!(read_entry(&mut archive, "bootloader/bootloader.bin")?, b"boot");

        let manifest: FlasherArgs =
            serde_json::from_slice(&read_entry(&mut archive, FLASHER_ARGS_FILE)?)?;
        assert!(!manifest.is_secure_boot());
        assert_eq!(manifest.security().digest_file, None);

        let script = archive.by_name(FLASH_SCRIPT_FILE)?;
        assert_eq!(script.unix_mode().map(|m| m & 0o777), Some(0o755));
        Ok(())
    }

    #[test]
    fn test_secure_package() -> Result<(), Box<dyn std::error::Error>> {
        init();
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("boot_diag.bin"), b"app")?;

        let args: FlasherArgs = serde_json::from_str(SECURE_FLASHER_ARGS)?;
        let args = args.prepare_release();

        let r = write_package(Cursor::new(vec![]), dir.path(), args.clone(), None);
        assert!(matches!(r, Err(ReleaseError::MissingDigest)));

        let digest = [0x5au8; 32];
        let cursor = write_package(Cursor::new(vec![]), dir.path(), args, Some(&digest))?;
        let mut archive = zip::ZipArchive::new(cursor)?;
        assert_eq!(read_entry(&mut archive, DIGEST_FILE)?, digest);
        // No bootloader in this build dir, so it is not packaged.
        assert!(archive.by_name("bootloader/bootloader.bin").is_err());

        let manifest: FlasherArgs =
            serde_json::from_slice(&read_entry(&mut archive, FLASHER_ARGS_FILE)?)?;
        assert!(manifest.is_secure_boot());
        assert!(manifest.is_encrypted());
        assert_eq!(manifest.security().digest_file.as_deref(), Some(DIGEST_FILE));
        Ok(())
    }
}
