//! Bash script that flashes a release package with esptool.

use core::fmt::Write;

use super::FlasherArgs;

pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const BAUD_RATE: u32 = 460800;

const SECURE_BOOT_WARNING: &str = r#"
echo "Secure Boot is enabled!"
echo "   - Secure Boot prevents flashing any region below 0x8000."
echo "   - The bootloader must be flashed using --force"
echo "   - WARNING: Incorrect usage of --force may permanently lock your device!"
echo ""
read -p "Do you want to continue flashing with Secure Boot enabled? (y/N): " CONFIRM_SECURE_BOOT
if [[ ! $CONFIRM_SECURE_BOOT =~ ^[Yy]$ ]]; then
    echo "Flashing aborted."
    exit 1
fi
"#;

const ENCRYPTION_WARNING: &str = r#"
echo "Encryption is enabled!"
echo "   - This means the firmware will be encrypted when written to flash."
echo "   - You must use the same encryption key when updating the firmware in the future."
echo "   - WARNING: Losing the encryption key may render the device unbootable!"
echo ""
read -p "Do you want to continue flashing with encryption? (y/N): " CONFIRM_ENCRYPT
if [[ ! $CONFIRM_ENCRYPT =~ ^[Yy]$ ]]; then
    echo "Flashing aborted."
    exit 1
fi
"#;

/// Render the flash script for a manifest that went through [`FlasherArgs::prepare_release`].
pub fn flash_script(args: &FlasherArgs) -> String {
    let esptool = &args.extra_esptool_args;
    let settings = &args.flash_settings;

    let mut s = String::new();
    // Writing into a String can't fail.
    let _ = writeln!(s, "#!/bin/bash");
    let _ = writeln!(
        s,
        "PORT=\"${{1:-{DEFAULT_PORT}}}\"  # Default to {DEFAULT_PORT} if not provided"
    );
    let _ = writeln!(s, "BAUD={BAUD_RATE}");
    let _ = writeln!(s);
    let _ = writeln!(s, "echo \"Flashing {}...\"", esptool.chip);
    let _ = writeln!(s);

    if args.is_secure_boot() {
        s.push_str(SECURE_BOOT_WARNING);
    }
    if args.is_encrypted() {
        s.push_str(ENCRYPTION_WARNING);
    }

    let mut tool = vec![
        "esptool.py -p $PORT -b $BAUD".to_string(),
        format!("--before {}", esptool.before),
        format!("--after {}", esptool.after),
    ];
    if !esptool.stub {
        tool.push("--no-stub".to_string());
    }
    tool.push(format!("--chip {}", esptool.chip));

    let mut write = vec![
        "write_flash".to_string(),
        format!("--flash_mode {}", settings.flash_mode),
        format!("--flash_freq {}", settings.flash_freq),
        format!("--flash_size {}", settings.flash_size),
    ];
    if args.is_secure_boot() {
        write.push("--force".to_string());
    }

    let mut lines = vec![tool.join(" "), format!("    {}", write.join(" "))];
    for (offset, file) in args.flash_files.iter() {
        lines.push(format!("    {offset} {file}"));
    }
    s.push_str(&lines.join(" \\\n"));
    s.push('\n');
    s
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::release::test_util::*;

    #[test]
    fn test_plain_script() -> Result<(), Box<dyn std::error::Error>> {
        let args: FlasherArgs = serde_json::from_str(PLAIN_FLASHER_ARGS)?;
        let script = flash_script(&args.prepare_release());
        println!("{script}");

        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("PORT=\"${1:-/dev/ttyUSB0}\""));
        assert!(script.contains("BAUD=460800"));
        assert!(!script.contains("Secure Boot is enabled"));
        assert!(!script.contains("Encryption is enabled"));
        assert!(!script.contains("--no-stub"));
        assert!(!script.contains("--force"));
        assert!(script.contains(
            "esptool.py -p $PORT -b $BAUD --before default_reset --after hard_reset --chip esp32 \\\n"
        ));
        assert!(script.contains("    write_flash --flash_mode dio --flash_freq 80m --flash_size 4MB \\\n"));
        assert!(script.ends_with("    0x10000 boot_diag.bin\n"));

        let a = script.find("0x1000 bootloader").ok_or("missing bootloader")?;
        let b = script.find("0x8000 partition").ok_or("missing partition table")?;
        let c = script.find("0x10000 boot_diag").ok_or("missing app")?;
        assert!(a < b && b < c);
        Ok(())
    }

    #[test]
    fn test_secure_script() -> Result<(), Box<dyn std::error::Error>> {
        let args: FlasherArgs = serde_json::from_str(SECURE_FLASHER_ARGS)?;
        let script = flash_script(&args.prepare_release());

        assert!(script.contains("Secure Boot is enabled"));
        assert!(script.contains("Encryption is enabled"));
        assert!(script.contains("--no-stub --chip esp32s3"));
        assert!(script.contains("--flash_size 4MB --force \\\n"));
        assert!(script.contains("    0x0 bootloader/bootloader.bin \\\n"));
        Ok(())
    }
}
