//! The flashing manifest (`flasher_args.json`) and its release rewrite.
//!
//! Only the fields the release needs are typed, everything else is carried along untouched so the manifest in the
//! package is the build's manifest plus our changes.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::{ReleaseError, FLASHER_ARGS_FILE};

/// Where the bootloader goes when the release has to carry it itself.
pub const BOOTLOADER_OFFSET: FlashOffset = FlashOffset(0);
/// Path of the bootloader image, relative to the build directory.
pub const BOOTLOADER_FILE: &str = "bootloader/bootloader.bin";

const FORCE_ARG: &str = "--force";
const ENCRYPT_ARG: &str = "--encrypt";

/// Address in flash, written as hexadecimal `0x...` in the manifest.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlashOffset(pub u32);

impl FlashOffset {
    pub fn parse(s: &str) -> Result<Self, ReleaseError> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        u32::from_str_radix(digits, 16)
            .map(FlashOffset)
            .map_err(|_| ReleaseError::InvalidOffset(s.to_string()))
    }
}

impl core::fmt::Display for FlashOffset {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl Serialize for FlashOffset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FlashOffset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FlashOffset::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// The manifest writes booleans as the strings "true" and "false", only "true" sets the flag.
mod flag_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *v { "true" } else { "false" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s == "true")
    }
}

fn default_stub() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashSettings {
    pub flash_mode: String,
    pub flash_size: String,
    pub flash_freq: String,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Arguments for the flasher itself, as opposed to the write command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EsptoolArgs {
    pub after: String,
    pub before: String,
    #[serde(default = "default_stub")]
    pub stub: bool,
    pub chip: String,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// A single image section, like `app` or `bootloader`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub offset: String,
    pub file: String,
    #[serde(default, with = "flag_string")]
    pub encrypted: bool,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Security {
    #[serde(default)]
    pub secure_boot: bool,
    #[serde(default)]
    pub encryption: bool,
    /// Public key digest shipped in the package, only with secure boot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest_file: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlasherArgs {
    pub write_flash_args: Vec<String>,
    pub flash_settings: FlashSettings,
    /// Image per flash offset, iterates in flash order.
    pub flash_files: BTreeMap<FlashOffset, String>,
    pub extra_esptool_args: EsptoolArgs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootloader: Option<ImageEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<ImageEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Security>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
    /// Order of the top level keys in the parsed manifest, output keeps it.
    #[serde(skip)]
    pub key_order: Vec<String>,
}

impl FlasherArgs {
    /// Read the manifest from a build directory.
    pub fn load(build_dir: &Path) -> Result<Self, ReleaseError> {
        let path = build_dir.join(FLASHER_ARGS_FILE);
        if !path.is_file() {
            return Err(ReleaseError::MissingInput(path));
        }
        Self::from_json(&std::fs::read(&path)?)
    }

    /// Parse a manifest, remembering its top level key order.
    pub fn from_json(data: &[u8]) -> Result<Self, ReleaseError> {
        let value: Value = serde_json::from_slice(data)?;
        let key_order = value
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        let mut args: FlasherArgs = serde_json::from_value(value)?;
        args.key_order = key_order;
        Ok(args)
    }

    /// Whether the app image is flashed encrypted.
    pub fn encryption_required(&self) -> bool {
        self.app.as_ref().is_some_and(|app| app.encrypted)
    }

    /// With secure boot the build leaves the bootloader out of the app flash.
    pub fn bootloader_missing(&self) -> bool {
        self.bootloader.is_none()
    }

    /// Security settings recorded by [`FlasherArgs::prepare_release`].
    pub fn security(&self) -> Security {
        self.security.clone().unwrap_or_default()
    }

    pub fn is_secure_boot(&self) -> bool {
        self.security.as_ref().is_some_and(|s| s.secure_boot)
    }

    pub fn is_encrypted(&self) -> bool {
        self.security.as_ref().is_some_and(|s| s.encryption)
    }

    /// Rewrite the manifest so a release flashes a blank device completely.
    ///
    /// Secure boot builds get the bootloader added at offset zero and need `--force` to write below the protected
    /// region, encrypted builds get `--encrypt`. The outcome is recorded in the `security` section.
    pub fn prepare_release(mut self) -> Self {
        let encryption = self.encryption_required();
        let secure_boot = self.bootloader_missing();

        if secure_boot {
            log::info!("secure boot detected, adding bootloader to the release");
            self.bootloader = Some(ImageEntry {
                offset: BOOTLOADER_OFFSET.to_string(),
                file: BOOTLOADER_FILE.to_string(),
                encrypted: encryption,
                other: Default::default(),
            });
            self.flash_files
                .insert(BOOTLOADER_OFFSET, BOOTLOADER_FILE.to_string());
            if !self.write_flash_args.iter().any(|a| a == FORCE_ARG) {
                log::warn!("adding {FORCE_ARG} to write_flash_args");
                self.write_flash_args.insert(0, FORCE_ARG.to_string());
            }
        } else {
            log::info!("bootloader present, secure boot is disabled");
            if let Some(bootloader) = self.bootloader.as_mut() {
                bootloader.encrypted = encryption;
            }
        }

        let security = self.security.get_or_insert_with(Default::default);
        security.secure_boot = secure_boot;
        security.encryption = encryption;

        if encryption {
            log::info!("app is encrypted, adding {ENCRYPT_ARG} to write_flash_args");
            if !self.write_flash_args.iter().any(|a| a == ENCRYPT_ARG) {
                self.write_flash_args.push(ENCRYPT_ARG.to_string());
            }
        } else {
            log::warn!("app is not encrypted, encryption will not be enforced");
        }

        self
    }

    /// Pretty printed manifest, four space indentation.
    ///
    /// Keys that were in the parsed manifest keep their place, keys added by the release go at the end.
    pub fn to_json_pretty(&self) -> Result<Vec<u8>, ReleaseError> {
        let value = match serde_json::to_value(self)? {
            Value::Object(map) => {
                let mut ordered = Map::new();
                for key in self.key_order.iter() {
                    if let Some(v) = map.get(key) {
                        ordered.insert(key.clone(), v.clone());
                    }
                }
                for (key, v) in map {
                    if !ordered.contains_key(&key) {
                        ordered.insert(key, v);
                    }
                }
                Value::Object(ordered)
            }
            other => other,
        };

        let mut out = vec![];
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        value.serialize(&mut ser)?;
        Ok(out)
    }
}
