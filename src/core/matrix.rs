//! Configuration matrix: target architecture x platform x build variant.
//!
//! A builder declares the cross product it must be built over and the
//! matrix expands it into an ordered list of [`ConfigEntry`] values, one per
//! configure/build/install cycle. Expansion order is platform-major, then
//! variant, then architecture in declaration order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::host::{Arch, Host};
use crate::core::paths::Paths;

/// Error while expanding or combining configuration matrices.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatrixError {
    #[error("no mapping for architecture `{arch}` on platform `{platform}`")]
    Unsupported { arch: Arch, platform: String },

    #[error("configuration matrix has no {axis} selected")]
    EmptyAxis { axis: &'static str },

    #[error("duplicate configuration entry `{entry}`")]
    Duplicate { entry: String },
}

/// Which device sysroot an entry builds against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SysrootKind {
    /// The platform sysroot (no NDK C++ STL)
    Platform,
    /// The NDK sysroot
    Ndk,
}

impl SysrootKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SysrootKind::Platform => "platform",
            SysrootKind::Ndk => "ndk",
        }
    }
}

/// Where the built code runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetPlatform {
    /// An Android device
    Device(SysrootKind),
    /// A host operating system (the build host, or a cross-compiled one)
    Native(Host),
}

impl TargetPlatform {
    pub fn is_device(&self) -> bool {
        matches!(self, TargetPlatform::Device(_))
    }

    /// Whether the given architecture has a valid mapping on this platform.
    fn supports(&self, arch: Arch) -> bool {
        match self {
            TargetPlatform::Device(_) => true,
            TargetPlatform::Native(Host::Linux) => matches!(arch, Arch::X86_64 | Arch::I386),
            TargetPlatform::Native(Host::Darwin) | TargetPlatform::Native(Host::Windows) => {
                arch == Arch::X86_64
            }
        }
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetPlatform::Device(kind) => write!(f, "android-{}", kind.as_str()),
            TargetPlatform::Native(host) => write!(f, "{}", host),
        }
    }
}

/// Library flavour an entry produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Variant {
    #[default]
    Default,
    Static,
    Shared,
}

impl Variant {
    /// Tag used in output directory suffixes; empty for the default variant.
    pub fn tag(&self) -> &'static str {
        match self {
            Variant::Default => "",
            Variant::Static => "static",
            Variant::Shared => "shared",
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Variant::Shared)
    }
}

/// One point in the configuration matrix.
///
/// Entries are immutable once placed in a builder's configuration list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    target_arch: Arch,
    target_platform: TargetPlatform,
    is_32_bit: bool,
    variant: Variant,
    extra_config: BTreeMap<String, String>,
}

impl ConfigEntry {
    /// Create an entry, failing if the architecture has no mapping on the platform.
    pub fn new(
        arch: Arch,
        platform: TargetPlatform,
        variant: Variant,
    ) -> Result<ConfigEntry, MatrixError> {
        if !platform.supports(arch) {
            return Err(MatrixError::Unsupported {
                arch,
                platform: platform.to_string(),
            });
        }
        Ok(ConfigEntry {
            target_arch: arch,
            target_platform: platform,
            is_32_bit: arch.is_32_bit(),
            variant,
            extra_config: BTreeMap::new(),
        })
    }

    /// The 64-bit native configuration for `host`.
    pub fn host(host: Host) -> ConfigEntry {
        ConfigEntry {
            target_arch: Arch::X86_64,
            target_platform: TargetPlatform::Native(host),
            is_32_bit: false,
            variant: Variant::Default,
            extra_config: BTreeMap::new(),
        }
    }

    /// The cross-compiled Windows host configuration.
    pub fn windows() -> ConfigEntry {
        ConfigEntry::host(Host::Windows)
    }

    pub fn target_arch(&self) -> Arch {
        self.target_arch
    }

    pub fn target_platform(&self) -> TargetPlatform {
        self.target_platform
    }

    pub fn is_32_bit(&self) -> bool {
        self.is_32_bit
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra_config.get(key).map(String::as_str)
    }

    pub fn is_device(&self) -> bool {
        self.target_platform.is_device()
    }

    /// The sysroot kind, for device entries.
    pub fn sysroot_kind(&self) -> Option<SysrootKind> {
        match self.target_platform {
            TargetPlatform::Device(kind) => Some(kind),
            TargetPlatform::Native(_) => None,
        }
    }

    /// Whether this entry builds against the platform sysroot.
    pub fn is_platform(&self) -> bool {
        self.sysroot_kind() == Some(SysrootKind::Platform)
    }

    /// The host OS, for native entries.
    pub fn native_host(&self) -> Option<Host> {
        match self.target_platform {
            TargetPlatform::Native(host) => Some(host),
            TargetPlatform::Device(_) => None,
        }
    }

    /// Clang target triple.
    pub fn target_triple(&self) -> &'static str {
        match self.target_platform {
            TargetPlatform::Device(_) => self.target_arch.llvm_triple(),
            TargetPlatform::Native(Host::Linux) if self.is_32_bit => "i386-unknown-linux-gnu",
            TargetPlatform::Native(Host::Linux) => "x86_64-unknown-linux-gnu",
            TargetPlatform::Native(Host::Darwin) => "x86_64-apple-darwin",
            TargetPlatform::Native(Host::Windows) => "x86_64-pc-windows-gnu",
        }
    }

    /// Minimum Android API level, for device entries.
    pub fn api_level(&self) -> Option<u32> {
        match self.target_platform {
            TargetPlatform::Device(SysrootKind::Platform) => Some(29),
            TargetPlatform::Device(SysrootKind::Ndk) if self.is_32_bit => Some(16),
            TargetPlatform::Device(SysrootKind::Ndk) => Some(21),
            TargetPlatform::Native(_) => None,
        }
    }

    /// Sysroot to compile against. Darwin hosts use the system SDK.
    pub fn sysroot(&self, paths: &Paths) -> Option<PathBuf> {
        match self.target_platform {
            TargetPlatform::Device(kind) => Some(paths.device_sysroot(kind, self.target_arch)),
            TargetPlatform::Native(Host::Linux) => Some(paths.gcc_root(Host::Linux).join("sysroot")),
            TargetPlatform::Native(Host::Windows) => {
                Some(paths.gcc_root(Host::Windows).join("x86_64-w64-mingw32"))
            }
            TargetPlatform::Native(Host::Darwin) => None,
        }
    }

    /// Suffix appended to a builder's output directory for this entry.
    pub fn output_suffix(&self) -> String {
        let mut suffix = String::new();
        match self.target_platform {
            TargetPlatform::Device(kind) => {
                suffix.push('-');
                suffix.push_str(self.target_arch.as_str());
                suffix.push('-');
                suffix.push_str(kind.as_str());
            }
            TargetPlatform::Native(_) => {
                if self.is_32_bit {
                    suffix.push('-');
                    suffix.push_str(self.target_arch.as_str());
                }
            }
        }
        if self.variant != Variant::Default {
            suffix.push('-');
            suffix.push_str(self.variant.tag());
        }
        suffix
    }

    fn key(&self) -> (Arch, TargetPlatform, Variant) {
        (self.target_arch, self.target_platform, self.variant)
    }
}

impl fmt::Display for ConfigEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.target_triple(), self.target_platform)?;
        if self.variant != Variant::Default {
            write!(f, ", {}", self.variant.tag())?;
        }
        write!(f, ")")
    }
}

/// Axis selectors for a builder's configuration matrix.
#[derive(Debug, Clone, Default)]
pub struct ConfigMatrix {
    archs: Vec<Arch>,
    platforms: Vec<TargetPlatform>,
    variants: Vec<Variant>,
    extra: BTreeMap<String, String>,
}

impl ConfigMatrix {
    pub fn new() -> Self {
        ConfigMatrix::default()
    }

    /// Select architectures.
    pub fn archs(mut self, archs: impl IntoIterator<Item = Arch>) -> Self {
        self.archs.extend(archs);
        self
    }

    /// Select a target platform.
    pub fn platform(mut self, platform: TargetPlatform) -> Self {
        self.platforms.push(platform);
        self
    }

    /// Select a build variant. Defaults to [`Variant::Default`] when none is given.
    pub fn variant(mut self, variant: Variant) -> Self {
        self.variants.push(variant);
        self
    }

    /// Attach a key/value pair to every expanded entry.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Expand into the full cross product.
    pub fn expand(&self) -> Result<Vec<ConfigEntry>, MatrixError> {
        if self.archs.is_empty() {
            return Err(MatrixError::EmptyAxis {
                axis: "architecture",
            });
        }
        if self.platforms.is_empty() {
            return Err(MatrixError::EmptyAxis { axis: "platform" });
        }
        let variants: &[Variant] = if self.variants.is_empty() {
            &[Variant::Default]
        } else {
            &self.variants
        };

        let mut entries = Vec::new();
        for &platform in &dedup(&self.platforms) {
            for &variant in &dedup(variants) {
                for &arch in &dedup(&self.archs) {
                    let mut entry = ConfigEntry::new(arch, platform, variant)?;
                    entry.extra_config = self.extra.clone();
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }
}

/// Keep first occurrences, preserving order.
fn dedup<T: Copy + Ord>(items: &[T]) -> Vec<T> {
    let mut seen = BTreeSet::new();
    items.iter().copied().filter(|i| seen.insert(*i)).collect()
}

/// Concatenate expanded lists, rejecting entries that would share an output.
pub fn concat(
    lists: impl IntoIterator<Item = Vec<ConfigEntry>>,
) -> Result<Vec<ConfigEntry>, MatrixError> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for entry in lists.into_iter().flatten() {
        if !seen.insert(entry.key()) {
            return Err(MatrixError::Duplicate {
                entry: entry.to_string(),
            });
        }
        out.push(entry);
    }
    Ok(out)
}

/// Every device architecture against one sysroot kind.
pub fn device_configs(kind: SysrootKind, variant: Variant) -> Result<Vec<ConfigEntry>, MatrixError> {
    ConfigMatrix::new()
        .archs(Arch::DEVICE)
        .platform(TargetPlatform::Device(kind))
        .variant(variant)
        .expand()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_full_cross_product_in_order() {
        let entries = ConfigMatrix::new()
            .archs(Arch::DEVICE)
            .platform(TargetPlatform::Device(SysrootKind::Platform))
            .platform(TargetPlatform::Device(SysrootKind::Ndk))
            .variant(Variant::Static)
            .variant(Variant::Shared)
            .expand()
            .unwrap();

        assert_eq!(entries.len(), 16);
        assert_eq!(entries[0].target_arch(), Arch::Arm);
        assert!(entries[0].is_platform());
        assert_eq!(entries[0].variant(), Variant::Static);
        assert_eq!(entries[3].target_arch(), Arch::X86_64);
        assert_eq!(entries[4].variant(), Variant::Shared);
        assert_eq!(entries[8].sysroot_kind(), Some(SysrootKind::Ndk));

        let suffixes: BTreeSet<_> = entries.iter().map(|e| e.output_suffix()).collect();
        assert_eq!(suffixes.len(), entries.len());
    }

    #[test]
    fn test_expand_is_deterministic() {
        let matrix = ConfigMatrix::new()
            .archs([Arch::X86_64, Arch::Arm, Arch::X86_64])
            .platform(TargetPlatform::Device(SysrootKind::Ndk));
        let first = matrix.expand().unwrap();
        let second = matrix.expand().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].target_arch(), Arch::X86_64);
    }

    #[test]
    fn test_unmapped_native_arch_fails() {
        let err = ConfigMatrix::new()
            .archs([Arch::Arm])
            .platform(TargetPlatform::Native(Host::Linux))
            .expand()
            .unwrap_err();
        assert!(matches!(err, MatrixError::Unsupported { arch: Arch::Arm, .. }));
        assert!(err.to_string().contains("arm"));

        assert!(ConfigEntry::new(Arch::I386, TargetPlatform::Native(Host::Darwin), Variant::Default).is_err());
    }

    #[test]
    fn test_empty_axis_fails() {
        let err = ConfigMatrix::new()
            .platform(TargetPlatform::Device(SysrootKind::Ndk))
            .expand()
            .unwrap_err();
        assert_eq!(err, MatrixError::EmptyAxis { axis: "architecture" });
    }

    #[test]
    fn test_concat_rejects_duplicates() {
        let ndk = device_configs(SysrootKind::Ndk, Variant::Default).unwrap();
        let err = concat([ndk.clone(), ndk]).unwrap_err();
        assert!(matches!(err, MatrixError::Duplicate { .. }));

        let ok = concat([
            device_configs(SysrootKind::Platform, Variant::Static).unwrap(),
            device_configs(SysrootKind::Ndk, Variant::Static).unwrap(),
            device_configs(SysrootKind::Ndk, Variant::Shared).unwrap(),
        ])
        .unwrap();
        assert_eq!(ok.len(), 12);
    }

    #[test]
    fn test_derived_properties() {
        let entry =
            ConfigEntry::new(Arch::I386, TargetPlatform::Device(SysrootKind::Ndk), Variant::Static)
                .unwrap();
        assert_eq!(entry.target_triple(), "i686-linux-android");
        assert_eq!(entry.output_suffix(), "-i386-ndk-static");
        assert_eq!(entry.api_level(), Some(16));
        assert!(entry.is_32_bit());

        let host32 =
            ConfigEntry::new(Arch::I386, TargetPlatform::Native(Host::Linux), Variant::Default)
                .unwrap();
        assert_eq!(host32.target_triple(), "i386-unknown-linux-gnu");
        assert_eq!(host32.output_suffix(), "-i386");

        assert_eq!(ConfigEntry::host(Host::Linux).output_suffix(), "");
        assert_eq!(ConfigEntry::windows().target_triple(), "x86_64-pc-windows-gnu");
    }

    #[test]
    fn test_extra_config_is_carried() {
        let entries = ConfigMatrix::new()
            .archs([Arch::Aarch64])
            .platform(TargetPlatform::Device(SysrootKind::Ndk))
            .extra("suppress_libcxx_headers", "true")
            .expand()
            .unwrap();
        assert_eq!(entries[0].extra("suppress_libcxx_headers"), Some("true"));
        assert_eq!(entries[0].extra("missing"), None);
    }
}
