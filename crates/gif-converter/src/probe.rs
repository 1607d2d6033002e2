//! ffmpeg のビルド情報からハードウェアアクセラレーションのヒントを決める。
//!
//! 判定は文字列の部分一致のみで、デバイスの存在やフラグが受け付けられるかは確認しない。

use std::{fmt, path::PathBuf, process::Command, str::FromStr};

use thiserror::Error;
use tracing::debug;

use crate::ffmpeg::ToolError;

/// ビルド情報から判別する GPU ベンダー。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    Nvidia,
    Amd,
    Intel,
}

impl Vendor {
    /// `-hwaccel_output_format` に渡す値。
    pub fn output_format(self) -> &'static str {
        match self {
            Vendor::Nvidia => "cuda",
            Vendor::Amd => "opencl",
            Vendor::Intel => "qsv",
        }
    }

    /// このベンダー向けに GIF ライターへ渡すフラグ。
    pub fn hint_args(self) -> Vec<String> {
        vec![
            "-hwaccel_device".to_string(),
            "0".to_string(),
            "-hwaccel_output_format".to_string(),
            self.output_format().to_string(),
        ]
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vendor::Nvidia => write!(f, "nvidia"),
            Vendor::Amd => write!(f, "amd"),
            Vendor::Intel => write!(f, "intel"),
        }
    }
}

/// ビルド情報に含まれていたベンダーの目印。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccelerationProfile {
    pub nvidia: bool,
    pub amd: bool,
    pub intel: bool,
}

impl AccelerationProfile {
    /// `ffmpeg -version` の出力を分類する。
    pub fn from_report(report: &str) -> Self {
        let report = report.to_lowercase();
        Self {
            nvidia: report.contains("cuda") || report.contains("nvenc"),
            amd: report.contains("amf") || report.contains("opencl"),
            intel: report.contains("qsv"),
        }
    }

    pub fn any(&self) -> bool {
        self.nvidia || self.amd || self.intel
    }

    pub fn has(&self, vendor: Vendor) -> bool {
        match vendor {
            Vendor::Nvidia => self.nvidia,
            Vendor::Amd => self.amd,
            Vendor::Intel => self.intel,
        }
    }

    /// 検出されたベンダーのうち優先度が最も高いもの。NVIDIA、Intel、AMD の順。
    pub fn preferred_vendor(&self) -> Option<Vendor> {
        [Vendor::Nvidia, Vendor::Intel, Vendor::Amd]
            .into_iter()
            .find(|&v| self.has(v))
    }
}

/// ffmpeg のビルド情報を取得する。
pub trait CapabilityProbe {
    fn version_report(&self) -> Result<String, ToolError>;
}

/// `<ffmpeg> -version` を実行する。
#[derive(Debug, Clone)]
pub struct FfmpegVersionProbe {
    program: PathBuf,
}

impl FfmpegVersionProbe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl CapabilityProbe for FfmpegVersionProbe {
    fn version_report(&self) -> Result<String, ToolError> {
        let program = self.program.display().to_string();
        let output = Command::new(&self.program)
            .arg("-version")
            .output()
            .map_err(|source| ToolError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ToolError::Failed {
                program,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// ビルド情報を一度だけ取得する。失敗した場合はログに残し、アクセラレーションなしとして扱う。
pub fn detect_acceleration(probe: &dyn CapabilityProbe) -> Option<AccelerationProfile> {
    match probe.version_report() {
        Ok(report) => {
            let profile = AccelerationProfile::from_report(&report);
            debug!(?profile, "Capability report classified");
            Some(profile)
        }
        Err(e) => {
            debug!(error = %e, "Capability probe failed, assuming no acceleration");
            None
        }
    }
}

/// 検出結果からライターに渡すフラグを決める方針。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HwAccelPolicy {
    /// 検出された中で優先度が最も高いベンダーのフラグを使う
    #[default]
    Vendor,
    /// いずれかのベンダーが検出されれば NVIDIA のフラグを使う
    NvidiaCompat,
    /// 検出もフラグの受け渡しも行わない
    Off,
}

impl HwAccelPolicy {
    /// `Off` 以外なら検出を行い、渡すヒントを選ぶ。
    pub fn select(self, probe: &dyn CapabilityProbe) -> Option<AccelHints> {
        if self == HwAccelPolicy::Off {
            return None;
        }
        let profile = detect_acceleration(probe)?;
        self.hints_for(&profile)
    }

    pub fn hints_for(self, profile: &AccelerationProfile) -> Option<AccelHints> {
        let vendor = match self {
            HwAccelPolicy::Vendor => profile.preferred_vendor()?,
            HwAccelPolicy::NvidiaCompat if profile.any() => Vendor::Nvidia,
            HwAccelPolicy::NvidiaCompat | HwAccelPolicy::Off => return None,
        };
        Some(AccelHints {
            vendor,
            args: vendor.hint_args(),
        })
    }
}

impl fmt::Display for HwAccelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HwAccelPolicy::Vendor => write!(f, "vendor"),
            HwAccelPolicy::NvidiaCompat => write!(f, "nvidia-compat"),
            HwAccelPolicy::Off => write!(f, "off"),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown hwaccel policy `{0}` (expected vendor, nvidia-compat or off)")]
pub struct ParsePolicyError(String);

impl FromStr for HwAccelPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vendor" => Ok(HwAccelPolicy::Vendor),
            "nvidia-compat" => Ok(HwAccelPolicy::NvidiaCompat),
            "off" | "none" => Ok(HwAccelPolicy::Off),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}

/// GIF ライターに渡すフラグと、その対象ベンダー。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccelHints {
    pub vendor: Vendor,
    pub args: Vec<String>,
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct FakeProbe {
        report: Option<&'static str>,
        calls: Cell<u32>,
    }

    impl FakeProbe {
        fn reporting(report: &'static str) -> Self {
            Self {
                report: Some(report),
                calls: Cell::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                report: None,
                calls: Cell::new(0),
            }
        }
    }

    impl CapabilityProbe for FakeProbe {
        fn version_report(&self) -> Result<String, ToolError> {
            self.calls.set(self.calls.get() + 1);
            match self.report {
                Some(report) => Ok(report.to_string()),
                None => Err(ToolError::Spawn {
                    program: "ffmpeg".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                }),
            }
        }
    }

    const AMD_ONLY: &str = "ffmpeg version 6.1\nconfiguration: --enable-gpl --enable-AMF --enable-libx264";
    const NVIDIA: &str = "ffmpeg version 6.1\nconfiguration: --enable-cuda-llvm --enable-nvenc";
    const PLAIN: &str = "ffmpeg version 6.1\nconfiguration: --enable-gpl --enable-libx264";

    #[test]
    fn classifies_vendor_markers() {
        assert_eq!(
            AccelerationProfile::from_report(AMD_ONLY),
            AccelerationProfile {
                nvidia: false,
                amd: true,
                intel: false
            }
        );
        assert_eq!(
            AccelerationProfile::from_report("--enable-opencl --enable-libmfx --enable-QSV"),
            AccelerationProfile {
                nvidia: false,
                amd: true,
                intel: true
            }
        );
        assert!(AccelerationProfile::from_report(NVIDIA).nvidia);
        assert!(!AccelerationProfile::from_report(PLAIN).any());
    }

    #[test]
    fn preferred_vendor_order() {
        let all = AccelerationProfile {
            nvidia: true,
            amd: true,
            intel: true,
        };
        assert_eq!(all.preferred_vendor(), Some(Vendor::Nvidia));

        let amd_intel = AccelerationProfile {
            amd: true,
            intel: true,
            ..Default::default()
        };
        assert_eq!(amd_intel.preferred_vendor(), Some(Vendor::Intel));
        assert_eq!(AccelerationProfile::default().preferred_vendor(), None);
    }

    #[test]
    fn amd_report_gets_amd_flags_under_vendor_policy() {
        let probe = FakeProbe::reporting(AMD_ONLY);

        let hints = HwAccelPolicy::Vendor.select(&probe).unwrap();

        assert_eq!(hints.vendor, Vendor::Amd);
        assert_eq!(
            hints.args,
            ["-hwaccel_device", "0", "-hwaccel_output_format", "opencl"]
        );
        assert_eq!(probe.calls.get(), 1);
    }

    #[test]
    fn amd_report_gets_nvidia_flags_under_compat_policy() {
        let probe = FakeProbe::reporting(AMD_ONLY);

        let hints = HwAccelPolicy::NvidiaCompat.select(&probe).unwrap();

        assert_eq!(hints.vendor, Vendor::Nvidia);
        assert_eq!(
            hints.args,
            ["-hwaccel_device", "0", "-hwaccel_output_format", "cuda"]
        );
    }

    #[test]
    fn off_policy_never_probes() {
        let probe = FakeProbe::reporting(NVIDIA);

        assert_eq!(HwAccelPolicy::Off.select(&probe), None);
        assert_eq!(probe.calls.get(), 0);
    }

    #[test]
    fn probe_failure_means_no_hints() {
        let probe = FakeProbe::failing();

        assert_eq!(detect_acceleration(&probe), None);
        assert_eq!(HwAccelPolicy::Vendor.select(&probe), None);
        assert_eq!(HwAccelPolicy::NvidiaCompat.select(&probe), None);
    }

    #[test]
    fn plain_build_means_no_hints() {
        let probe = FakeProbe::reporting(PLAIN);

        assert_eq!(HwAccelPolicy::Vendor.select(&probe), None);
        assert_eq!(HwAccelPolicy::NvidiaCompat.select(&probe), None);
    }

    #[test]
    fn missing_binary_is_probe_error() {
        let probe = FfmpegVersionProbe::new("/nonexistent/bin/ffmpeg");
        assert!(matches!(
            probe.version_report(),
            Err(ToolError::Spawn { .. })
        ));
    }

    #[test]
    fn policy_parses_from_str() {
        assert_eq!("vendor".parse::<HwAccelPolicy>().unwrap(), HwAccelPolicy::Vendor);
        assert_eq!(
            "NVIDIA-COMPAT".parse::<HwAccelPolicy>().unwrap(),
            HwAccelPolicy::NvidiaCompat
        );
        assert_eq!("off".parse::<HwAccelPolicy>().unwrap(), HwAccelPolicy::Off);
        assert!("cuda".parse::<HwAccelPolicy>().is_err());
        assert_eq!(HwAccelPolicy::NvidiaCompat.to_string(), "nvidia-compat");
    }
}
