// 运行环境检测模块
//
// 为默认监听地址和 /api/info 提供平台信息

use serde::Serialize;
use std::fs;
use std::path::Path;
use sysinfo::System;

/// 操作系统类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OsType {
    Windows,
    Linux,
    MacOS,
    Unknown,
}

impl OsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsType::Windows => "Windows",
            OsType::Linux => "Linux",
            OsType::MacOS => "macOS",
            OsType::Unknown => "Unknown",
        }
    }
}

/// 平台信息（序列化给客户端）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformInfo {
    /// 操作系统
    pub os: String,
    /// CPU 架构
    pub arch: String,
    /// unix / windows
    pub family: String,
    /// 操作系统版本（无法获取时为空）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    /// 主机名
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// 是否运行在 Docker 中
    pub is_docker: bool,
}

/// 环境检测器
pub struct EnvDetector;

impl EnvDetector {
    /// 检测是否在 Docker 环境中
    ///
    /// 依次检查 /.dockerenv、/proc/1/cgroup 和 container 环境变量
    pub fn is_docker() -> bool {
        if Path::new("/.dockerenv").exists() {
            return true;
        }

        if let Ok(content) = fs::read_to_string("/proc/1/cgroup") {
            if content.contains("docker") || content.contains("containerd") {
                return true;
            }
        }

        std::env::var("container").is_ok()
    }

    /// 根据编译目标返回操作系统类型
    pub fn get_os_type() -> OsType {
        #[cfg(target_os = "windows")]
        return OsType::Windows;

        #[cfg(target_os = "macos")]
        return OsType::MacOS;

        #[cfg(target_os = "linux")]
        return OsType::Linux;

        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        return OsType::Unknown;
    }

    /// 采集平台信息
    pub fn platform_info() -> PlatformInfo {
        PlatformInfo {
            os: Self::get_os_type().as_str().to_string(),
            arch: std::env::consts::ARCH.to_string(),
            family: std::env::consts::FAMILY.to_string(),
            os_version: System::long_os_version().or_else(System::os_version),
            hostname: System::host_name(),
            is_docker: Self::is_docker(),
        }
    }
}
