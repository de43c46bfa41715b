//! 设备远程操作集合。
//!
//! 设备控制 API 的报文格式对本层不透明：每个操作只暴露方法名与 JSON 参数，
//! 由传输层负责编码。

use crate::error::DeviceError;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// 散热模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoolingMode {
    Auto,
    Manual,
    Immersion,
}

impl CoolingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::Immersion => "immersion",
        }
    }
}

impl std::str::FromStr for CoolingMode {
    type Err = DeviceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            "immersion" => Ok(Self::Immersion),
            other => Err(DeviceError::Validation(format!(
                "unknown cooling mode: {other}"
            ))),
        }
    }
}

/// 远程操作。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum DeviceOperation {
    GetStatus,
    SetPowerTarget { watts: u32 },
    SetCoolingMode { mode: CoolingMode },
    Reboot,
}

impl DeviceOperation {
    pub fn method(&self) -> &'static str {
        match self {
            Self::GetStatus => "get_status",
            Self::SetPowerTarget { .. } => "set_power_target",
            Self::SetCoolingMode { .. } => "set_cooling_mode",
            Self::Reboot => "reboot",
        }
    }

    pub fn params(&self) -> serde_json::Value {
        match self {
            Self::GetStatus | Self::Reboot => json!({}),
            Self::SetPowerTarget { watts } => json!({ "watts": watts }),
            Self::SetCoolingMode { mode } => json!({ "mode": mode.as_str() }),
        }
    }

    /// 会改变设备状态的操作；执行后需要使状态缓存失效。
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::GetStatus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooling_mode_parses_case_insensitive() {
        assert_eq!("Immersion".parse::<CoolingMode>().ok(), Some(CoolingMode::Immersion));
        assert!(matches!(
            "turbo".parse::<CoolingMode>(),
            Err(DeviceError::Validation(_))
        ));
    }

    #[test]
    fn operation_params() {
        let op = DeviceOperation::SetPowerTarget { watts: 3000 };
        assert_eq!(op.method(), "set_power_target");
        assert_eq!(op.params()["watts"], 3000);
        assert!(op.is_mutating());
        assert!(!DeviceOperation::GetStatus.is_mutating());
    }
}
