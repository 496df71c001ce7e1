use serde::{Deserialize, Serialize};

mod behavior;
mod drag_config;
mod operation_config;
mod tab_config;
mod window_position_config;
mod window_size_config;

pub use behavior::StartupBehavior;
pub use drag_config::{
    DragConfig, DEFAULT_DETACH_THRESHOLD, DEFAULT_MAX_TAB_WIDTH, DEFAULT_TAB_STRIP_HEIGHT,
};
pub use operation_config::OperationConfig;
pub use tab_config::{TabConfig, DEFAULT_NEW_TAB_TITLE};
pub use window_position_config::{WindowPosition, WindowPositionConfig, WindowPositionOffset};
pub use window_size_config::{WindowSize, WindowSizeConfig};

/// Global application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub tabs: TabConfig,
    pub drag: DragConfig,
    pub operations: OperationConfig,
    pub window_size: WindowSizeConfig,
    pub window_position: WindowPositionConfig,
}
