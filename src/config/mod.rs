pub mod loader;
pub mod types;

pub use types::{
    BlackBarDetectionSettings, ChannelsCalculationSettings, CqCalculationSettings, EncoderKind,
    ExportOutputSettings, Profile, ResolutionCalculationSettings, StageToggle, TestSettings,
    ToolsConfig,
};
