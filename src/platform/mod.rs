//! The platform descriptor and plugin surface the host optimizer talks to.
mod job;

pub use crate::platform::job::Job;

use std::sync::Arc;

use crate::config::{Configuration, DEFAULTS, TEMP_DIR_PROPERTY};
use crate::cost::LoadProfileToTimeConverter;
use crate::error::ConfigError;
use crate::executor::{Executor, ShardGraphExecutor};
use crate::fs::LocalFileSystem;
use crate::mapping::{self, Mapping};
use crate::plan::ChannelKind;

pub const PLATFORM_NAME: &str = "ShardGraph";

/// Turns a channel of one kind into a channel of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConversion {
    pub from: ChannelKind,
    pub to: ChannelKind,
}

pub type ExecutorFactory = fn(&Job) -> Result<Box<dyn Executor>, ConfigError>;

/// An execution platform as registered with the host.
pub trait Platform: Send + Sync {
    fn name(&self) -> &str;

    /// Loads the platform's bundled property defaults into `configuration`.
    fn configure_defaults(&self, configuration: &mut Configuration);

    fn mappings(&self) -> &[Arc<dyn Mapping>];

    fn executor_factory(&self) -> ExecutorFactory;

    fn channel_conversions(&self) -> Vec<ChannelConversion>;

    fn create_load_profile_to_time_converter(
        &self,
        configuration: &Configuration,
    ) -> Result<LoadProfileToTimeConverter, ConfigError>;
}

/// Capabilities a plugin contributes to the host.
pub trait Plugin {
    fn mappings(&self) -> Vec<Arc<dyn Mapping>>;

    fn required_platforms(&self) -> Vec<Arc<dyn Platform>>;

    fn channel_conversions(&self) -> Vec<ChannelConversion>;

    fn set_properties(&self, configuration: &mut Configuration);
}

/// The embedded graph engine as a platform. Constructed explicitly and shared
/// through an [`Arc`] by whoever needs it.
#[derive(Clone)]
pub struct ShardGraphPlatform {
    mappings: Vec<Arc<dyn Mapping>>,
}

impl ShardGraphPlatform {
    pub fn new() -> Self {
        Self {
            mappings: mapping::all(),
        }
    }
}

impl Default for ShardGraphPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn create_executor(job: &Job) -> Result<Box<dyn Executor>, ConfigError> {
    Ok(Box::new(ShardGraphExecutor::new(job)?))
}

impl Platform for ShardGraphPlatform {
    fn name(&self) -> &str {
        PLATFORM_NAME
    }

    fn configure_defaults(&self, configuration: &mut Configuration) {
        configuration
            .load(DEFAULTS)
            .expect("bundled defaults are well formed");
    }

    fn mappings(&self) -> &[Arc<dyn Mapping>] {
        &self.mappings
    }

    fn executor_factory(&self) -> ExecutorFactory {
        create_executor
    }

    fn channel_conversions(&self) -> Vec<ChannelConversion> {
        Vec::new()
    }

    fn create_load_profile_to_time_converter(
        &self,
        configuration: &Configuration,
    ) -> Result<LoadProfileToTimeConverter, ConfigError> {
        LoadProfileToTimeConverter::from_configuration(configuration)
    }
}

impl Plugin for ShardGraphPlatform {
    fn mappings(&self) -> Vec<Arc<dyn Mapping>> {
        self.mappings.clone()
    }

    fn required_platforms(&self) -> Vec<Arc<dyn Platform>> {
        vec![Arc::new(self.clone())]
    }

    fn channel_conversions(&self) -> Vec<ChannelConversion> {
        Vec::new()
    }

    // Everything is set up by `configure_defaults` already.
    fn set_properties(&self, _: &mut Configuration) {}
}

/// Activates the default capabilities of a [`ShardGraphPlatform`].
pub struct ShardGraphPlugin {
    platform: Arc<ShardGraphPlatform>,
}

impl ShardGraphPlugin {
    pub fn new(platform: Arc<ShardGraphPlatform>) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> &Arc<ShardGraphPlatform> {
        &self.platform
    }
}

impl Plugin for ShardGraphPlugin {
    fn mappings(&self) -> Vec<Arc<dyn Mapping>> {
        mapping::all()
    }

    fn required_platforms(&self) -> Vec<Arc<dyn Platform>> {
        vec![self.platform.clone()]
    }

    fn channel_conversions(&self) -> Vec<ChannelConversion> {
        Vec::new()
    }

    fn set_properties(&self, configuration: &mut Configuration) {
        if let Some(dir) = LocalFileSystem::find_temp_dir() {
            configuration.set_property(TEMP_DIR_PROPERTY, dir.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CORES_PROPERTY, SCHEDULING_PROPERTY};
    use crate::cost::{LoadEstimate, LoadProfile};
    use crate::mapping::{LogicalOperator, MappingRegistry};

    #[test]
    fn test_descriptor() {
        let platform = ShardGraphPlatform::new();
        assert_eq!(Platform::name(&platform), "ShardGraph");
        assert!(Platform::channel_conversions(&platform).is_empty());
        assert_eq!(Platform::mappings(&platform).len(), 1);
        assert_eq!(Plugin::required_platforms(&platform)[0].name(), "ShardGraph");
    }

    #[test]
    fn test_configure_defaults() {
        let platform = ShardGraphPlatform::new();
        let mut config = Configuration::new();
        platform.configure_defaults(&mut config);

        assert_eq!(config.get_long_property(CORES_PROPERTY).unwrap(), 2);
        assert_eq!(
            config.get_string_property(SCHEDULING_PROPERTY).unwrap(),
            "propagate"
        );

        let converter = platform
            .create_load_profile_to_time_converter(&config)
            .unwrap();
        let estimate = converter.convert(&LoadProfile {
            cpu: LoadEstimate::exact(0),
            disk: LoadEstimate::exact(1_000_000),
            network: LoadEstimate::exact(0),
        });
        assert!((estimate.lower_ms - 2.7).abs() < 1e-9);
    }

    #[test]
    fn test_executor_factory() {
        let platform = ShardGraphPlatform::new();
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Configuration::with_defaults();
        config.set_property(TEMP_DIR_PROPERTY, tmp.path().to_str().unwrap());

        let executor = (platform.executor_factory())(&Job::new("j1", config)).unwrap();
        assert_eq!(executor.platform(), "ShardGraph");

        let mut config = Configuration::with_defaults();
        config.set_property(SCHEDULING_PROPERTY, "sideways");
        assert!(matches!(
            (platform.executor_factory())(&Job::new("j2", config)),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_plugin() {
        let platform = Arc::new(ShardGraphPlatform::new());
        let plugin = ShardGraphPlugin::new(platform.clone());

        let mut config = Configuration::new();
        plugin.set_properties(&mut config);
        assert_eq!(
            config.contains(TEMP_DIR_PROPERTY),
            LocalFileSystem::find_temp_dir().is_some()
        );

        assert!(plugin.channel_conversions().is_empty());
        assert_eq!(plugin.required_platforms().len(), 1);

        let registry = MappingRegistry::from_mappings(&plugin.mappings());
        let replacement = registry
            .apply(&LogicalOperator::PageRank { num_iterations: 2 }, 1)
            .unwrap();
        assert_eq!(replacement.platform, platform.name());
    }
}
