/// Process settings loaded from defaults, a TOML file and the environment
pub mod settings;

/// Resolution of named infrastructure dependencies to endpoints
pub mod discovery;

pub use discovery::{ServiceEndpoint, ServiceLocator, ServiceName};
pub use settings::{
    BrokerSettings, CacheSettings, DatabaseSettings, EndpointSettings, Settings,
};
