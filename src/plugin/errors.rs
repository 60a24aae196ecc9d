use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("plugin '{name}' is not registered")]
    NotFound { name: String },

    #[error("plugin '{name}' is already registered")]
    Duplicate { name: String },

    #[error("plugin '{plugin}' depends on '{dependency}', which is not registered")]
    DependencyMissing { plugin: String, dependency: String },

    #[error("plugin '{plugin}' could not enable dependency '{dependency}': {source}")]
    DependencyFailed {
        plugin: String,
        dependency: String,
        #[source]
        source: Box<PluginError>,
    },

    #[error("plugin '{plugin}' failed to start: {message}")]
    StartFailed { plugin: String, message: String },

    #[error("plugin '{plugin}' failed to stop: {message}")]
    StopFailed { plugin: String, message: String },

    #[error("plugin '{plugin}' is required and cannot be disabled")]
    Required { plugin: String },

    #[error("plugin '{plugin}' is needed by enabled plugins: {}", .dependents.join(", "))]
    DependentsEnabled {
        plugin: String,
        dependents: Vec<String>,
    },
}
