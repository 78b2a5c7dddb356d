use thiserror::Error;

use crate::errors::AppError;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Startup-time authorization configuration failures.
///
/// None of these are recoverable: the role catalog or a protected route
/// declaration is wrong and the service must not start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read role catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed role catalog: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid role catalog: {0}")]
    Invalid(String),

    #[error("duplicate scope '{0}'")]
    DuplicateScope(String),

    #[error("duplicate role '{role}' in scope '{scope}'")]
    DuplicateRole { scope: String, role: String },

    #[error("permission '{permission}' listed twice on role '{role}' in scope '{scope}'")]
    DuplicatePermission {
        scope: String,
        role: String,
        permission: String,
    },

    #[error("unknown scope '{0}'")]
    UnknownScope(String),

    #[error("permission '{permission}' is not granted by any role in scope '{scope}'")]
    UndeclaredPermission { scope: String, permission: String },

    #[error("route '{route}' does not declare parameter '{param}' required by scope '{scope}'")]
    MissingRouteParam {
        route: String,
        scope: String,
        param: String,
    },

    #[error("no role resolution strategy registered for scope '{0}'")]
    MissingStrategy(String),

    #[error("access rule for route '{0}' declares no scopes")]
    EmptyRule(String),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        AppError::configuration(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_becomes_configuration_app_error() {
        let err: AppError = ConfigError::UnknownScope("nope".into()).into();
        assert!(matches!(err, AppError::Configuration(ref msg) if msg == "unknown scope 'nope'"));
    }

    #[test]
    fn missing_route_param_names_everything() {
        let err = ConfigError::MissingRouteParam {
            route: "/projects".into(),
            scope: "project".into(),
            param: "project_slug".into(),
        };
        assert_eq!(
            err.to_string(),
            "route '/projects' does not declare parameter 'project_slug' required by scope 'project'"
        );
    }
}
