use std::env;

/// Deployment flavour of the process hosting a region. Selects the log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    /// Reads `ENVIRONMENT`, defaulting to development.
    pub fn from_env() -> Self {
        env::var("ENVIRONMENT")
            .map(|value| Self::from_value(&value))
            .unwrap_or(Environment::Development)
    }

    pub fn from_value(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}
