use thiserror::Error;

/// An environment variable required by the application is not set.
#[derive(Debug, Error)]
#[error("Missing environment variable: {0}")]
pub struct MissingEnvVarError(pub String);

/// Reads an environment variable, returning a structured error if it's missing.
///
/// An empty value is treated the same as an unset one.
///
/// # Arguments
/// * `name` - The name of the environment variable to read.
pub fn get_env_var(name: &str) -> Result<String, MissingEnvVarError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(MissingEnvVarError(name.to_string())),
    }
}

/// Returns `configured` when it holds a non-empty value, otherwise falls back
/// to the environment variable `name`.
///
/// Config files may leave secrets out and rely on the environment instead.
pub fn configured_or_env(
    configured: Option<&str>,
    name: &str,
) -> Result<String, MissingEnvVarError> {
    match configured.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => get_env_var(name),
    }
}

/// Like [`configured_or_env`] but yields `None` instead of an error when
/// neither source has a value.
pub fn optional_configured_or_env(configured: Option<&str>, name: &str) -> Option<String> {
    configured_or_env(configured, name).ok()
}
