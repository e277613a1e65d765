use crate::config::Config;
use crate::error::ConfigError;

const MAX_THREADS: usize = 64;
const MAX_STEP_DELAY_MS: u64 = 60_000;

/// Check every field and return all violations, not just the first.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.server.port == 0 {
        errors.push(ConfigError::invalid("server.port", "must not be 0"));
    }
    if config.server.bind.trim().is_empty() {
        errors.push(ConfigError::invalid("server.bind", "must not be empty"));
    }
    if !(1..=MAX_THREADS).contains(&config.demo.threads) {
        errors.push(ConfigError::invalid(
            "demo.threads",
            format!("must be 1 to {MAX_THREADS}, got {}", config.demo.threads),
        ));
    }
    if config.demo.step_delay_ms > MAX_STEP_DELAY_MS {
        errors.push(ConfigError::invalid(
            "demo.step_delay_ms",
            format!(
                "must be at most {MAX_STEP_DELAY_MS}, got {}",
                config.demo.step_delay_ms
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
