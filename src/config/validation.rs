use std::{collections::HashSet, net::SocketAddr};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::models::{CorsConfig, ServerConfig, ShipConfig};

/// Ship ids appear in URL paths
static SHIP_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("invalid ship id regex"));

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Duplicate ship id '{id}'")]
    DuplicateShip { id: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if config.auth.jwt_secret.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "auth.jwt_secret".to_string(),
            });
        }
        if let Err(e) = Self::validate_duration("auth.token_ttl", &config.auth.token_ttl) {
            errors.push(e);
        }

        if let Err(mut cors_errors) = Self::validate_cors(&config.cors) {
            errors.append(&mut cors_errors);
        }

        for (key, raw) in config.router.durations() {
            if let Err(e) = Self::validate_duration(key, raw) {
                errors.push(e);
            }
        }
        if config.router.monitor_interface.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "router.monitor_interface".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for (i, ship) in config.ships.iter().enumerate() {
            if !seen.insert(ship.id.as_str()) {
                errors.push(ValidationError::DuplicateShip {
                    id: ship.id.clone(),
                });
            }
            if let Err(mut ship_errors) = Self::validate_ship(i, ship) {
                errors.append(&mut ship_errors);
            }
        }

        if let Some(default_ship) = &config.portal.default_ship_id {
            if config.ship(default_ship).is_none() {
                errors.push(ValidationError::InvalidField {
                    field: "portal.default_ship_id".to_string(),
                    message: format!("No ship with id '{default_ship}' is configured"),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Durations must parse with humantime and be non-zero
    fn validate_duration(field: &str, raw: &str) -> ValidationResult<()> {
        match humantime::parse_duration(raw.trim()) {
            Ok(d) if d.is_zero() => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: "Duration must be greater than zero".to_string(),
            }),
            Ok(_) => Ok(()),
            Err(e) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("Invalid duration '{raw}': {e}"),
            }),
        }
    }

    fn validate_cors(cors: &CorsConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        for (i, origin) in cors.allowed_origins.iter().enumerate() {
            if let Err(e) = Self::validate_origin(origin, &format!("cors.allowed_origins[{i}]")) {
                errors.push(e);
            }
        }
        if let Err(e) = Self::validate_duration("cors.max_age", &cors.max_age) {
            errors.push(e);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Origins are scheme + host (+ port), without a path
    fn validate_origin(origin: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(origin) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "Origin scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }
                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "Origin must have a valid host".to_string(),
                    });
                }
                if url.path() != "/" || url.query().is_some() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "Origin must not carry a path or query".to_string(),
                    });
                }
                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid origin format: {e}"),
            }),
        }
    }

    fn validate_ship(index: usize, ship: &ShipConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let context = format!("ships[{index}]");

        if !SHIP_ID_PATTERN.is_match(&ship.id) {
            errors.push(ValidationError::InvalidField {
                field: format!("{context}.id"),
                message: format!(
                    "Ship id '{}' must be alphanumeric (plus '_', '-', '.')",
                    ship.id
                ),
            });
        }

        // An empty router_ip is allowed: the ship is served in degraded mode
        if !ship.router_ip.trim().is_empty() {
            if ship.router_port == 0 {
                errors.push(ValidationError::InvalidField {
                    field: format!("{context}.router_port"),
                    message: "Port must be non-zero".to_string(),
                });
            }
            if ship.ssh_port == 0 {
                errors.push(ValidationError::InvalidField {
                    field: format!("{context}.ssh_port"),
                    message: "Port must be non-zero".to_string(),
                });
            }
            if ship.router_user.trim().is_empty() {
                errors.push(ValidationError::MissingField {
                    field: format!("{context}.router_user"),
                });
            }
        }

        let mut crew_names = HashSet::new();
        for crew in &ship.crew {
            if crew.username.trim().is_empty() {
                errors.push(ValidationError::MissingField {
                    field: format!("{context}.crew.username"),
                });
            } else if !crew_names.insert(crew.username.as_str()) {
                errors.push(ValidationError::InvalidField {
                    field: format!("{context}.crew"),
                    message: format!("Duplicate crew username '{}'", crew.username),
                });
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
