use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;

use crate::webauthn::{
    AttestationConveyance, AttestationFormat, AttestationPolicy, AuthenticatorAttachment,
    CoseAlgorithm, Fido2Error, UserVerificationRequirement,
};

/// Smallest challenge accepted by `validate`; shorter values are guessable
pub const MIN_CHALLENGE_SIZE: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Fido2Settings {
    pub relying_party: RelyingPartySettings,
    pub logging: LoggingSettings,
}

/// Relying party identity and ceremony defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelyingPartySettings {
    pub rp_id: String,
    pub rp_name: String,
    pub rp_icon: Option<String>,
    /// Origin the CLI expects when none is given with a request
    pub rp_origin: String,
    /// Advisory timeout sent to the client, in milliseconds
    pub timeout_ms: u64,
    pub challenge_size: usize,
    /// COSE algorithm identifiers, most preferred first
    pub crypto_params: Vec<i64>,
    pub attestation: AttestationConveyance,
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
    pub require_resident_key: bool,
    pub user_verification: UserVerificationRequirement,
    /// Attestation statement formats accepted at registration
    pub attestation_formats: Vec<String>,
    /// Verify unknown formats as `none` instead of rejecting them
    pub tolerate_unsupported_formats: bool,
    /// Client extensions sent with every options object, by identifier
    pub extensions: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for RelyingPartySettings {
    fn default() -> Self {
        Self {
            rp_id: "localhost".to_string(),
            rp_name: "Anonymous Service".to_string(),
            rp_icon: None,
            rp_origin: "https://localhost".to_string(),
            timeout_ms: 60_000,
            challenge_size: 64,
            crypto_params: vec![CoseAlgorithm::ES256.id(), CoseAlgorithm::RS256.id()],
            attestation: AttestationConveyance::Direct,
            authenticator_attachment: None,
            require_resident_key: false,
            user_verification: UserVerificationRequirement::Preferred,
            attestation_formats: AttestationFormat::SUPPORTED
                .iter()
                .map(|format| format.name().to_string())
                .collect(),
            tolerate_unsupported_formats: false,
            extensions: BTreeMap::new(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl RelyingPartySettings {
    /// Reject settings no ceremony could run with
    ///
    /// # Errors
    /// Returns `ConfigurationError` naming the first invalid field
    pub fn validate(&self) -> Result<(), Fido2Error> {
        if self.rp_id.trim().is_empty() {
            return Err(Fido2Error::ConfigurationError(
                "rp_id must not be empty".to_string(),
            ));
        }
        if self.challenge_size < MIN_CHALLENGE_SIZE {
            return Err(Fido2Error::ConfigurationError(format!(
                "challenge_size must be at least {MIN_CHALLENGE_SIZE} bytes, got {}",
                self.challenge_size
            )));
        }
        if self.timeout_ms == 0 {
            return Err(Fido2Error::ConfigurationError(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        self.algorithms()?;
        self.attestation_policy()?;
        Ok(())
    }

    /// `crypto_params` as algorithms, in preference order
    ///
    /// # Errors
    /// Returns `ConfigurationError` if the list is empty or names an unknown algorithm
    pub fn algorithms(&self) -> Result<Vec<CoseAlgorithm>, Fido2Error> {
        if self.crypto_params.is_empty() {
            return Err(Fido2Error::ConfigurationError(
                "crypto_params must list at least one algorithm".to_string(),
            ));
        }
        self.crypto_params
            .iter()
            .map(|&id| {
                CoseAlgorithm::try_from(id).map_err(|_| {
                    Fido2Error::ConfigurationError(format!("Unknown COSE algorithm {id}"))
                })
            })
            .collect()
    }

    /// Attestation format policy described by these settings
    ///
    /// # Errors
    /// Returns `ConfigurationError` for a format name this crate does not implement
    pub fn attestation_policy(&self) -> Result<AttestationPolicy, Fido2Error> {
        let allowed_formats = self
            .attestation_formats
            .iter()
            .map(|name| {
                let format = AttestationFormat::from_name(name);
                if format.is_supported() {
                    Ok(format)
                } else {
                    Err(Fido2Error::ConfigurationError(format!(
                        "Unknown attestation format {name}"
                    )))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AttestationPolicy {
            allowed_formats,
            tolerate_unsupported: self.tolerate_unsupported_formats,
        })
    }
}

impl Fido2Settings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read or parsed
    /// - TOML parsing fails
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        // Load base settings from TOML or defaults
        let mut settings = Self::load_base_settings()?;

        // Apply environment variable overrides
        Self::apply_env_overrides(&mut settings);

        Self::initialize_logging(&settings.logging);
        Ok(settings)
    }

    /// Start `env_logger`, with `RUST_LOG` taking precedence over the configured level
    fn initialize_logging(logging_settings: &LoggingSettings) {
        let env = env_logger::Env::default().default_filter_or(logging_settings.level.as_str());
        // A logger installed by the embedding application wins
        if env_logger::Builder::from_env(env).try_init().is_err() {
            log::debug!("Logger already initialized");
        }
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `FIDO2_CONFIG_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read
    /// - TOML parsing fails
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        let default_config_path = std::path::PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_file(&default_config_path)?;
            eprintln!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Ok(config_dir) = std::env::var("FIDO2_CONFIG_DIR") {
            let config_path = std::path::Path::new(&config_dir).join("Settings.toml");
            if config_path.exists() {
                settings = Self::from_file(&config_path)?;
                eprintln!("✓ Overriding settings from {}", config_path.display());
            } else {
                eprintln!(
                    "ℹ FIDO2_CONFIG_DIR set but no Settings.toml found at: {}",
                    config_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse one settings file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML
    pub fn from_file(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let toml_content = fs::read_to_string(path)?;
        Ok(basic_toml::from_str(&toml_content)?)
    }

    /// Apply environment variable overrides to settings
    fn apply_env_overrides(settings: &mut Self) {
        Self::apply_relying_party_env_overrides(&mut settings.relying_party);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    /// Apply environment overrides for relying party settings
    pub fn apply_relying_party_env_overrides(rp_settings: &mut RelyingPartySettings) {
        if let Ok(rp_id) = std::env::var("RP_ID") {
            rp_settings.rp_id = rp_id;
        }
        if let Ok(rp_name) = std::env::var("RP_NAME") {
            rp_settings.rp_name = rp_name;
        }
        if let Ok(rp_icon) = std::env::var("RP_ICON") {
            rp_settings.rp_icon = (!rp_icon.is_empty()).then_some(rp_icon);
        }
        if let Ok(rp_origin) = std::env::var("RP_ORIGIN") {
            rp_settings.rp_origin = rp_origin;
        }
        Self::apply_parsed_env_override("FIDO2_TIMEOUT_MS", &mut rp_settings.timeout_ms);
        Self::apply_parsed_env_override("FIDO2_CHALLENGE_SIZE", &mut rp_settings.challenge_size);
        Self::apply_parsed_env_override("FIDO2_ATTESTATION", &mut rp_settings.attestation);
        Self::apply_parsed_env_override(
            "FIDO2_USER_VERIFICATION",
            &mut rp_settings.user_verification,
        );
    }

    /// Overwrite `target` when `env_var` is set and parses; invalid values are reported and ignored
    fn apply_parsed_env_override<T>(env_var: &str, target: &mut T)
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        if let Ok(value_str) = std::env::var(env_var) {
            match value_str.parse::<T>() {
                Ok(value) => *target = value,
                Err(e) => eprintln!("⚠️  Ignoring {env_var}={value_str}: {e}"),
            }
        }
    }

    /// Apply environment overrides for logging settings
    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("FIDO2_LOG_LEVEL") {
            logging_settings.level = log_level;
        }
    }
}
