use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::model::PalletProfile;
use crate::packer::LayerStrategy;
use crate::planner::PlanningConfig;

/// Complete application configuration, loaded from environment variables or
/// default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub planner: PlannerConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment
    /// variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            planner: PlannerConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;

    fn from_env() -> Self {
        let host_value =
            env_string("PALLETIZER_API_HOST").unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, effective_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                eprintln!(
                    "⚠️ Could not parse PALLETIZER_API_HOST ('{}'): {}. Using {}.",
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (
                    Self::DEFAULT_HOST
                        .parse::<IpAddr>()
                        .expect("Default host must be valid"),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = match env_string("PALLETIZER_API_PORT") {
            Some(raw) => match raw.parse::<u16>() {
                Ok(value) if value != 0 => value,
                Ok(_) => {
                    eprintln!(
                        "⚠️ PALLETIZER_API_PORT must not be 0. Using {}.",
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
                Err(err) => {
                    eprintln!(
                        "⚠️ Could not parse PALLETIZER_API_PORT ('{}'): {}. Using {}.",
                        raw,
                        err,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
            },
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host: effective_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    /// Configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }

    /// Checks whether the hostname matches the default value.
    pub fn uses_default_host(&self) -> bool {
        self.display_host == Self::DEFAULT_HOST
    }
}

/// Configuration for the pallet planner: the default pallet profile and the
/// layer packing strategy. Both can still be overridden per request.
#[derive(Clone, Debug)]
pub struct PlannerConfig {
    profile: PalletProfile,
    planning: PlanningConfig,
}

impl PlannerConfig {
    const PALLET_LENGTH_VAR: &'static str = "PALLETIZER_PALLET_LENGTH";
    const PALLET_WIDTH_VAR: &'static str = "PALLETIZER_PALLET_WIDTH";
    const PALLET_MAX_HEIGHT_VAR: &'static str = "PALLETIZER_PALLET_MAX_HEIGHT";
    const PALLET_MAX_WEIGHT_VAR: &'static str = "PALLETIZER_PALLET_MAX_WEIGHT";
    const PALLET_TARE_WEIGHT_VAR: &'static str = "PALLETIZER_PALLET_TARE_WEIGHT";
    const LAYER_STRATEGY_VAR: &'static str = "PALLETIZER_LAYER_STRATEGY";

    fn from_env() -> Self {
        let length = load_f64_with_warning(
            Self::PALLET_LENGTH_VAR,
            PalletProfile::DEFAULT_LENGTH,
            |value| value > 0.0,
            "must be greater than 0",
            "Warning: Adjusted pallet footprint changes every layer layout",
        );

        let width = load_f64_with_warning(
            Self::PALLET_WIDTH_VAR,
            PalletProfile::DEFAULT_WIDTH,
            |value| value > 0.0,
            "must be greater than 0",
            "Warning: Adjusted pallet footprint changes every layer layout",
        );

        let max_height = load_f64_with_warning(
            Self::PALLET_MAX_HEIGHT_VAR,
            PalletProfile::DEFAULT_MAX_HEIGHT,
            |value| value > 0.0,
            "must be greater than 0",
            "Warning: Adjusted stack cap may split orders across more pallets",
        );

        let max_weight = load_f64_with_warning(
            Self::PALLET_MAX_WEIGHT_VAR,
            PalletProfile::DEFAULT_MAX_WEIGHT,
            |value| value > 0.0,
            "must be greater than 0",
            "Warning: Adjusted weight cap may split orders across more pallets",
        );

        let tare_weight = load_f64_with_warning(
            Self::PALLET_TARE_WEIGHT_VAR,
            PalletProfile::DEFAULT_TARE_WEIGHT,
            |value| value > 0.0,
            "must be greater than 0",
            "Warning: Adjusted tare weight changes the available payload",
        );

        let profile = match PalletProfile::new(length, width, max_height, max_weight, tare_weight)
        {
            Ok(profile) => profile,
            Err(err) => {
                eprintln!(
                    "⚠️ Configured pallet profile is invalid ({}). Using defaults.",
                    err
                );
                PalletProfile::default()
            }
        };

        let strategy = env_string(Self::LAYER_STRATEGY_VAR)
            .and_then(|raw| parse_strategy(&raw, Self::LAYER_STRATEGY_VAR))
            .unwrap_or_default();

        Self {
            profile,
            planning: PlanningConfig { strategy },
        }
    }

    /// Returns the configured default pallet profile.
    pub fn pallet_profile(&self) -> PalletProfile {
        self.profile
    }

    /// Returns the configured planning parameters.
    pub fn planning_config(&self) -> PlanningConfig {
        self.planning
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            eprintln!(
                "⚠️ Access to {} failed: {}. Using default value.",
                name, err
            );
            None
        }
    }
}

fn parse_strategy(raw: &str, var_name: &str) -> Option<LayerStrategy> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "guillotine" => Some(LayerStrategy::Guillotine),
        "uniform_rows" | "uniform-rows" | "rows" => Some(LayerStrategy::UniformRows),
        other => {
            eprintln!(
                "⚠️ Could not interpret {} ('{}') as layer strategy. Using default value.",
                var_name, other
            );
            None
        }
    }
}

fn load_f64_with_warning(
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    warning: &str,
) -> f64 {
    match env_string(var_name) {
        Some(raw) => match raw.parse::<f64>() {
            Ok(value) => {
                if !validator(value) {
                    eprintln!(
                        "⚠️ {} contains invalid value '{}': {}. Using {}.",
                        var_name, raw, invalid_hint, default
                    );
                    default
                } else {
                    let tolerance = (default.abs().max(1.0)) * 1e-9;
                    if (value - default).abs() > tolerance {
                        println!("⚠️ {} ({} = {}).", warning, var_name, value);
                    }
                    value
                }
            }
            Err(err) => {
                eprintln!(
                    "⚠️ Could not parse {} ('{}') as number: {}. Using {}.",
                    var_name, raw, err, default
                );
                default
            }
        },
        None => default,
    }
}
