//! Engine configuration.

use std::collections::BTreeSet;
use std::time::Duration;

use nodes::CredentialKind;
use tracing::warn;

use crate::UserInputs;

/// Owner id under which system-shared admin credentials are stored.
pub const SYSTEM_OWNER: &str = "system";

/// Upper bound on `lookup_retries`; larger configured values are clamped.
pub const MAX_LOOKUP_RETRIES: u32 = 20;

/// Tuning knobs and policy for materialization runs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Extra credential-store lookups after a user reports a fresh
    /// authorization that hasn't been indexed yet.
    pub lookup_retries: u32,
    /// Wait between those lookups.
    pub lookup_retry_delay: Duration,
    /// Raw provisioning fields for system-owned singleton credentials,
    /// keyed exactly like user inputs (`smtp_host`, `openai_api_key`, …).
    pub admin_inputs: UserInputs,
    /// Kinds whose freshly created credentials are remembered and reused by
    /// later deployments of the same user. Every other kind gets a new
    /// credential per deployment.
    pub reuse_across_deployments: BTreeSet<CredentialKind>,
    /// Deadline for one whole deployment, from template fetch to the saved
    /// record.
    pub deploy_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookup_retries: 3,
            lookup_retry_delay: Duration::from_secs(2),
            admin_inputs: UserInputs::default(),
            reuse_across_deployments: BTreeSet::new(),
            deploy_timeout: Duration::from_secs(120),
        }
    }
}

impl EngineConfig {
    /// Read the configuration from the process environment.
    ///
    /// - `LOOKUP_RETRIES` (at most [`MAX_LOOKUP_RETRIES`]), `LOOKUP_RETRY_DELAY_MS`
    /// - `DEPLOY_TIMEOUT_MS`
    /// - `REUSE_CREDENTIAL_KINDS`: comma separated kinds (`smtp,openai`)
    /// - `ADMIN_<FIELD>`: admin provisioning fields (`ADMIN_SMTP_HOST`)
    ///
    /// Unparseable values fall back to the defaults with a warning.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            match key.as_str() {
                "LOOKUP_RETRIES" => match value.parse::<u32>() {
                    Ok(n) if n > MAX_LOOKUP_RETRIES => {
                        warn!("LOOKUP_RETRIES={n} clamped to {MAX_LOOKUP_RETRIES}");
                        config.lookup_retries = MAX_LOOKUP_RETRIES;
                    }
                    Ok(n) => config.lookup_retries = n,
                    Err(_) => warn!("ignoring invalid LOOKUP_RETRIES={value}"),
                },
                "LOOKUP_RETRY_DELAY_MS" => match value.parse() {
                    Ok(ms) => config.lookup_retry_delay = Duration::from_millis(ms),
                    Err(_) => warn!("ignoring invalid LOOKUP_RETRY_DELAY_MS={value}"),
                },
                "DEPLOY_TIMEOUT_MS" => match value.parse::<u64>() {
                    Ok(ms) if ms > 0 => config.deploy_timeout = Duration::from_millis(ms),
                    _ => warn!("ignoring invalid DEPLOY_TIMEOUT_MS={value}"),
                },
                "REUSE_CREDENTIAL_KINDS" => {
                    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                        match item.parse::<CredentialKind>() {
                            Ok(kind) => {
                                config.reuse_across_deployments.insert(kind);
                            }
                            Err(e) => warn!("ignoring REUSE_CREDENTIAL_KINDS entry: {e}"),
                        }
                    }
                }
                _ => {
                    if let Some(field) = key.strip_prefix("ADMIN_") {
                        config.admin_inputs.insert(field.to_ascii_lowercase(), value);
                    }
                }
            }
        }

        config
    }

    pub fn reuses(&self, kind: CredentialKind) -> bool {
        self.reuse_across_deployments.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn reads_retry_policy_and_admin_fields() {
        let config = EngineConfig::from_vars(vars(&[
            ("LOOKUP_RETRIES", "5"),
            ("LOOKUP_RETRY_DELAY_MS", "250"),
            ("ADMIN_SMTP_HOST", "relay.example.com"),
            ("PATH", "/usr/bin"),
        ]));

        assert_eq!(config.lookup_retries, 5);
        assert_eq!(config.lookup_retry_delay, Duration::from_millis(250));
        assert_eq!(config.admin_inputs.text("smtp_host").as_deref(), Some("relay.example.com"));
        assert!(!config.admin_inputs.contains("path"));
    }

    #[test]
    fn reuse_kinds_accept_prefixes_and_type_keys() {
        let config = EngineConfig::from_vars(vars(&[("REUSE_CREDENTIAL_KINDS", "smtp, openAiApi,bogus")]));
        assert!(config.reuses(CredentialKind::Smtp));
        assert!(config.reuses(CredentialKind::OpenAiApi));
        assert!(!config.reuses(CredentialKind::Imap));
    }

    #[test]
    fn bad_numbers_keep_defaults() {
        let config = EngineConfig::from_vars(vars(&[("LOOKUP_RETRIES", "many"), ("DEPLOY_TIMEOUT_MS", "0")]));
        assert_eq!(config.lookup_retries, 3);
        assert_eq!(config.deploy_timeout, Duration::from_secs(120));
    }

    #[test]
    fn huge_retry_count_is_clamped() {
        let config = EngineConfig::from_vars(vars(&[("LOOKUP_RETRIES", "4294967295")]));
        assert_eq!(config.lookup_retries, MAX_LOOKUP_RETRIES);
    }

    #[test]
    fn reads_deploy_timeout() {
        let config = EngineConfig::from_vars(vars(&[("DEPLOY_TIMEOUT_MS", "1500")]));
        assert_eq!(config.deploy_timeout, Duration::from_millis(1500));
    }
}
