use envconfig::Envconfig;

use crate::error::ConfigError;

/// Upper bound for `OPRC_HPA_UPDATE_MAX_RETRIES`; a pass should not hold
/// its object for minutes of conflict backoff.
pub const MAX_UPDATE_RETRIES: usize = 10;

#[derive(Envconfig, Clone, Debug)]
pub struct HpaConfig {
    #[envconfig(from = "OPRC_HPA_PROFILE", default = "dev")]
    pub profile: String,

    /// Namespace to watch; `*` watches all namespaces.
    /// Env: OPRC_HPA_K8S_NAMESPACE
    #[envconfig(from = "OPRC_HPA_K8S_NAMESPACE", default = "*")]
    pub k8s_namespace: String,

    /// Multiplier applied to minReplicas on each pass while recovering from
    /// an emergency. Must be in (0, 1].
    /// Env: OPRC_HPA_REPLICA_REDUCTION_FACTOR
    #[envconfig(from = "OPRC_HPA_REPLICA_REDUCTION_FACTOR", default = "0.95")]
    pub replica_reduction_factor: f64,

    #[envconfig(nested)]
    pub targets: TargetsConfig,

    /// Provider token used in external metric name prefixes
    /// Env: OPRC_HPA_EXTERNAL_METRIC_PROVIDER
    #[envconfig(
        from = "OPRC_HPA_EXTERNAL_METRIC_PROVIDER",
        default = "datadogmetric"
    )]
    pub external_metric_provider: String,

    /// Periodic re-sync interval (profile default when unset)
    /// Env: OPRC_HPA_RESYNC_SECS
    #[envconfig(from = "OPRC_HPA_RESYNC_SECS")]
    pub resync_secs: Option<u64>,

    /// Write conflicts retried within a single pass
    /// Env: OPRC_HPA_UPDATE_MAX_RETRIES
    #[envconfig(from = "OPRC_HPA_UPDATE_MAX_RETRIES", default = "3")]
    pub update_max_retries: usize,

    /// Publish Kubernetes Events (profile default when unset)
    /// Env: OPRC_HPA_EVENTS
    #[envconfig(from = "OPRC_HPA_EVENTS")]
    pub events: Option<bool>,
}

/// Target values seeded into a freshly created autoscaler.
#[derive(Envconfig, Clone, Debug)]
pub struct TargetsConfig {
    #[envconfig(from = "OPRC_HPA_HORIZONTAL_TARGET_PCT", default = "50")]
    pub horizontal_pct: i32,
    #[envconfig(from = "OPRC_HPA_MIXED_TARGET_PCT", default = "90")]
    pub mixed_pct: i32,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            horizontal_pct: 50,
            mixed_pct: 90,
        }
    }
}

/// The part of the configuration the rewriting core needs.
#[derive(Clone, Debug, PartialEq)]
pub struct CoreConfig {
    pub reduction_factor: f64,
    pub horizontal_target_pct: i32,
    pub mixed_target_pct: i32,
    pub external_metric_provider: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            reduction_factor: 0.95,
            horizontal_target_pct: 50,
            mixed_target_pct: 90,
            external_metric_provider: "datadogmetric".into(),
        }
    }
}

impl HpaConfig {
    /// Fills unset knobs from the profile. Explicit env values stay.
    ///
    /// - dev: events off, resync every 60s
    /// - edge/full/prod: events on, resync every 30s
    pub fn apply_profile_defaults(mut self) -> Self {
        let (def_events, def_resync) = match self.profile.as_str() {
            "edge" | "full" | "prod" | "production" => (true, 30),
            _ /* dev */ => (false, 60),
        };
        if self.events.is_none() {
            self.events = Some(def_events);
        }
        if self.resync_secs.is_none() {
            self.resync_secs = Some(def_resync);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let f = self.replica_reduction_factor;
        if !(f > 0.0 && f <= 1.0) {
            return Err(ConfigError::ReductionFactor(f));
        }
        for (field, value) in [
            ("OPRC_HPA_HORIZONTAL_TARGET_PCT", self.targets.horizontal_pct),
            ("OPRC_HPA_MIXED_TARGET_PCT", self.targets.mixed_pct),
        ] {
            if !(1..=100).contains(&value) {
                return Err(ConfigError::TargetPercent { field, value });
            }
        }
        if self.update_max_retries > MAX_UPDATE_RETRIES {
            return Err(ConfigError::UpdateMaxRetries {
                value: self.update_max_retries,
                max: MAX_UPDATE_RETRIES,
            });
        }
        Ok(())
    }

    pub fn core(&self) -> CoreConfig {
        CoreConfig {
            reduction_factor: self.replica_reduction_factor,
            horizontal_target_pct: self.targets.horizontal_pct,
            mixed_target_pct: self.targets.mixed_pct,
            external_metric_provider: self.external_metric_provider.clone(),
        }
    }

    pub fn resync_secs(&self) -> u64 {
        self.resync_secs.unwrap_or(60)
    }

    pub fn events_enabled(&self) -> bool {
        self.events.unwrap_or(false)
    }

    /// `None` means all namespaces.
    pub fn watch_namespace(&self) -> Option<&str> {
        match self.k8s_namespace.as_str() {
            "" | "*" => None,
            ns => Some(ns),
        }
    }
}
