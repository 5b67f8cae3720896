use taskpod_model::{Flag, TimeoutMs, pod::PodTemplate};

/// How declared results leave the pod.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResultExtraction {
    /// The wrapper embeds result values in its terminal record.
    #[default]
    TerminationMessage,
    /// A dedicated sidecar tails result files and emits them as structured
    /// log lines for external capture.
    SidecarLogs,
}

/// Run-level settings the assembler consumes alongside the resolved spec.
///
/// Capability facts (`native_sidecar_support`) are resolved by the caller
/// once, before assembly, so construction logic never probes the cluster.
#[derive(Clone, Debug)]
pub struct BuildSettings {
    /// Service account the pod runs under; also the credential-initializer
    /// input.
    pub service_account: Option<String>,
    /// Pod-level overrides applied as the last assembly phase.
    pub pod_template: PodTemplate,
    /// Run timeout; the pod deadline derives from it.
    pub timeout_ms: Option<TimeoutMs>,
    /// Whether the cluster supports restartable (native sidecar) init
    /// containers.
    pub native_sidecar_support: Flag,
    pub result_extraction: ResultExtraction,
    /// Passed through to every step wrapper; hermetic steps run without
    /// network access.
    pub hermetic: Flag,
    /// Image carrying the entrypoint wrapper binary.
    pub entrypoint_image: String,
    /// Shell image used by the script-placing init container.
    pub shell_image: String,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            service_account: None,
            pod_template: PodTemplate::default(),
            timeout_ms: None,
            native_sidecar_support: Flag::disabled(),
            result_extraction: ResultExtraction::default(),
            hermetic: Flag::disabled(),
            entrypoint_image: "taskpod/entrypoint:latest".to_string(),
            shell_image: "busybox".to_string(),
        }
    }
}

impl BuildSettings {
    /// Set the run timeout (builder-style).
    pub fn with_timeout_ms(mut self, timeout_ms: TimeoutMs) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Enable native sidecar placement (builder-style).
    pub fn with_native_sidecars(mut self) -> Self {
        self.native_sidecar_support = Flag::enabled();
        self
    }

    /// Select sidecar-log result extraction (builder-style).
    pub fn with_sidecar_log_results(mut self) -> Self {
        self.result_extraction = ResultExtraction::SidecarLogs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{BuildSettings, ResultExtraction};

    #[test]
    fn defaults_are_conservative() {
        let s = BuildSettings::default();
        assert!(s.timeout_ms.is_none());
        assert!(s.native_sidecar_support.is_disabled());
        assert_eq!(s.result_extraction, ResultExtraction::TerminationMessage);
    }

    #[test]
    fn builder_helpers_toggle_capabilities() {
        let s = BuildSettings::default()
            .with_timeout_ms(60_000)
            .with_native_sidecars()
            .with_sidecar_log_results();
        assert_eq!(s.timeout_ms, Some(60_000));
        assert!(s.native_sidecar_support.is_enabled());
        assert_eq!(s.result_extraction, ResultExtraction::SidecarLogs);
    }
}
