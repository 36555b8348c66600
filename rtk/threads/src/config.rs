//! Runtime kernel configuration

/// Configuration for a [`Kernel`](crate::Kernel).
///
/// Compile-time sizing (thread slots, priority levels) lives in `rtk-core`;
/// this only carries options that may differ between kernel instances.
#[derive(Debug, Clone, Copy)]
pub struct KernelConfig {
    /// Name reported in log records
    pub name: &'static str,
    /// Record mutex owners and reject unlocks by anyone else
    pub owner_tracking: bool,
    /// Called by ports each time the CPU goes idle
    pub idle_hook: Option<fn()>,
}

impl KernelConfig {
    /// Default configuration, usable in `const` and `static` initializers.
    pub const DEFAULT: KernelConfig = KernelConfig {
        name: "rtk",
        owner_tracking: false,
        idle_hook: None,
    };

    /// Creates a new kernel configuration builder.
    pub const fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder {
            config: Self::DEFAULT,
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Builder for [`KernelConfig`]
#[derive(Debug, Clone, Copy)]
pub struct KernelConfigBuilder {
    config: KernelConfig,
}

impl Default for KernelConfigBuilder {
    fn default() -> Self {
        KernelConfig::builder()
    }
}

impl KernelConfigBuilder {
    /// Sets the kernel name.
    pub const fn name(mut self, name: &'static str) -> Self {
        self.config.name = name;
        self
    }

    /// Enables or disables mutex owner tracking.
    pub const fn owner_tracking(mut self, enabled: bool) -> Self {
        self.config.owner_tracking = enabled;
        self
    }

    /// Sets the idle hook.
    pub const fn idle_hook(mut self, hook: fn()) -> Self {
        self.config.idle_hook = Some(hook);
        self
    }

    /// Builds the kernel configuration.
    pub const fn build(self) -> KernelConfig {
        self.config
    }
}
