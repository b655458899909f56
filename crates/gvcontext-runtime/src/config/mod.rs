//! GVContext Configuration
//!
//! Provides compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Values installed with [`install`]
//! 2. Environment variables (runtime)
//! 3. User's `GVC_CONFIG_RS` file (compile-time)
//! 4. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use gvcontext_runtime::config::{self, ContextConfig, OrphanPolicy};
//!
//! let cfg = ContextConfig::from_env()
//!     .guard_page(true)
//!     .orphan_policy(OrphanPolicy::Exit(3));
//! config::install(cfg)?;
//! ```

pub mod defaults;

use gvcontext_core::constants::{MIN_STACK_SIZE, STACK_ALIGN};
use gvcontext_core::env::{env_get, env_get_bool, env_get_size, env_get_str};
use std::sync::OnceLock;

/// What happens when a built context's entry returns with no successor linked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanPolicy {
    /// Log and `abort()`
    Abort,
    /// Log and `exit(code)`
    Exit(i32),
}

impl OrphanPolicy {
    /// Parse `"abort"`, `"exit"` (code 0) or `"exit:<code>"`
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "abort" => Some(OrphanPolicy::Abort),
            "exit" => Some(OrphanPolicy::Exit(0)),
            _ => s
                .strip_prefix("exit:")
                .and_then(|code| code.trim().parse().ok())
                .map(OrphanPolicy::Exit),
        }
    }
}

/// Context runtime configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Size used by `StackRegion::with_default_size`
    pub stack_size: usize,
    /// Alignment used by `StackRegion::with_default_size`
    pub stack_align: usize,
    /// Back `StackRegion::allocate` with mmap + PROT_NONE guard page
    pub guard_page: bool,
    /// Save/restore the thread signal mask on every switch
    pub switch_sigmask: bool,
    /// Entry returned without successor
    pub orphan_policy: OrphanPolicy,
    /// Log every build and switch at debug level
    pub debug_logging: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ContextConfig {
    /// Create config from compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `GVC_STACK_SIZE` - Default stack size (accepts K/M suffixes)
    /// - `GVC_STACK_ALIGN` - Default stack alignment
    /// - `GVC_GUARD_PAGE` - Guard page below each stack (0/1)
    /// - `GVC_SWITCH_SIGMASK` - Switch signal masks (0/1)
    /// - `GVC_ORPHAN_POLICY` - abort | exit | exit:<code>
    /// - `GVC_DEBUG` - Debug logging (0/1)
    pub fn from_env() -> Self {
        let base = Self::new();
        let orphan = env_get_str("GVC_ORPHAN_POLICY", defaults::ORPHAN_POLICY);
        Self {
            stack_size: env_get_size("GVC_STACK_SIZE", base.stack_size),
            stack_align: env_get("GVC_STACK_ALIGN", base.stack_align),
            guard_page: env_get_bool("GVC_GUARD_PAGE", base.guard_page),
            switch_sigmask: env_get_bool("GVC_SWITCH_SIGMASK", base.switch_sigmask),
            orphan_policy: OrphanPolicy::parse(&orphan).unwrap_or(base.orphan_policy),
            debug_logging: env_get_bool("GVC_DEBUG", base.debug_logging),
        }
    }

    /// Create config with compile-time defaults only (no env override).
    pub fn new() -> Self {
        Self {
            stack_size: defaults::STACK_SIZE,
            stack_align: defaults::STACK_ALIGN,
            guard_page: defaults::GUARD_PAGE,
            switch_sigmask: defaults::SWITCH_SIGMASK,
            orphan_policy: OrphanPolicy::parse(defaults::ORPHAN_POLICY)
                .unwrap_or(OrphanPolicy::Abort),
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    // Builder methods

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn stack_align(mut self, align: usize) -> Self {
        self.stack_align = align;
        self
    }

    pub fn guard_page(mut self, enable: bool) -> Self {
        self.guard_page = enable;
        self
    }

    pub fn switch_sigmask(mut self, enable: bool) -> Self {
        self.switch_sigmask = enable;
        self
    }

    pub fn orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.orphan_policy = policy;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.stack_align.is_power_of_two() {
            return Err(ConfigError::InvalidValue("stack_align must be a power of two"));
        }
        if self.stack_align < STACK_ALIGN {
            return Err(ConfigError::InvalidValue("stack_align must be >= 16"));
        }
        if self.stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::InvalidValue("stack_size must be >= 4KB"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("GVContext Configuration:");
        eprintln!("  stack_size:      {}", self.stack_size);
        eprintln!("  stack_align:     {}", self.stack_align);
        eprintln!("  guard_page:      {}", self.guard_page);
        eprintln!("  switch_sigmask:  {}", self.switch_sigmask);
        eprintln!("  orphan_policy:   {:?}", self.orphan_policy);
        eprintln!("  debug_logging:   {}", self.debug_logging);
    }
}

/// Configuration error
#[derive(Debug, Clone)]
pub enum ConfigError {
    InvalidValue(&'static str),
    AlreadyInstalled,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
            ConfigError::AlreadyInstalled => write!(f, "config already installed"),
        }
    }
}

impl std::error::Error for ConfigError {}

static CONFIG: OnceLock<ContextConfig> = OnceLock::new();

/// Install the process-wide configuration.
///
/// Must happen before the first `current()` call (first allocation, build or
/// switch); afterwards the configuration is frozen.
pub fn install(config: ContextConfig) -> Result<(), ConfigError> {
    config.validate()?;
    CONFIG.set(config).map_err(|_| ConfigError::AlreadyInstalled)
}

/// Process-wide configuration, read from the environment on first use.
pub fn current() -> &'static ContextConfig {
    CONFIG.get_or_init(|| {
        let config = ContextConfig::from_env();
        match config.validate() {
            Ok(()) => config,
            Err(e) => {
                gvcontext_core::kwarn!("{}; falling back to defaults", e);
                ContextConfig::new()
            }
        }
    })
}
