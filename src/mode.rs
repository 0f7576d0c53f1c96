//! Build mode resolution
//!
//! The mode is resolved once from the parsed command line and then passed
//! by value into every task, pipeline and watch loop.

use std::fmt;

use clap::Args;

/// Development vs production build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    pub fn is_development(self) -> bool {
        self == Mode::Development
    }

    pub fn is_production(self) -> bool {
        self == Mode::Production
    }

    /// Value baked into script bundles as `process.env.NODE_ENV`
    pub fn node_env(self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.node_env())
    }
}

/// Command-line flags read by the mode resolver
#[derive(Args, Debug, Clone, Default)]
pub struct ModeFlags {
    /// Build for production (minified output, no source maps)
    #[arg(long)]
    pub production: bool,
}

/// Resolve the build mode from parsed flags
pub fn resolve_mode(flags: &ModeFlags) -> Mode {
    if flags.production {
        Mode::Production
    } else {
        Mode::Development
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_flag_is_development() {
        assert_eq!(resolve_mode(&ModeFlags::default()), Mode::Development);
    }

    #[test]
    fn test_production_flag() {
        let flags = ModeFlags { production: true };
        assert_eq!(resolve_mode(&flags), Mode::Production);
        assert_eq!(resolve_mode(&flags), resolve_mode(&flags));
    }

    #[test]
    fn test_node_env() {
        assert_eq!(Mode::Development.node_env(), "development");
        assert_eq!(Mode::Production.to_string(), "production");
    }
}
