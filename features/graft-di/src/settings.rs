/// Environment variable selecting the settings profile
pub const ENV_VAR: &str = "GRAFT_ENV";

/// Development checks of containers and the module bootstrap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Check the shape of every registered provider
    pub validate_providers: bool,
    /// Warn when two distinct modules share a name
    pub warn_duplicate_modules: bool,
}

impl Settings {
    pub fn development() -> Self {
        Settings {
            validate_providers: true,
            warn_duplicate_modules: true,
        }
    }

    /// Skips all development checks
    pub fn production() -> Self {
        Settings {
            validate_providers: false,
            warn_duplicate_modules: false,
        }
    }

    /// Reads [ENV_VAR], anything but `production` selects the development profile
    pub fn from_env() -> Self {
        Self::from_profile(std::env::var(ENV_VAR).ok().as_deref())
    }

    fn from_profile(profile: Option<&str>) -> Self {
        match profile {
            Some(profile) if profile.eq_ignore_ascii_case("production") => Self::production(),
            _ => Self::development(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_profile_disables_checks() {
        assert_eq!(Settings::from_profile(Some("production")), Settings::production());
        assert_eq!(Settings::from_profile(Some("PRODUCTION")), Settings::production());
        assert_eq!(Settings::from_profile(Some("staging")), Settings::development());
        assert_eq!(Settings::from_profile(None), Settings::development());
    }
}
