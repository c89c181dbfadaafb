const fn version_or_cargo(build_override: Option<&'static str>) -> &'static str {
    match build_override {
        Some(val) => val,
        None => env!("CARGO_PKG_VERSION"),
    }
}

/// Set `APP_VERSION` at build time to override the package version.
pub const VERSION: &str = version_or_cargo(option_env!("APP_VERSION"));

/// `User-Agent` sent by HTTP probes.
pub fn user_agent() -> String {
    format!("webdoctor/{VERSION}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins_over_package_version() {
        assert_eq!(version_or_cargo(Some("9.9.9-ci")), "9.9.9-ci");
        assert_eq!(version_or_cargo(None), env!("CARGO_PKG_VERSION"));
        assert!(user_agent().starts_with("webdoctor/"));
    }
}
