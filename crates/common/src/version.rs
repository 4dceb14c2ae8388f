use serde::Serialize;

/// Compile-time information about the running build, populated by `build.rs`.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub build_profile: &'static str,
    pub build_features: &'static str,
    pub build_timestamp: &'static str,
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("REPO_VERSION"),
        build_profile: env!("BUILD_PROFILE"),
        build_features: env!("BUILD_FEATURES"),
        build_timestamp: env!("BUILD_TIMESTAMP"),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_build_info_populated() {
        let info = build_info();
        assert!(!info.version.is_empty());
        assert!(!info.build_profile.is_empty());
        assert!(!info.build_features.is_empty());
    }
}
