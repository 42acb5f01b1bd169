//! human readable build/version label
use std::process::Command;

/// Environment variable overriding the label
pub const VERSION_ENV: &str = "TEMPLATE_VERSION";

/// Used when neither an override nor version control information is available
pub const VERSION_SENTINEL: &str = "CICD";

/// Nearest tag plus distance, or the abbreviated commit without tags
const GIT_DESCRIBE: [&str; 2] = ["describe", "--always"];

/// Resolve the version label
///
/// A non-empty `override_version` wins, then `vcs`, then [VERSION_SENTINEL].
pub fn resolve(
    override_version: Option<String>,
    vcs: impl FnOnce() -> Option<String>,
) -> String {
    let non_empty = |v: String| {
        let v = v.trim().to_string();
        (!v.is_empty()).then_some(v)
    };

    override_version
        .and_then(non_empty)
        .or_else(|| vcs().and_then(non_empty))
        .unwrap_or_else(|| VERSION_SENTINEL.to_string())
}

/// Resolve the label from [VERSION_ENV] and `git describe`
pub fn from_environment() -> String {
    let version = resolve(std::env::var(VERSION_ENV).ok(), git_describe);
    tracing::debug!(%version, "resolved template version");
    version
}

fn git_describe() -> Option<String> {
    let output = Command::new("git")
        .args(GIT_DESCRIBE)
        .output()
        .ok()?;

    if !output.status.success() {
        tracing::debug!(status = %output.status, "git describe failed");
        return None;
    }

    String::from_utf8(output.stdout).ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn override_wins() {
        assert_eq!(resolve(Some("1.2.0".into()), || Some("abc123".into())), "1.2.0");
    }

    #[test]
    fn falls_back_to_vcs() {
        assert_eq!(resolve(None, || Some("abc123\n".into())), "abc123");
        assert_eq!(resolve(Some("  ".into()), || Some("abc123".into())), "abc123");
    }

    #[test]
    fn describes_without_dirty_suffix() {
        assert_eq!(GIT_DESCRIBE, ["describe", "--always"]);
    }

    #[test]
    fn falls_back_to_sentinel() {
        assert_eq!(resolve(None, || None), VERSION_SENTINEL);
        assert_eq!(resolve(None, || Some(String::new())), VERSION_SENTINEL);
    }
}
