//! Privilege check before touching interfaces and routes

use crate::error::{Error, Result};

/// Fail unless the process runs as root or the check is explicitly skipped
///
/// `skip` exists for sandboxes and containers that already hold
/// `CAP_NET_ADMIN` without being uid 0.
pub fn ensure_root(skip: bool) -> Result<()> {
    if skip {
        tracing::debug!("Skipping root check");
        return Ok(());
    }

    if is_root() {
        Ok(())
    } else {
        Err(Error::permission_denied(
            "Please run this program as root! It needs root privileges.",
        ))
    }
}

#[cfg(unix)]
fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_always_passes() {
        assert!(ensure_root(true).is_ok());
    }

    #[test]
    #[cfg(unix)]
    fn test_matches_effective_uid() {
        let root = unsafe { libc::geteuid() } == 0;
        assert_eq!(ensure_root(false).is_ok(), root);
        if !root {
            assert!(matches!(ensure_root(false), Err(Error::PermissionDenied(_))));
        }
    }
}
