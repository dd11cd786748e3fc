//! Privilege drop to a configured user and group.
//!
//! Runs before the socket binds so the artefact is owned by the target
//! identity; failure is fatal at startup.

use nix::unistd::{Group, User, setgid, setuid};
use tracing::info;

use gaffer_config::Config;

use super::PROCESS_TARGET;
use super::errors::LaunchError;

/// Assumes the configured group and user, group first so the group change
/// still has the privileges it may need.
pub(crate) fn drop_privileges(config: &Config) -> Result<(), LaunchError> {
    if let Some(name) = &config.run_as_group {
        let group = Group::from_name(name)
            .map_err(|source| LaunchError::PrivilegeDrop {
                target: format!("group {name}"),
                source,
            })?
            .ok_or_else(|| LaunchError::UnknownGroup { name: name.clone() })?;
        setgid(group.gid).map_err(|source| LaunchError::PrivilegeDrop {
            target: format!("group {name}"),
            source,
        })?;
        info!(target: PROCESS_TARGET, group = %name, "assumed group");
    }
    if let Some(name) = &config.run_as_user {
        let user = User::from_name(name)
            .map_err(|source| LaunchError::PrivilegeDrop {
                target: format!("user {name}"),
                source,
            })?
            .ok_or_else(|| LaunchError::UnknownUser { name: name.clone() })?;
        setuid(user.uid).map_err(|source| LaunchError::PrivilegeDrop {
            target: format!("user {name}"),
            source,
        })?;
        info!(target: PROCESS_TARGET, user = %name, "assumed user");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaffer_config::Config;

    #[test]
    fn unknown_group_is_reported() {
        let config = Config {
            run_as_group: Some("gaffer-no-such-group".to_owned()),
            ..Config::default()
        };
        let error = drop_privileges(&config).unwrap_err();
        assert!(matches!(error, LaunchError::UnknownGroup { .. }));
    }

    #[test]
    fn absent_configuration_is_a_no_op() {
        drop_privileges(&Config::default()).unwrap();
    }
}
