//! Target identity for the supervised service
//!
//! `VIGIL_RUN_AS` names the identity as one of:
//! - a user name (`app`)
//! - a numeric uid (`1000`)
//! - a `uid:gid` pair (`1000:1000`)
//!
//! Parsing is pure and happens during config resolution. Resolution against
//! the user database happens later, just before the data directory is
//! prepared.

use super::PermissionError;
use nix::unistd::{Gid, Uid, User};
use std::fmt;
use std::str::FromStr;

/// Unresolved identity as written in the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySpec {
    Name(String),
    Uid(u32),
    UidGid(u32, u32),
}

impl IdentitySpec {
    /// True if this spec names the superuser
    pub fn is_root(&self) -> bool {
        match self {
            IdentitySpec::Name(name) => name == "root",
            IdentitySpec::Uid(uid) | IdentitySpec::UidGid(uid, _) => *uid == 0,
        }
    }

    /// Resolve against the system user database
    ///
    /// A bare uid takes its primary group from the user database when the
    /// uid is known there; otherwise the gid equals the uid.
    pub fn resolve(&self) -> Result<Identity, PermissionError> {
        let identity = match self {
            IdentitySpec::Name(name) => {
                let user = User::from_name(name)
                    .map_err(|e| PermissionError::UserLookup(name.clone(), e))?
                    .ok_or_else(|| PermissionError::UnknownUser(name.clone()))?;
                Identity {
                    uid: user.uid,
                    gid: user.gid,
                    name: Some(user.name),
                }
            }
            IdentitySpec::Uid(uid) => {
                let uid = Uid::from_raw(*uid);
                match User::from_uid(uid)
                    .map_err(|e| PermissionError::UserLookup(uid.to_string(), e))?
                {
                    Some(user) => Identity {
                        uid,
                        gid: user.gid,
                        name: Some(user.name),
                    },
                    None => Identity {
                        uid,
                        gid: Gid::from_raw(uid.as_raw()),
                        name: None,
                    },
                }
            }
            IdentitySpec::UidGid(uid, gid) => Identity {
                uid: Uid::from_raw(*uid),
                gid: Gid::from_raw(*gid),
                name: None,
            },
        };

        if identity.uid.is_root() {
            return Err(PermissionError::RootIdentity(self.to_string()));
        }
        Ok(identity)
    }
}

impl FromStr for IdentitySpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("identity cannot be empty".to_string());
        }

        if let Some((uid, gid)) = s.split_once(':') {
            let uid = uid
                .parse::<u32>()
                .map_err(|_| format!("uid '{}' is not a number", uid))?;
            let gid = gid
                .parse::<u32>()
                .map_err(|_| format!("gid '{}' is not a number", gid))?;
            return Ok(IdentitySpec::UidGid(uid, gid));
        }

        if s.chars().all(|c| c.is_ascii_digit()) {
            return s
                .parse::<u32>()
                .map(IdentitySpec::Uid)
                .map_err(|_| format!("uid '{}' is out of range", s));
        }

        Ok(IdentitySpec::Name(s.to_string()))
    }
}

impl fmt::Display for IdentitySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentitySpec::Name(name) => write!(f, "{}", name),
            IdentitySpec::Uid(uid) => write!(f, "{}", uid),
            IdentitySpec::UidGid(uid, gid) => write!(f, "{}:{}", uid, gid),
        }
    }
}

/// Resolved, non-root identity the service runs as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: Uid,
    pub gid: Gid,
    pub name: Option<String>,
}

impl Identity {
    /// Identity of the calling process
    pub fn current() -> Self {
        let uid = Uid::current();
        let name = User::from_uid(uid).ok().flatten().map(|u| u.name);
        Identity {
            uid,
            gid: Gid::current(),
            name,
        }
    }

    /// True if launching under this identity needs a uid/gid switch
    pub fn requires_switch(&self) -> bool {
        Uid::current() != self.uid || Gid::current() != self.gid
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({}:{})", name, self.uid, self.gid),
            None => write!(f, "{}:{}", self.uid, self.gid),
        }
    }
}
