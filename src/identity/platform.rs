//! Tiers backed by the host platform bridge.

use tracing::debug;

use super::{Identity, IdentitySource, IdentityStrategy, InitData, UserId};
use crate::session::{LaunchContext, WebAppUser};
use crate::storage::KeyValueStorage;

fn identity_from_user(user: &WebAppUser, source: IdentitySource) -> Identity {
    Identity {
        id: UserId::Numeric(user.id),
        username: user.username.clone().filter(|u| !u.is_empty()),
        first_name: Some(user.first_name.clone()).filter(|n| !n.is_empty()),
        locale: user.language_code.clone(),
        device: None,
        traffic_source: None,
        source,
    }
}

/// Structured, authenticated user object exposed by the bridge.
pub struct PlatformUserStrategy;

impl IdentityStrategy for PlatformUserStrategy {
    fn source(&self) -> IdentitySource {
        IdentitySource::Platform
    }

    fn try_resolve(&self, launch: &LaunchContext, _: &dyn KeyValueStorage) -> Option<Identity> {
        let user = launch.bridge.as_ref()?.user.as_ref()?;
        Some(identity_from_user(user, self.source()))
    }
}

/// `user` field parsed out of the raw init-data string. Parse failures fall
/// through to the next tier.
pub struct RawInitDataStrategy;

impl IdentityStrategy for RawInitDataStrategy {
    fn source(&self) -> IdentitySource {
        IdentitySource::PlatformRaw
    }

    fn try_resolve(&self, launch: &LaunchContext, _: &dyn KeyValueStorage) -> Option<Identity> {
        let raw = launch.bridge.as_ref()?.init_data.as_deref()?;
        match InitData::parse(raw) {
            Ok(data) => data
                .user
                .as_ref()
                .map(|user| identity_from_user(user, self.source())),
            Err(err) => {
                debug!("Raw init data not usable: {}", err);
                None
            }
        }
    }
}
