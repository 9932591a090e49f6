use ahash::AHashSet;
use async_trait::async_trait;

use crate::slots::UserId;

/// Decides which users are administrators.
#[async_trait]
pub trait AdminLookup: Send + Sync {
    async fn is_admin(&self, user_id: UserId) -> bool;
}

/// Fixed set of administrator ids, usually from the `admins` config key.
#[derive(Debug, Clone, Default)]
pub struct StaticAdmins {
    ids: AHashSet<UserId>,
}

impl StaticAdmins {
    pub fn new<I: IntoIterator<Item = UserId>>(ids: I) -> Self {
        Self { ids: ids.into_iter().collect() }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[async_trait]
impl AdminLookup for StaticAdmins {
    async fn is_admin(&self, user_id: UserId) -> bool {
        self.ids.contains(&user_id)
    }
}
