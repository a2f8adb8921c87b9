//! Resolving external identities to membership records.

use crate::directory::GroupDirectory;
use crate::error::StewardResult;
use crate::types::{strip_user_wrapper, Membership};
use std::sync::Arc;

/// Locates membership records in the external group.
#[derive(Clone)]
pub struct MembershipLocator {
    directory: Arc<dyn GroupDirectory>,
    page_size: u32,
}

impl MembershipLocator {
    pub fn new(directory: Arc<dyn GroupDirectory>, page_size: u32) -> Self {
        Self {
            directory,
            page_size: page_size.max(1),
        }
    }

    /// Resolve a raw identifier to an external user id.
    ///
    /// Purely numeric input (with or without chat-layer wrappers) parses
    /// directly; anything else goes through the service's display-name
    /// lookup. Both "not found" and transport errors collapse to `None`
    /// here: the caller's corrective action is the same either way.
    pub async fn resolve_user_id(&self, raw: &str) -> Option<u64> {
        let token = strip_user_wrapper(raw);
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            return token.parse().ok();
        }
        match self.directory.resolve_username(token).await {
            Ok(found) => found,
            Err(err) => {
                tracing::debug!(username = token, error = %err, "username lookup failed");
                None
            }
        }
    }

    /// The user's membership record, fetched fresh; `None` when the
    /// user is not in the group. Transport failures surface to the
    /// caller here, unlike in [`Self::resolve_user_id`].
    pub async fn find_membership(&self, user_id: u64) -> StewardResult<Option<Membership>> {
        let page = self
            .directory
            .memberships_page(Some(user_id), self.page_size, None)
            .await?;
        Ok(page.memberships.into_iter().next())
    }

    /// Start a fresh, token-less sweep over every membership.
    pub fn pages(&self) -> MembershipPages {
        MembershipPages {
            directory: self.directory.clone(),
            page_size: self.page_size,
            token: None,
            exhausted: false,
        }
    }
}

/// Lazy pull-based cursor over the paginated membership listing.
///
/// A page-fetch failure poisons the cursor; the consumer keeps whatever
/// it accumulated. Cursors are finite and not restartable: call
/// [`MembershipLocator::pages`] again for a new sweep.
pub struct MembershipPages {
    directory: Arc<dyn GroupDirectory>,
    page_size: u32,
    token: Option<String>,
    exhausted: bool,
}

impl MembershipPages {
    /// The next page of memberships, or `None` once the listing ends.
    pub async fn next_page(&mut self) -> StewardResult<Option<Vec<Membership>>> {
        if self.exhausted {
            return Ok(None);
        }
        let page = match self
            .directory
            .memberships_page(None, self.page_size, self.token.as_deref())
            .await
        {
            Ok(page) => page,
            Err(err) => {
                self.exhausted = true;
                return Err(err);
            }
        };
        self.token = page.next_page_token;
        if self.token.is_none() {
            self.exhausted = true;
        }
        Ok(Some(page.memberships))
    }
}
