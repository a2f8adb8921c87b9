//! HTTP client for the external group-management service.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use steward_core::{
    GroupDirectory, GroupRole, Membership, MembershipPage, StewardError, StewardResult,
};

const CREDENTIAL_HEADER: &str = "x-api-key";
const ERROR_BODY_LIMIT: usize = 300;

/// Static client configuration: one group, one credential.
#[derive(Debug, Clone)]
pub struct GroupApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub group_id: u64,
    pub timeout_secs: u64,
}

impl GroupApiConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, group_id: u64) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            group_id,
            timeout_secs: 30,
        }
    }
}

/// HTTP implementation of the group-directory seam.
pub struct GroupApiClient {
    client: Client,
    base_url: String,
    api_key: String,
    group_id: u64,
}

impl GroupApiClient {
    pub fn new(config: GroupApiConfig) -> StewardResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StewardError::UpstreamUnavailable(format!("client build failed: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            group_id: config.group_id,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> StewardResult<T> {
        let response = self
            .client
            .get(url)
            .header(CREDENTIAL_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| StewardError::UpstreamUnavailable(e.to_string()))?;
        handle_response(response).await
    }

    async fn patch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> StewardResult<T> {
        let response = self
            .client
            .patch(url)
            .header(CREDENTIAL_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| StewardError::UpstreamUnavailable(e.to_string()))?;
        handle_response(response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> StewardResult<T> {
        let response = self
            .client
            .post(url)
            .header(CREDENTIAL_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| StewardError::UpstreamUnavailable(e.to_string()))?;
        handle_response(response).await
    }
}

#[async_trait]
impl GroupDirectory for GroupApiClient {
    async fn list_roles(&self) -> StewardResult<Vec<GroupRole>> {
        // The role catalog is paginated like any other listing; walk it
        // to the end so the cache always sees the full catalog.
        let mut roles = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut url = format!(
                "{}?maxPageSize=100",
                self.url(&format!("/v2/groups/{}/roles", self.group_id))
            );
            if let Some(token) = &token {
                url.push_str(&format!("&pageToken={token}"));
            }
            let page: RolesPage = self.get_json(&url).await?;
            roles.extend(page.group_roles.into_iter().map(GroupRole::from));
            token = page.next_page_token.filter(|token| !token.is_empty());
            if token.is_none() {
                return Ok(roles);
            }
        }
    }

    async fn memberships_page(
        &self,
        filter_user: Option<u64>,
        page_size: u32,
        page_token: Option<&str>,
    ) -> StewardResult<MembershipPage> {
        let mut url = format!(
            "{}?maxPageSize={}",
            self.url(&format!("/v2/groups/{}/memberships", self.group_id)),
            page_size
        );
        if let Some(user_id) = filter_user {
            url.push_str(&format!("&filter={}", membership_filter(user_id)));
        }
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={token}"));
        }

        let page: MembershipsPage = self.get_json(&url).await?;
        let mut memberships = Vec::with_capacity(page.group_memberships.len());
        for wire in page.group_memberships {
            match wire.into_membership() {
                Some(membership) => memberships.push(membership),
                None => tracing::warn!("skipping membership with malformed resource paths"),
            }
        }
        Ok(MembershipPage {
            memberships,
            next_page_token: page.next_page_token.filter(|token| !token.is_empty()),
        })
    }

    async fn update_membership_role(
        &self,
        membership_id: &str,
        role_id: u64,
    ) -> StewardResult<()> {
        let url = self.url(&format!(
            "/v2/groups/{}/memberships/{}",
            self.group_id, membership_id
        ));
        let body = serde_json::json!({ "role": role_path(self.group_id, role_id) });
        let _: serde_json::Value = self.patch_json(&url, &body).await?;
        Ok(())
    }

    async fn resolve_username(&self, username: &str) -> StewardResult<Option<u64>> {
        let url = self.url("/v1/users/lookup");
        let body = serde_json::json!({ "usernames": [username] });
        let found: UserLookupResponse = self.post_json(&url, &body).await?;
        Ok(found.data.into_iter().next().map(|user| user.id))
    }
}

/// Map an upstream response to a value or a diagnostic error.
///
/// Non-success keeps the structured body when the service sent JSON,
/// otherwise a truncated slice of the raw text.
async fn handle_response<T: DeserializeOwned>(response: Response) -> StewardResult<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| StewardError::UpstreamUnavailable(format!("invalid response body: {e}")));
    }

    let raw = response.text().await.unwrap_or_default();
    Err(StewardError::Upstream {
        status: status.as_u16(),
        body: diagnostic_body(&raw),
    })
}

fn diagnostic_body(raw: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => value.to_string(),
        Err(_) => {
            let mut body: String = raw.chars().take(ERROR_BODY_LIMIT).collect();
            if raw.chars().count() > ERROR_BODY_LIMIT {
                body.push_str("...");
            }
            body
        }
    }
}

fn membership_filter(user_id: u64) -> String {
    format!("user == 'users/{user_id}'")
}

fn role_path(group_id: u64, role_id: u64) -> String {
    format!("groups/{group_id}/roles/{role_id}")
}

fn id_from_path(path: &str) -> Option<u64> {
    path.rsplit('/').next()?.parse().ok()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RolesPage {
    #[serde(default)]
    group_roles: Vec<WireRole>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRole {
    id: u64,
    display_name: String,
    rank: u32,
}

impl From<WireRole> for GroupRole {
    fn from(wire: WireRole) -> Self {
        Self {
            id: wire.id,
            name: wire.display_name,
            rank: wire.rank,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MembershipsPage {
    #[serde(default)]
    group_memberships: Vec<WireMembership>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Membership as the service sends it: resource paths, not bare ids.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMembership {
    /// `groups/{group}/memberships/{membership}`
    path: String,
    /// `users/{user}`
    user: String,
    /// `groups/{group}/roles/{role}`
    role: String,
}

impl WireMembership {
    fn into_membership(self) -> Option<Membership> {
        let id = self.path.rsplit('/').next()?.to_string();
        if id.is_empty() {
            return None;
        }
        Some(Membership {
            id,
            user_id: id_from_path(&self.user)?,
            role_id: id_from_path(&self.role)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct UserLookupResponse {
    #[serde(default)]
    data: Vec<WireUser>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GroupApiClient {
        GroupApiClient::new(GroupApiConfig::new("https://groups.example/", "key", 7)).unwrap()
    }

    #[test]
    fn base_url_is_normalized() {
        let client = client();
        assert_eq!(
            client.url("/v2/groups/7/roles"),
            "https://groups.example/v2/groups/7/roles"
        );
    }

    #[test]
    fn filter_and_role_path_formats() {
        assert_eq!(membership_filter(42), "user == 'users/42'");
        assert_eq!(role_path(7, 11), "groups/7/roles/11");
    }

    #[test]
    fn ids_parse_from_resource_paths() {
        assert_eq!(id_from_path("users/42"), Some(42));
        assert_eq!(id_from_path("groups/7/roles/11"), Some(11));
        assert_eq!(id_from_path("users/forty-two"), None);
    }

    #[test]
    fn membership_wire_decode() {
        let page: MembershipsPage = serde_json::from_str(
            r#"{
                "groupMemberships": [
                    {
                        "path": "groups/7/memberships/MTIz",
                        "user": "users/42",
                        "role": "groups/7/roles/11"
                    }
                ],
                "nextPageToken": "abc"
            }"#,
        )
        .unwrap();

        assert_eq!(page.next_page_token.as_deref(), Some("abc"));
        let membership = page
            .group_memberships
            .into_iter()
            .next()
            .unwrap()
            .into_membership()
            .unwrap();
        assert_eq!(membership.id, "MTIz");
        assert_eq!(membership.user_id, 42);
        assert_eq!(membership.role_id, 11);
    }

    #[test]
    fn malformed_membership_paths_are_rejected() {
        let wire = WireMembership {
            path: "groups/7/memberships/MTIz".to_string(),
            user: "users/not-a-number".to_string(),
            role: "groups/7/roles/11".to_string(),
        };
        assert!(wire.into_membership().is_none());
    }

    #[test]
    fn roles_wire_decode() {
        let page: RolesPage = serde_json::from_str(
            r#"{
                "groupRoles": [
                    {"id": 11, "displayName": "Member", "rank": 1},
                    {"id": 12, "displayName": "Officer", "rank": 5}
                ]
            }"#,
        )
        .unwrap();
        let roles: Vec<GroupRole> = page.group_roles.into_iter().map(GroupRole::from).collect();
        assert_eq!(roles[0].name, "Member");
        assert_eq!(roles[1].rank, 5);
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn diagnostic_body_keeps_json_and_truncates_text() {
        let structured = diagnostic_body(r#"{"error": "PERMISSION_DENIED"}"#);
        assert!(structured.contains("PERMISSION_DENIED"));

        let long = "x".repeat(400);
        let truncated = diagnostic_body(&long);
        assert_eq!(truncated.len(), ERROR_BODY_LIMIT + 3);
        assert!(truncated.ends_with("..."));
    }
}
