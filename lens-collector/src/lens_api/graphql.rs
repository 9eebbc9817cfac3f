// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Lens GraphQL client over `reqwest`.
//!
//! Responses are normalized into the stored document models right here, so
//! the sync tasks only ever see [`Profile`] and [`Publication`].

use super::{LensApi, LensApiError, LensApiResult, Page};
use crate::content::real_image_uri_value;
use async_trait::async_trait;
use lens_schema::{
    Profile, ProfileStats, Publication, PublicationKind, PublicationRef, PublicationStats,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Public Lens API endpoint.
pub const DEFAULT_LENS_API_URL: &str = "https://api.lens.dev";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const PROFILE_FIELDS: &str = r#"
  id name bio handle ownedBy isDefault metadata followNftAddress
  attributes { key value traitType displayType }
  dispatcher { address }
  followModule { __typename }
  picture { ... on NftImage { uri } ... on MediaSet { original { url } } }
  coverPicture { ... on NftImage { uri } ... on MediaSet { original { url } } }
  stats {
    totalFollowers totalFollowing totalPosts totalComments
    totalMirrors totalPublications totalCollects
  }
"#;

const PUBLICATION_FIELDS: &str = r#"
  __typename
  ... on Post { id onChainContentURI createdAt appId profile { id }
    stats { totalAmountOfMirrors totalAmountOfCollects totalAmountOfComments }
    metadata { name description content image media { original { url mimeType } } attributes { traitType value } }
    collectModule { __typename } referenceModule { __typename } }
  ... on Comment { id onChainContentURI createdAt appId profile { id }
    stats { totalAmountOfMirrors totalAmountOfCollects totalAmountOfComments }
    metadata { name description content image media { original { url mimeType } } attributes { traitType value } }
    collectModule { __typename } referenceModule { __typename }
    commentOn { ... on Post { id } ... on Comment { id } ... on Mirror { id } } }
  ... on Mirror { id onChainContentURI createdAt appId profile { id }
    stats { totalAmountOfMirrors totalAmountOfCollects totalAmountOfComments }
    metadata { name description content image media { original { url mimeType } } attributes { traitType value } }
    collectModule { __typename } referenceModule { __typename }
    mirrorOf { ... on Post { id } ... on Comment { id } } }
"#;

fn explore_profiles_query() -> String {
    format!(
        "query ExploreProfiles($request: ExploreProfilesRequest!) {{ exploreProfiles(request: $request) {{ items {{ {} }} pageInfo {{ next }} }} }}",
        PROFILE_FIELDS
    )
}

fn profiles_query() -> String {
    format!(
        "query Profiles($request: ProfileQueryRequest!) {{ profiles(request: $request) {{ items {{ {} }} pageInfo {{ next }} }} }}",
        PROFILE_FIELDS
    )
}

fn publications_query() -> String {
    format!(
        "query Publications($request: PublicationsQueryRequest!) {{ publications(request: $request) {{ items {{ {} }} pageInfo {{ next }} }} }}",
        PUBLICATION_FIELDS
    )
}

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: String,
    variables: Value,
    #[serde(rename = "operationName")]
    operation_name: &'a str,
}

pub struct GraphQlLensApi {
    client: reqwest::Client,
    url: String,
    access_token: Option<String>,
}

impl GraphQlLensApi {
    pub fn new(url: &str, access_token: Option<String>) -> LensApiResult<Self> {
        url::Url::parse(url).map_err(|e| LensApiError::Transport(format!("{}: {}", url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LensApiError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
            access_token,
        })
    }

    /// Posts one GraphQL operation and returns `data.<field>`.
    async fn query(
        &self,
        operation: &str,
        field: &str,
        query: String,
        request: Value,
    ) -> LensApiResult<Value> {
        let body = GraphQlRequest {
            query,
            variables: json!({ "request": request }),
            operation_name: operation,
        };
        let mut builder = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.access_token {
            builder = builder.header("x-access-token", format!("Bearer {}", token));
        }
        let response = builder.send().await.map_err(|e| {
            tracing::debug!("[LensApi] {} transport error: {:?}", operation, e);
            LensApiError::Transport(e.to_string())
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LensApiError::RateLimited);
        }
        if status.as_u16() == 404 {
            return Err(LensApiError::NotFound(operation.to_string()));
        }
        if !status.is_success() {
            return Err(LensApiError::Http {
                status: status.as_u16(),
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| LensApiError::Decode(e.to_string()))?;
        extract_data(operation, field, payload)
    }

    async fn profile_page(
        &self,
        operation: &str,
        field: &str,
        query: String,
        request: Value,
    ) -> LensApiResult<Page<Profile>> {
        let data = self.query(operation, field, query, request).await?;
        let (items, next) = split_page(&data);
        Ok(Page {
            items: items.iter().filter_map(profile_from_api).collect(),
            next,
        })
    }

    async fn publication_page(&self, request: Value) -> LensApiResult<Page<Publication>> {
        let data = self
            .query("Publications", "publications", publications_query(), request)
            .await?;
        let (items, next) = split_page(&data);
        Ok(Page {
            items: items.iter().filter_map(publication_from_api).collect(),
            next,
        })
    }
}

/// `data.<field>` of a GraphQL payload. A null or missing result is
/// reported as not found, the same as an HTTP 404.
fn extract_data(operation: &str, field: &str, mut payload: Value) -> LensApiResult<Value> {
    let data = payload
        .get_mut("data")
        .and_then(|d| d.get_mut(field))
        .map(Value::take);
    match data {
        Some(Value::Null) | None => {
            if let Some(errors) = payload.get("errors") {
                tracing::debug!("[LensApi] {} errors: {}", operation, errors);
            }
            Err(LensApiError::NotFound(operation.to_string()))
        }
        Some(data) => Ok(data),
    }
}

fn split_page(data: &Value) -> (Vec<Value>, Option<String>) {
    let items = data
        .get("items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let next = data
        .get("pageInfo")
        .and_then(|p| p.get("next"))
        .and_then(Value::as_str)
        .map(str::to_string);
    (items, next)
}

fn with_cursor(mut request: Value, cursor: Option<&str>) -> Value {
    if let (Some(cursor), Value::Object(map)) = (cursor, &mut request) {
        map.insert("cursor".to_string(), Value::String(cursor.to_string()));
    }
    request
}

#[async_trait]
impl LensApi for GraphQlLensApi {
    async fn explore_profiles(
        &self,
        cursor: Option<&str>,
        limit: i64,
    ) -> LensApiResult<Page<Profile>> {
        let request = with_cursor(json!({ "sortCriteria": "CREATED_ON", "limit": limit }), cursor);
        self.profile_page(
            "ExploreProfiles",
            "exploreProfiles",
            explore_profiles_query(),
            request,
        )
        .await
    }

    async fn profiles_by_ids(&self, ids: &[String]) -> LensApiResult<Vec<Profile>> {
        let request = json!({ "profileIds": ids, "limit": ids.len() });
        Ok(self
            .profile_page("Profiles", "profiles", profiles_query(), request)
            .await?
            .items)
    }

    async fn profiles_by_owners(
        &self,
        owners: &[String],
        cursor: Option<&str>,
        limit: i64,
    ) -> LensApiResult<Page<Profile>> {
        let request = with_cursor(json!({ "ownedBy": owners, "limit": limit }), cursor);
        self.profile_page("Profiles", "profiles", profiles_query(), request)
            .await
    }

    async fn publications_by_profile(
        &self,
        profile_id: &str,
        cursor: Option<&str>,
        limit: i64,
    ) -> LensApiResult<Page<Publication>> {
        let request = with_cursor(
            json!({
                "profileId": profile_id,
                "publicationTypes": ["POST", "COMMENT", "MIRROR"],
                "limit": limit,
            }),
            cursor,
        );
        self.publication_page(request).await
    }

    async fn publications_by_ids(&self, ids: &[String]) -> LensApiResult<Vec<Publication>> {
        let request = json!({ "publicationIds": ids, "limit": ids.len() });
        Ok(self.publication_page(request).await?.items)
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn int_field(value: &Value, key: &str) -> i64 {
    value.get(key).and_then(Value::as_i64).unwrap_or(0)
}

/// Normalizes one API profile. Items without an id are dropped.
pub fn profile_from_api(value: &Value) -> Option<Profile> {
    let id = str_field(value, "id")?;
    let stats = value.get("stats").cloned().unwrap_or(Value::Null);
    Some(Profile {
        id,
        owned_by: str_field(value, "ownedBy"),
        handle: str_field(value, "handle"),
        name: str_field(value, "name"),
        bio: str_field(value, "bio"),
        picture: value.get("picture").and_then(real_image_uri_value),
        cover_picture: value.get("coverPicture").and_then(real_image_uri_value),
        metadata: str_field(value, "metadata"),
        attributes: value.get("attributes").filter(|a| !a.is_null()).cloned(),
        app_id: None,
        follow_module: value
            .get("followModule")
            .and_then(|m| str_field(m, "__typename")),
        follow_nft_uri: None,
        dispatcher: value.get("dispatcher").and_then(|d| str_field(d, "address")),
        is_default: value.get("isDefault").and_then(Value::as_bool).unwrap_or(false),
        created_at: None,
        stats: ProfileStats {
            total_followers: int_field(&stats, "totalFollowers"),
            total_following: int_field(&stats, "totalFollowing"),
            total_posts: int_field(&stats, "totalPosts"),
            total_comments: int_field(&stats, "totalComments"),
            total_mirrors: int_field(&stats, "totalMirrors"),
            total_publications: int_field(&stats, "totalPublications"),
            total_collects: int_field(&stats, "totalCollects"),
            lu_followed: None,
            lu_fnt: None,
        },
        pull_status: None,
        last_updates: Default::default(),
    })
}

/// Normalizes one API publication. Unknown variants are dropped.
pub fn publication_from_api(value: &Value) -> Option<Publication> {
    let kind = match value.get("__typename").and_then(Value::as_str)? {
        "Post" => PublicationKind::Post,
        "Comment" => PublicationKind::Comment,
        "Mirror" => PublicationKind::Mirror,
        _ => return None,
    };
    let id = str_field(value, "id")?;
    let profile_id = value.get("profile").and_then(|p| str_field(p, "id"))?;
    let stats = value.get("stats").cloned().unwrap_or(Value::Null);
    let reference = |key: &str| {
        value
            .get(key)
            .and_then(|r| str_field(r, "id"))
            .map(|id| PublicationRef { id })
    };

    let mut publication = Publication::new(id, kind, profile_id);
    publication.content_uri = str_field(value, "onChainContentURI");
    publication.metadata = value.get("metadata").filter(|m| !m.is_null()).cloned();
    publication.app_id = str_field(value, "appId");
    publication.collect_module = value
        .get("collectModule")
        .and_then(|m| str_field(m, "__typename"));
    publication.reference_module = value
        .get("referenceModule")
        .and_then(|m| str_field(m, "__typename"));
    publication.comment_on = reference("commentOn");
    publication.mirror_of = reference("mirrorOf");
    publication.created_at = str_field(value, "createdAt");
    publication.stats = PublicationStats {
        total_amount_of_collects: int_field(&stats, "totalAmountOfCollects"),
        total_amount_of_mirrors: int_field(&stats, "totalAmountOfMirrors"),
        total_amount_of_comments: int_field(&stats, "totalAmountOfComments"),
        lu_collected: None,
    };
    Some(publication)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_profile_from_api() {
        let profile = profile_from_api(&json!({
            "id": "0xa1",
            "handle": "alice.lens",
            "name": "Alice",
            "bio": "",
            "ownedBy": "0x00000000000000000000000000000000000000A1",
            "isDefault": true,
            "picture": {"original": {"url": "ipfs://QmPic"}},
            "coverPicture": null,
            "dispatcher": null,
            "followModule": {"__typename": "FeeFollowModuleSettings"},
            "stats": {"totalFollowers": 12, "totalPosts": 3, "totalPublications": 4}
        }))
        .unwrap();

        assert_eq!(profile.id, "0xa1");
        assert_eq!(profile.bio, None);
        assert_eq!(
            profile.picture.as_deref(),
            Some("https://lens.infura-ipfs.io/ipfs/QmPic")
        );
        assert_eq!(profile.cover_picture, None);
        assert_eq!(profile.follow_module.as_deref(), Some("FeeFollowModuleSettings"));
        assert!(profile.is_default);
        assert_eq!(profile.stats.total_followers, 12);
        assert_eq!(profile.stats.total_following, 0);
        assert_eq!(profile.stats.total_publications, 4);
        assert!(profile.last_updates.is_empty());
    }

    #[test]
    fn test_profile_without_id_is_dropped() {
        assert_eq!(profile_from_api(&json!({"handle": "x.lens"})), None);
    }

    #[test]
    fn test_publication_from_api() {
        let comment = publication_from_api(&json!({
            "__typename": "Comment",
            "id": "0xa1-0x02",
            "profile": {"id": "0xa1"},
            "onChainContentURI": "ipfs://QmContent",
            "createdAt": "2022-12-01T00:00:00.000Z",
            "appId": "lenster",
            "metadata": {"content": "gm"},
            "commentOn": {"id": "0xb2-0x01"},
            "stats": {"totalAmountOfCollects": 2}
        }))
        .unwrap();

        assert_eq!(comment.kind, PublicationKind::Comment);
        assert_eq!(comment.profile_id, "0xa1");
        assert_eq!(comment.comment_on.unwrap().id, "0xb2-0x01");
        assert_eq!(comment.mirror_of, None);
        assert_eq!(comment.app_id.as_deref(), Some("lenster"));
        assert_eq!(comment.metadata, Some(json!({"content": "gm"})));
        assert_eq!(comment.stats.total_amount_of_collects, 2);

        assert_eq!(
            publication_from_api(&json!({"__typename": "Unknown", "id": "0x01-0x01"})),
            None
        );
    }

    #[test]
    fn test_null_data_is_not_found() {
        let err = extract_data("Profiles", "profiles", json!({"data": {"profiles": null}}))
            .unwrap_err();
        assert_eq!(err, LensApiError::NotFound("Profiles".to_string()));
        assert!(extract_data("Profiles", "profiles", json!({"errors": []})).is_err());

        let data = extract_data(
            "Profiles",
            "profiles",
            json!({"data": {"profiles": {"items": [], "pageInfo": {"next": "{\"offset\":50}"}}}}),
        )
        .unwrap();
        let (items, next) = split_page(&data);
        assert!(items.is_empty());
        assert_eq!(next.as_deref(), Some("{\"offset\":50}"));
    }

    #[test]
    fn test_cursor_is_only_sent_when_present() {
        assert_eq!(with_cursor(json!({"limit": 50}), None), json!({"limit": 50}));
        assert_eq!(
            with_cursor(json!({"limit": 50}), Some("abc")),
            json!({"limit": 50, "cursor": "abc"})
        );
    }
}
