//! Instagram timeline, story and profile fetcher
//!
//! Timeline and story reels come from the GraphQL `query/` endpoint,
//! owner profiles from `/{username}/?__a=1`. Both GraphQL feeds are sent
//! with session credentials obtained through the platform's [`AuthSession`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use serde_json::{json, Value};

use super::auth::{run_authorized, AuthSession, Authenticator};
use super::fetcher::PlatformClient;
use super::{FeedKind, SourceFetcher};
use crate::config::InstagramConfig;
use crate::models::{
    ContentItem, Credentials, ItemPayload, MediaKind, OwnerProfile, Platform, PostMedia,
    PostPayload, SidecarChild, Source, StoryPayload,
};
use crate::utils::error::{AuthError, FetchError};
use crate::utils::from_unix_secs;

const FEEDS: &[FeedKind] = &[FeedKind::Timeline, FeedKind::Stories];

const X_CSRF_TOKEN: &str = "x-csrftoken";

/// Instagram implementation of [`SourceFetcher`]
pub struct InstagramFetcher {
    client: Arc<PlatformClient>,
    session: AuthSession,
    graphql_url: String,
    web_url: String,
    timeline_hash: String,
    stories_hash: String,
    page_size: u32,
    max_attempts: u32,
}

impl InstagramFetcher {
    pub fn new(client: Arc<PlatformClient>, session: AuthSession, config: &InstagramConfig) -> Self {
        Self {
            client,
            session,
            graphql_url: config.graphql_url.trim_end_matches('/').to_string(),
            web_url: config.web_url.trim_end_matches('/').to_string(),
            timeline_hash: config.timeline_hash.clone(),
            stories_hash: config.stories_hash.clone(),
            page_size: config.page_size,
            max_attempts: config.max_login_attempts,
        }
    }

    /// Run one GraphQL query with the given credentials
    async fn query(
        &self,
        query_hash: &str,
        variables: &Value,
        credentials: &Credentials,
    ) -> Result<Value, FetchError> {
        let url = format!("{}/query/", self.graphql_url);
        let params = [
            ("query_hash", query_hash.to_string()),
            ("variables", variables.to_string()),
        ];
        self.client
            .get_json(&url, &params, session_headers(credentials))
            .await
    }

    async fn authorized_query(&self, query_hash: &str, variables: Value) -> Result<Value, FetchError> {
        run_authorized(&self.session, self.max_attempts, |credentials| {
            let variables = &variables;
            async move { self.query(query_hash, variables, &credentials).await }
        })
        .await
    }
}

#[async_trait]
impl SourceFetcher for InstagramFetcher {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn feeds(&self) -> &'static [FeedKind] {
        FEEDS
    }

    async fn fetch(&self, source: &Source, feed: FeedKind) -> Result<Vec<ContentItem>, FetchError> {
        match feed {
            FeedKind::Timeline => {
                let variables = json!({ "id": source.source_id, "first": self.page_size });
                let body = self.authorized_query(&self.timeline_hash, variables).await?;
                parse_timeline(source, &body)
            }
            FeedKind::Stories => {
                let variables = json!({
                    "reel_ids": [source.source_id],
                    "precomposed_overlay": false,
                    "show_story_viewer_list": false,
                    "stories_video_dash_manifest": false,
                });
                let body = self.authorized_query(&self.stories_hash, variables).await?;
                parse_stories(source, &body)
            }
            FeedKind::Videos => Ok(Vec::new()),
        }
    }

    async fn owner_profile(
        &self,
        _source: &Source,
        item: &ContentItem,
    ) -> Result<Option<OwnerProfile>, FetchError> {
        let Some(username) = item.owner_username() else {
            return Ok(None);
        };

        let url = format!("{}/{}/", self.web_url, username);
        let body = self
            .client
            .get_json(&url, &[("__a", "1".to_string())], HeaderMap::new())
            .await?;
        parse_profile(&body).map(Some)
    }
}

fn session_headers(credentials: &Credentials) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(token) = HeaderValue::from_str(&credentials.token) {
        headers.insert(X_CSRF_TOKEN, token);
    }
    if let Ok(cookie) = HeaderValue::from_str(&credentials.cookie) {
        headers.insert(COOKIE, cookie);
    }
    headers
}

fn str_field<'a>(node: &'a Value, pointer: &str) -> Option<&'a str> {
    node.pointer(pointer).and_then(Value::as_str)
}

/// Ids arrive as strings from GraphQL but as numbers from some endpoints
fn id_field(node: &Value, pointer: &str) -> Option<String> {
    match node.pointer(pointer)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse a timeline query response
///
/// A response without `data.user` is malformed. Individual nodes missing
/// required fields are skipped.
pub fn parse_timeline(source: &Source, body: &Value) -> Result<Vec<ContentItem>, FetchError> {
    let edges = body
        .pointer("/data/user/edge_owner_to_timeline_media/edges")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Malformed("missing data.user timeline edges".into()))?;

    Ok(edges
        .iter()
        .filter_map(|edge| {
            let post = parse_post(source, edge.get("node")?);
            if post.is_none() {
                tracing::debug!(source = %source, "Skipping incomplete timeline node");
            }
            post
        })
        .collect())
}

fn parse_post(source: &Source, node: &Value) -> Option<ContentItem> {
    let item_id = id_field(node, "/id")?;
    let shortcode = str_field(node, "/shortcode")?.to_string();
    let owner_username = str_field(node, "/owner/username")?.to_string();
    let published_at = from_unix_secs(node.get("taken_at_timestamp")?.as_i64()?)?;
    let caption = str_field(node, "/edge_media_to_caption/edges/0/node/text").map(String::from);
    let display_url = str_field(node, "/display_url").unwrap_or_default().to_string();

    let media = match str_field(node, "/__typename")? {
        "GraphVideo" => PostMedia::Video {
            display_url,
            video_url: str_field(node, "/video_url")?.to_string(),
        },
        "GraphSidecar" => {
            let children = node
                .pointer("/edge_sidecar_to_children/edges")
                .and_then(Value::as_array)
                .map(|edges| {
                    edges
                        .iter()
                        .filter_map(|e| parse_sidecar_child(e.get("node")?))
                        .collect()
                })
                .unwrap_or_default();
            PostMedia::Sidecar { children }
        }
        _ => PostMedia::Image { display_url },
    };

    Some(ContentItem {
        item_id,
        source: source.clone(),
        published_at,
        payload: ItemPayload::Post(PostPayload {
            shortcode,
            owner_username,
            caption,
            media,
        }),
    })
}

fn parse_sidecar_child(node: &Value) -> Option<SidecarChild> {
    let kind = match str_field(node, "/__typename")? {
        "GraphImage" => MediaKind::Image,
        "GraphVideo" => MediaKind::Video,
        _ => return None,
    };
    Some(SidecarChild {
        id: id_field(node, "/id")?,
        kind,
        display_url: str_field(node, "/display_url")?.to_string(),
        video_url: str_field(node, "/video_url").map(String::from),
    })
}

/// Parse a story reel query response
///
/// An empty `reels_media` list means the source has no live stories.
pub fn parse_stories(source: &Source, body: &Value) -> Result<Vec<ContentItem>, FetchError> {
    let reels = body
        .pointer("/data/reels_media")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Malformed("missing data.reels_media".into()))?;

    let Some(reel) = reels.first() else {
        return Ok(Vec::new());
    };

    let items = reel
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Malformed("story reel without items".into()))?;

    Ok(items
        .iter()
        .filter_map(|node| parse_story(source, node))
        .collect())
}

fn parse_story(source: &Source, node: &Value) -> Option<ContentItem> {
    let video_url = if str_field(node, "/__typename") == Some("GraphStoryVideo") {
        node.get("video_resources")
            .and_then(Value::as_array)
            .and_then(|resources| resources.last())
            .and_then(|r| str_field(r, "/src"))
            .map(String::from)
    } else {
        None
    };

    Some(ContentItem {
        item_id: id_field(node, "/id")?,
        source: source.clone(),
        published_at: from_unix_secs(node.get("taken_at_timestamp")?.as_i64()?)?,
        payload: ItemPayload::Story(StoryPayload {
            owner_username: str_field(node, "/owner/username")?.to_string(),
            display_url: str_field(node, "/display_url")?.to_string(),
            expires_at: node
                .get("expiring_at_timestamp")
                .and_then(Value::as_i64)
                .and_then(from_unix_secs),
            video_url,
        }),
    })
}

/// Parse a `?__a=1` profile response
pub fn parse_profile(body: &Value) -> Result<OwnerProfile, FetchError> {
    let user = body
        .pointer("/graphql/user")
        .ok_or_else(|| FetchError::Malformed("missing graphql.user".into()))?;

    let username = str_field(user, "/username")
        .ok_or_else(|| FetchError::Malformed("profile without username".into()))?;

    Ok(OwnerProfile {
        username: username.to_string(),
        full_name: str_field(user, "/full_name").unwrap_or(username).to_string(),
        avatar_url: str_field(user, "/profile_pic_url").map(String::from),
    })
}

/// Instagram web login exchange
pub struct InstagramLogin {
    client: Arc<PlatformClient>,
    web_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl InstagramLogin {
    pub fn new(client: Arc<PlatformClient>, config: &InstagramConfig) -> Self {
        Self {
            client,
            web_url: config.web_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }
}

#[async_trait]
impl Authenticator for InstagramLogin {
    async fn login(&self) -> Result<Credentials, AuthError> {
        let (Some(username), Some(password)) = (&self.username, &self.password) else {
            return Err(AuthError::MissingCredentials);
        };

        let referer = format!("{}/accounts/login/", self.web_url);

        // The login page sets the csrftoken cookie the AJAX login expects
        self.client.ready().await;
        let page = self
            .client
            .http()
            .get(&referer)
            .headers(self.client.build_headers(None))
            .send()
            .await?;
        let csrf_token = page
            .cookies()
            .find(|c| c.name() == "csrftoken")
            .map(|c| c.value().to_string())
            .ok_or_else(|| AuthError::Malformed("login page did not set csrftoken".into()))?;

        let enc_password = format!(
            "#PWD_INSTAGRAM_BROWSER:0:{}:{}",
            Utc::now().timestamp(),
            password
        );
        let form = [
            ("username", username.as_str()),
            ("enc_password", enc_password.as_str()),
            ("queryParams", "{}"),
            ("optIntoOneTap", "false"),
        ];

        let mut headers = self.client.build_headers(Some(&referer));
        if let Ok(value) = HeaderValue::from_str(&csrf_token) {
            headers.insert(X_CSRF_TOKEN, value);
        }
        if let Ok(value) = HeaderValue::from_str(&format!("csrftoken={csrf_token}")) {
            headers.insert(COOKIE, value);
        }
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));

        self.client.ready().await;
        let response = self
            .client
            .http()
            .post(format!("{}/accounts/login/ajax/", self.web_url))
            .headers(headers)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let mut cookies: Vec<(String, String)> = response
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        let body: Value = response
            .json()
            .await
            .map_err(|e| AuthError::Malformed(format!("login response: {e}")))?;

        if !status.is_success() || body.get("authenticated").and_then(Value::as_bool) != Some(true) {
            let reason = str_field(&body, "/message")
                .map(String::from)
                .unwrap_or_else(|| format!("status {status}, authenticated != true"));
            return Err(AuthError::Rejected(reason));
        }

        let token = cookies
            .iter()
            .find(|(name, _)| name == "csrftoken")
            .map(|(_, value)| value.clone())
            .unwrap_or(csrf_token);
        if !cookies.iter().any(|(name, _)| name == "csrftoken") {
            cookies.push(("csrftoken".to_string(), token.clone()));
        }

        let cookie = cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");

        Ok(Credentials {
            token,
            cookie,
            generation: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> Source {
        Source::new(Platform::Instagram, "1234")
    }

    fn timeline_body() -> Value {
        json!({
            "data": { "user": { "edge_owner_to_timeline_media": { "edges": [
                { "node": {
                    "id": "p2", "shortcode": "BBB", "__typename": "GraphVideo",
                    "owner": { "username": "haseul" }, "taken_at_timestamp": 200,
                    "display_url": "https://cdn/p2.jpg", "video_url": "https://cdn/p2.mp4",
                    "edge_media_to_caption": { "edges": [] }
                }},
                { "node": {
                    "id": "p1", "shortcode": "AAA", "__typename": "GraphSidecar",
                    "owner": { "username": "haseul" }, "taken_at_timestamp": 100,
                    "display_url": "https://cdn/p1.jpg",
                    "edge_media_to_caption": { "edges": [ { "node": { "text": "hi @vivi" } } ] },
                    "edge_sidecar_to_children": { "edges": [
                        { "node": { "id": "c1", "__typename": "GraphImage", "display_url": "https://cdn/c1.jpg" } },
                        { "node": { "id": "c2", "__typename": "GraphVideo", "display_url": "https://cdn/c2.jpg", "video_url": "https://cdn/c2.mp4" } }
                    ]}
                }},
                { "node": { "id": "broken" } }
            ]}}}
        })
    }

    #[test]
    fn test_parse_timeline() {
        let items = parse_timeline(&source(), &timeline_body()).unwrap();
        assert_eq!(items.len(), 2);

        let ItemPayload::Post(video) = &items[0].payload else {
            panic!("expected post");
        };
        assert!(matches!(video.media, PostMedia::Video { .. }));
        assert!(video.caption.is_none());

        let ItemPayload::Post(sidecar) = &items[1].payload else {
            panic!("expected post");
        };
        assert_eq!(sidecar.caption.as_deref(), Some("hi @vivi"));
        let PostMedia::Sidecar { children } = &sidecar.media else {
            panic!("expected sidecar");
        };
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].kind, MediaKind::Video);
        assert_eq!(children[1].video_url.as_deref(), Some("https://cdn/c2.mp4"));
    }

    #[test]
    fn test_parse_timeline_without_data_is_malformed() {
        let result = parse_timeline(&source(), &json!({ "data": null }));
        assert!(matches!(result, Err(FetchError::Malformed(_))));
    }

    #[test]
    fn test_parse_stories() {
        let body = json!({ "data": { "reels_media": [ { "items": [
            { "id": "s1", "__typename": "GraphStoryImage", "owner": { "username": "haseul" },
              "display_url": "https://cdn/s1.jpg", "taken_at_timestamp": 50, "expiring_at_timestamp": 86450 },
            { "id": "s2", "__typename": "GraphStoryVideo", "owner": { "username": "haseul" },
              "display_url": "https://cdn/s2.jpg", "taken_at_timestamp": 60, "expiring_at_timestamp": 86460,
              "video_resources": [ { "src": "https://cdn/low.mp4" }, { "src": "https://cdn/high.mp4" } ] }
        ]}]}});

        let items = parse_stories(&source(), &body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].expires_at().unwrap().timestamp(), 86450);

        let ItemPayload::Story(story) = &items[1].payload else {
            panic!("expected story");
        };
        assert_eq!(story.video_url.as_deref(), Some("https://cdn/high.mp4"));
    }

    #[test]
    fn test_parse_empty_reel() {
        let body = json!({ "data": { "reels_media": [] } });
        assert!(parse_stories(&source(), &body).unwrap().is_empty());
    }

    #[test]
    fn test_parse_profile() {
        let body = json!({ "graphql": { "user": {
            "username": "haseul", "full_name": "HaSeul", "profile_pic_url": "https://cdn/pp.jpg"
        }}});
        let profile = parse_profile(&body).unwrap();
        assert_eq!(profile.full_name, "HaSeul");
        assert_eq!(profile.avatar_url.as_deref(), Some("https://cdn/pp.jpg"));

        assert!(parse_profile(&json!({})).is_err());
    }

    #[test]
    fn test_session_headers() {
        let headers = session_headers(&Credentials {
            token: "tok".into(),
            cookie: "sessionid=1; csrftoken=tok".into(),
            generation: 1,
        });
        assert_eq!(headers.get("x-csrftoken").unwrap(), "tok");
        assert_eq!(headers.get(COOKIE).unwrap(), "sessionid=1; csrftoken=tok");
    }
}
