//! Static resources: the module binary, the roster and avatar images.
//!
//! Names resolve against a base that is either a local directory or an
//! HTTP(S) URL. Names that are absolute HTTP(S) URLs are fetched as-is.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use bytes::Bytes;
use reqwest::Url;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::feed::Person;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("invalid resource location {location:?}: {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch {url}")]
    Http {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed roster {name}")]
    Roster {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceBase {
    Dir(PathBuf),
    Url(Url),
}

impl FromStr for ResourceBase {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !is_http(s) {
            return Ok(Self::Dir(PathBuf::from(s)));
        }
        // Without a trailing slash `join` would replace the last segment.
        let with_slash = if s.ends_with('/') {
            s.to_string()
        } else {
            format!("{s}/")
        };
        Url::parse(&with_slash)
            .map(Self::Url)
            .map_err(|e| ResourceError::InvalidLocation {
                location: s.to_string(),
                reason: e.to_string(),
            })
    }
}

#[derive(Debug)]
enum Location {
    Path(PathBuf),
    Url(Url),
}

fn is_http(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Avatar bytes fetched at startup, keyed by the name the roster uses.
/// Failures are kept individually.
#[derive(Debug, Default, Clone)]
pub struct AvatarCache {
    images: HashMap<String, Bytes>,
    failed: Vec<String>,
}

impl AvatarCache {
    pub fn get(&self, avatar: &str) -> Option<&Bytes> {
        self.images.get(avatar)
    }

    pub fn contains(&self, avatar: &str) -> bool {
        self.images.contains_key(avatar)
    }

    pub fn loaded(&self) -> usize {
        self.images.len()
    }

    /// Avatars that could not be fetched, sorted.
    pub fn failed(&self) -> &[String] {
        &self.failed
    }
}

#[derive(Debug, Clone)]
pub struct Resources {
    base: ResourceBase,
    client: reqwest::Client,
}

impl Resources {
    pub fn new(base: ResourceBase) -> Self {
        Self {
            base,
            client: reqwest::Client::new(),
        }
    }

    fn locate(&self, name: &str) -> Result<Location, ResourceError> {
        let invalid = |e: &dyn std::fmt::Display| ResourceError::InvalidLocation {
            location: name.to_string(),
            reason: e.to_string(),
        };
        if is_http(name) {
            return Url::parse(name).map(Location::Url).map_err(|e| invalid(&e));
        }
        match &self.base {
            ResourceBase::Dir(dir) => Ok(Location::Path(dir.join(name))),
            ResourceBase::Url(base) => base.join(name).map(Location::Url).map_err(|e| invalid(&e)),
        }
    }

    pub async fn fetch(&self, name: &str) -> Result<Bytes, ResourceError> {
        match self.locate(name)? {
            Location::Path(path) => match tokio::fs::read(&path).await {
                Ok(data) => Ok(Bytes::from(data)),
                Err(source) => Err(ResourceError::Io { path, source }),
            },
            Location::Url(url) => {
                let http = |source| ResourceError::Http {
                    url: url.clone(),
                    source,
                };
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(http)?;
                response.bytes().await.map_err(http)
            }
        }
    }

    /// Load the roster: a JSON array of people.
    pub async fn load_roster(&self, name: &str) -> Result<Vec<Person>, ResourceError> {
        let raw = self.fetch(name).await?;
        let people: Vec<Person> =
            serde_json::from_slice(&raw).map_err(|source| ResourceError::Roster {
                name: name.to_string(),
                source,
            })?;
        tracing::info!(count = people.len(), roster = name, "roster loaded");
        Ok(people)
    }

    /// Fetch every distinct avatar once, concurrently, and keep the bytes.
    pub async fn preload_avatars(&self, people: &[Person]) -> AvatarCache {
        let mut avatars: Vec<&str> = people.iter().map(|p| p.avatar.as_str()).collect();
        avatars.sort_unstable();
        avatars.dedup();

        let mut set = JoinSet::new();
        for avatar in avatars {
            let resources = self.clone();
            let avatar = avatar.to_string();
            set.spawn(async move {
                let result = resources.fetch(&avatar).await;
                (avatar, result)
            });
        }

        let mut cache = AvatarCache::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((avatar, Ok(bytes))) => {
                    cache.images.insert(avatar, bytes);
                }
                Ok((avatar, Err(err))) => {
                    tracing::warn!(avatar = %avatar, error = %err, "avatar preload failed");
                    cache.failed.push(avatar);
                }
                Err(err) => tracing::warn!(error = %err, "avatar preload task failed"),
            }
        }
        cache.failed.sort();
        let bytes: usize = cache.images.values().map(Bytes::len).sum();
        tracing::info!(
            loaded = cache.loaded(),
            failed = cache.failed.len(),
            bytes,
            "avatars preloaded"
        );
        cache
    }
}
