//! Store paths and their REST URLs
//!
//! A store path such as `"todos/list/"` addresses one node of the JSON tree.
//! Its REST resource is `{base}/todos/list.json`. Leading, trailing and
//! repeated slashes carry no meaning and are dropped.

use std::fmt;

use url::Url;

use crate::error::{Result, RtdbClientError};

/// Characters the store rejects inside a key
const FORBIDDEN_KEY_CHARS: &[char] = &['.', '$', '#', '[', ']'];

/// A normalized path into the document tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    /// The root of the tree
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse and validate a slash-separated path
    pub fn parse(path: &str) -> Result<Self> {
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.contains(FORBIDDEN_KEY_CHARS) || s.chars().any(char::is_control) {
                    Err(RtdbClientError::InvalidPath(path.to_string()))
                } else {
                    Ok(s.to_string())
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { segments })
    }

    /// REST resource URL for this path under `base`
    pub fn resource_url(&self, base: &Url) -> Result<Url> {
        let names: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        resource_url(base, &names)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

/// Build `{base}/{segments...}.json`, percent-encoding each segment.
///
/// Used directly for reserved locations such as `.settings/rules` that
/// [`StorePath`] refuses to parse.
pub(crate) fn resource_url(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| RtdbClientError::InvalidPath(base.to_string()))?;
        path.pop_if_empty();
        match segments.split_last() {
            Some((last, parents)) => {
                path.extend(parents);
                path.push(&format!("{}.json", last));
            }
            None => {
                path.push(".json");
            }
        }
    }
    Ok(url)
}
