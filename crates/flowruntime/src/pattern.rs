use crate::WatcherError;
use regex::Regex;
use std::fmt;

/// File pattern of a watcher entry.
///
/// `*` alone matches everything. A pattern containing `*` is a wildcard
/// anchored at both ends, `*` standing for any run of characters. Any other
/// pattern matches every path that contains it.
#[derive(Clone)]
pub struct FilePattern {
    source: String,
    matcher: Matcher,
}

#[derive(Clone)]
enum Matcher {
    Any,
    Wildcard(Regex),
    Substring,
}

impl FilePattern {
    /// Fails for patterns no file path can match, such as one containing a
    /// NUL byte.
    pub fn parse(pattern: &str) -> Result<Self, WatcherError> {
        if pattern.contains('\0') {
            return Err(WatcherError::InvalidPattern {
                pattern: pattern.escape_default().to_string(),
                reason: "contains a NUL byte".to_string(),
            });
        }

        let matcher = if pattern == "*" {
            Matcher::Any
        } else if pattern.contains('*') {
            let body = pattern
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            let regex = Regex::new(&format!("^{}$", body)).map_err(|e| {
                WatcherError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                }
            })?;
            Matcher::Wildcard(regex)
        } else {
            Matcher::Substring
        };

        Ok(Self {
            source: pattern.to_string(),
            matcher,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, path: &str) -> bool {
        match &self.matcher {
            Matcher::Any => true,
            Matcher::Wildcard(regex) => regex.is_match(path),
            Matcher::Substring => path.contains(&self.source),
        }
    }
}

impl fmt::Debug for FilePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FilePattern").field(&self.source).finish()
    }
}

impl fmt::Display for FilePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
