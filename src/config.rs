use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::resolve::ResolvedEntry;

/// Upper bound for `Cache-Control: max-age`, one year.
pub const MAX_MAX_AGE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Hook invoked on successful content responses, after the standard headers are set.
pub type SetHeaders = Arc<dyn Fn(&mut HeaderMap, &ResolvedEntry) + Send + Sync>;

/// How path segments starting with `.` are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dotfiles {
    Allow,
    Deny,
    #[default]
    Ignore,
}

/// Index file names tried, in order, when a directory is requested with a trailing slash.
///
/// An empty list disables index serving.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "IndexRepr")]
pub struct IndexFiles(Vec<String>);

impl IndexFiles {
    pub fn disabled() -> Self {
        Self(Vec::new())
    }

    pub fn is_enabled(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for IndexFiles {
    fn default() -> Self {
        Self(vec!["index.html".to_owned()])
    }
}

impl From<&str> for IndexFiles {
    fn from(value: &str) -> Self {
        Self(vec![value.to_owned()])
    }
}

impl From<Vec<String>> for IndexFiles {
    fn from(value: Vec<String>) -> Self {
        Self(value)
    }
}

impl<const N: usize> From<[&str; N]> for IndexFiles {
    fn from(value: [&str; N]) -> Self {
        Self(value.iter().map(|name| (*name).to_owned()).collect())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IndexRepr {
    Toggle(bool),
    One(String),
    Many(Vec<String>),
}

impl From<IndexRepr> for IndexFiles {
    fn from(value: IndexRepr) -> Self {
        match value {
            IndexRepr::Toggle(true) => IndexFiles::default(),
            IndexRepr::Toggle(false) => IndexFiles::disabled(),
            IndexRepr::One(name) => IndexFiles(vec![name]),
            IndexRepr::Many(names) => IndexFiles(names),
        }
    }
}

/// `Cache-Control` max-age, clamped to [`MAX_MAX_AGE`].
///
/// Parses from milliseconds or from duration strings such as `"30d"`, `"2 hours"` or
/// `"Infinity"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "MaxAgeRepr")]
pub struct MaxAge(Duration);

impl MaxAge {
    pub const INFINITE: MaxAge = MaxAge(MAX_MAX_AGE);

    pub fn from_millis(millis: f64) -> Self {
        if millis.is_nan() || millis <= 0.0 {
            return MaxAge(Duration::ZERO);
        }

        let max = MAX_MAX_AGE.as_millis() as f64;
        MaxAge(Duration::from_millis(millis.min(max) as u64))
    }

    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }
}

impl From<Duration> for MaxAge {
    fn from(value: Duration) -> Self {
        MaxAge(value.min(MAX_MAX_AGE))
    }
}

impl FromStr for MaxAge {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidMaxAge(s.to_owned());

        let value = s.trim().to_ascii_lowercase();
        if matches!(value.as_str(), "infinity" | "+infinity" | "inf") {
            return Ok(MaxAge::INFINITE);
        }

        let split = value
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
            .unwrap_or(value.len());
        let (number, unit) = value.split_at(split);
        let number: f64 = number.parse().map_err(|_| invalid())?;

        let millis_per_unit = match unit.trim() {
            "" | "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1.0,
            "s" | "sec" | "secs" | "second" | "seconds" => 1_000.0,
            "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
            "h" | "hr" | "hrs" | "hour" | "hours" => 3_600_000.0,
            "d" | "day" | "days" => 86_400_000.0,
            "w" | "week" | "weeks" => 604_800_000.0,
            "y" | "yr" | "yrs" | "year" | "years" => 31_557_600_000.0,
            _ => return Err(invalid()),
        };

        Ok(MaxAge::from_millis(number * millis_per_unit))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MaxAgeRepr {
    Millis(f64),
    Text(String),
}

impl TryFrom<MaxAgeRepr> for MaxAge {
    type Error = ConfigError;

    fn try_from(value: MaxAgeRepr) -> Result<Self, Self::Error> {
        match value {
            MaxAgeRepr::Millis(millis) => Ok(MaxAge::from_millis(millis)),
            MaxAgeRepr::Text(text) => text.parse(),
        }
    }
}

/// Per-mount serving options. Every field has a default, so any subset can be loaded from
/// a config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServeOptions {
    pub index: IndexFiles,
    pub extensions: Vec<String>,
    pub dotfiles: Dotfiles,
    /// Pass resolution failures and unsupported methods to the next handler.
    pub fallthrough: bool,
    /// Redirect directory requests lacking a trailing slash.
    pub redirect: bool,
    pub max_age: MaxAge,
    pub immutable: bool,
    pub last_modified: bool,
    pub etag: bool,
    pub cache_control: bool,
    pub accept_ranges: bool,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            index: IndexFiles::default(),
            extensions: Vec::new(),
            dotfiles: Dotfiles::default(),
            fallthrough: true,
            redirect: true,
            max_age: MaxAge::default(),
            immutable: false,
            last_modified: true,
            etag: true,
            cache_control: true,
            accept_ranges: true,
        }
    }
}

impl ServeOptions {
    /// Extensions without their leading dot.
    pub(crate) fn fallback_extensions(&self) -> impl Iterator<Item = &str> {
        self.extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.'))
            .filter(|ext| !ext.is_empty())
    }

    pub(crate) fn cache_control_value(&self) -> Option<String> {
        if !self.cache_control {
            return None;
        }

        let mut value = format!("public, max-age={}", self.max_age.as_secs());
        if self.immutable {
            value.push_str(", immutable");
        }

        Some(value)
    }
}

/// Immutable configuration of one mount: the root directory plus its options.
#[derive(Clone)]
pub struct ServeConfig {
    pub(crate) root: PathBuf,
    pub(crate) options: ServeOptions,
    pub(crate) set_headers: Option<SetHeaders>,
}

impl ServeConfig {
    /// Validate `root` and build the configuration.
    ///
    /// Fails if `root` is empty, missing or not a directory.
    pub fn new<P: Into<PathBuf>>(root: P, options: ServeOptions) -> Result<Self, ConfigError> {
        Ok(Self {
            root: validate_root(root.into())?,
            options,
            set_headers: None,
        })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    pub fn options(&self) -> &ServeOptions {
        &self.options
    }

    pub fn set_headers<H>(mut self, hook: H) -> Self
    where
        H: Fn(&mut HeaderMap, &ResolvedEntry) + Send + Sync + 'static,
    {
        self.set_headers = Some(Arc::new(hook));
        self
    }
}

/// Fails if `root` is empty, missing or not a directory.
pub(crate) fn validate_root(root: PathBuf) -> Result<PathBuf, ConfigError> {
    if root.as_os_str().is_empty() {
        return Err(ConfigError::MissingRoot);
    }

    let metadata =
        std::fs::metadata(&root).map_err(|err| ConfigError::RootNotFound(root.clone(), err))?;
    if !metadata.is_dir() {
        return Err(ConfigError::RootNotDirectory(root));
    }

    Ok(root)
}

impl fmt::Debug for ServeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServeConfig")
            .field("root", &self.root)
            .field("options", &self.options)
            .field("set_headers", &self.set_headers.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_max_age_strings() {
        assert_eq!("30d".parse::<MaxAge>().unwrap().as_secs(), 2_592_000);
        assert_eq!("2 hours".parse::<MaxAge>().unwrap().as_secs(), 7_200);
        assert_eq!("1.5m".parse::<MaxAge>().unwrap().as_secs(), 90);
        assert_eq!("1500".parse::<MaxAge>().unwrap().as_secs(), 1);
        assert_eq!("Infinity".parse::<MaxAge>().unwrap().as_secs(), 31_536_000);
        assert_eq!("10y".parse::<MaxAge>().unwrap().as_secs(), 31_536_000);
        assert_eq!("-5s".parse::<MaxAge>().unwrap().as_secs(), 0);
    }

    #[test]
    fn reject_unknown_unit() {
        assert!(matches!(
            "3 fortnights".parse::<MaxAge>(),
            Err(ConfigError::InvalidMaxAge(_))
        ));
        assert!("abc".parse::<MaxAge>().is_err());
    }

    #[test]
    fn infinite_millis_clamps_to_a_year() {
        assert_eq!(MaxAge::from_millis(f64::INFINITY), MaxAge::INFINITE);
        assert_eq!(MaxAge::from_millis(f64::NAN).as_secs(), 0);
        assert_eq!(MaxAge::from(Duration::from_secs(u64::MAX)), MaxAge::INFINITE);
    }

    #[test]
    fn cache_control_value() {
        let mut options = ServeOptions::default();
        assert_eq!(
            options.cache_control_value().as_deref(),
            Some("public, max-age=0")
        );

        options.max_age = "1h".parse().unwrap();
        options.immutable = true;
        assert_eq!(
            options.cache_control_value().as_deref(),
            Some("public, max-age=3600, immutable")
        );

        options.cache_control = false;
        assert_eq!(options.cache_control_value(), None);
    }

    #[test]
    fn deserialize_options_from_toml() {
        let options: ServeOptions = toml::from_str(
            r#"
            index = false
            extensions = [".html", "htm"]
            dotfiles = "allow"
            fallthrough = false
            max_age = "30d"
            "#,
        )
        .unwrap();

        assert!(!options.index.is_enabled());
        assert_eq!(
            options.fallback_extensions().collect::<Vec<_>>(),
            ["html", "htm"]
        );
        assert_eq!(options.dotfiles, Dotfiles::Allow);
        assert!(!options.fallthrough);
        assert!(options.redirect);
        assert_eq!(options.max_age.as_secs(), 2_592_000);
    }

    #[test]
    fn deserialize_numeric_and_infinite_max_age() {
        let options: ServeOptions = toml::from_str("max_age = 60000\nindex = \"default.htm\"").unwrap();
        assert_eq!(options.max_age.as_secs(), 60);
        assert_eq!(options.index.names().collect::<Vec<_>>(), ["default.htm"]);

        let options: ServeOptions = toml::from_str("max_age = inf").unwrap();
        assert_eq!(options.max_age, MaxAge::INFINITE);

        assert!(toml::from_str::<ServeOptions>("max_age = \"soon\"").is_err());
    }

    #[test]
    fn root_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();

        assert!(ServeConfig::new(dir.path(), ServeOptions::default()).is_ok());
        assert!(matches!(
            ServeConfig::new("", ServeOptions::default()),
            Err(ConfigError::MissingRoot)
        ));
        assert!(matches!(
            ServeConfig::new(&file, ServeOptions::default()),
            Err(ConfigError::RootNotDirectory(_))
        ));
        assert!(matches!(
            ServeConfig::new(dir.path().join("missing"), ServeOptions::default()),
            Err(ConfigError::RootNotFound(..))
        ));
    }
}
