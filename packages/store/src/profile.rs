//! Connection profiles.
//!
//! A profile is everything needed to reach one bucket: its name, region,
//! endpoint, and a static key pair. Profiles are read from a TOML file
//! with one `[[profile]]` table per bucket, or from environment variables
//! when no file exists.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Environment variable that overrides the profile file location.
pub const CONFIG_ENV: &str = "BUCKET_BROWSER_CONFIG";

/// Profile file looked up in the working directory by default.
pub const DEFAULT_CONFIG_FILE: &str = "bucket_browser.toml";

/// Region used when none is configured (R2 and most S3 clones accept it).
const DEFAULT_REGION: &str = "auto";

/// Credentials and endpoint for one bucket.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    /// Bucket name. Doubles as the profile's display name.
    pub name: String,
    /// Signing region.
    pub region: String,
    /// S3-compatible endpoint URL.
    pub endpoint: String,
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Public base URL (CDN or public bucket domain) used for previews.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

impl std::fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("name", &self.name)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

impl ConnectionProfile {
    /// Checks that every required field is present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] naming the first empty field.
    pub fn validate(&self) -> Result<(), StoreError> {
        let fields = [
            ("name", &self.name),
            ("region", &self.region),
            ("endpoint", &self.endpoint),
            ("access_key", &self.access_key),
            ("secret_key", &self.secret_key),
        ];

        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(StoreError::Config {
                    message: format!(
                        "profile {:?} is missing required field `{field}`",
                        self.name
                    ),
                });
            }
        }

        Ok(())
    }

    /// Builds a profile from `BUCKET_BROWSER_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingEnv`] if a required variable is unset.
    pub fn from_env() -> Result<Self, StoreError> {
        let profile = Self {
            name: require_env("BUCKET_BROWSER_BUCKET")?,
            region: std::env::var("BUCKET_BROWSER_REGION")
                .unwrap_or_else(|_| DEFAULT_REGION.to_string()),
            endpoint: require_env("BUCKET_BROWSER_ENDPOINT")?,
            access_key: require_env("BUCKET_BROWSER_ACCESS_KEY_ID")?,
            secret_key: require_env("BUCKET_BROWSER_SECRET_ACCESS_KEY")?,
            public_base_url: std::env::var("BUCKET_BROWSER_PUBLIC_URL").ok(),
        };
        profile.validate()?;
        Ok(profile)
    }
}

/// All configured profiles plus the optional default selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileSet {
    /// Name of the profile to use when none is requested.
    #[serde(default)]
    pub default: Option<String>,
    /// Configured profiles, in file order.
    #[serde(default, rename = "profile")]
    pub profiles: Vec<ConnectionProfile>,
}

impl ProfileSet {
    /// Parses and validates a profile file's contents.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Toml`] on malformed TOML and
    /// [`StoreError::Config`] if the file has no profiles or any profile is
    /// incomplete.
    pub fn parse(contents: &str) -> Result<Self, StoreError> {
        let set: Self = toml::from_str(contents)?;

        if set.profiles.is_empty() {
            return Err(StoreError::Config {
                message: "no [[profile]] entries configured".to_string(),
            });
        }
        for profile in &set.profiles {
            profile.validate()?;
        }

        Ok(set)
    }

    /// Reads and parses a profile file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be read, otherwise as
    /// [`ProfileSet::parse`].
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        log::debug!("Loading profiles from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Resolves profiles from (in order) an explicit path, the
    /// [`CONFIG_ENV`] variable, [`DEFAULT_CONFIG_FILE`] in the working
    /// directory, and finally environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly requested file cannot be loaded or
    /// no source yields a valid profile.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, StoreError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load(&PathBuf::from(path));
        }

        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            return Self::load(&default_path);
        }

        log::debug!("No profile file found, reading profile from environment");
        Ok(Self {
            default: None,
            profiles: vec![ConnectionProfile::from_env()?],
        })
    }

    /// Picks a profile by name, falling back to the configured default and
    /// then to the first profile.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the requested (or default) profile
    /// does not exist.
    pub fn select(&self, name: Option<&str>) -> Result<&ConnectionProfile, StoreError> {
        let wanted = name.or(self.default.as_deref());

        match wanted {
            Some(wanted) => self
                .profiles
                .iter()
                .find(|p| p.name == wanted)
                .ok_or_else(|| StoreError::Config {
                    message: format!("no profile named {wanted:?}"),
                }),
            None => self.profiles.first().ok_or_else(|| StoreError::Config {
                message: "no profiles configured".to_string(),
            }),
        }
    }
}

/// Reads a required environment variable.
fn require_env(name: &str) -> Result<String, StoreError> {
    std::env::var(name).map_err(|_| StoreError::MissingEnv {
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PROFILES: &str = r#"
default = "backups"

[[profile]]
name = "media"
region = "auto"
endpoint = "https://example.r2.cloudflarestorage.com"
access_key = "AKIA1"
secret_key = "secret1"
public_base_url = "https://cdn.example.com"

[[profile]]
name = "backups"
region = "us-east-1"
endpoint = "https://s3.us-east-1.amazonaws.com"
access_key = "AKIA2"
secret_key = "secret2"
"#;

    #[test]
    fn parses_profiles_and_selects_default() {
        let set = ProfileSet::parse(TWO_PROFILES).unwrap();
        assert_eq!(set.profiles.len(), 2);
        assert_eq!(set.select(None).unwrap().name, "backups");
        assert_eq!(set.select(Some("media")).unwrap().region, "auto");
        assert_eq!(
            set.profiles[0].public_base_url.as_deref(),
            Some("https://cdn.example.com")
        );
        assert!(set.select(Some("missing")).is_err());
    }

    #[test]
    fn rejects_incomplete_profiles() {
        let contents = r#"
[[profile]]
name = "media"
region = "auto"
endpoint = ""
access_key = "a"
secret_key = "b"
"#;
        let err = ProfileSet::parse(contents).unwrap_err();
        assert!(matches!(err, StoreError::Config { .. }));
        assert!(err.to_string().contains("endpoint"));
    }

    #[test]
    fn rejects_empty_profile_file() {
        assert!(matches!(
            ProfileSet::parse("").unwrap_err(),
            StoreError::Config { .. }
        ));
    }

    #[test]
    fn debug_output_redacts_secret() {
        let set = ProfileSet::parse(TWO_PROFILES).unwrap();
        let debug = format!("{:?}", set.profiles[0]);
        assert!(!debug.contains("secret1"));
        assert!(debug.contains("<redacted>"));
    }
}
