// Cosmetic descriptions attached to request log lines. Never affects pacing.

use crate::error::FlavorError;
use crate::profile::UserProfile;
use tracing::debug;

pub const PLACEHOLDER: &str = "organic visit";

#[derive(Debug, Clone, Copy)]
pub struct FlavorContext<'a> {
    pub session_id: &'a str,
    pub profile: &'a UserProfile,
    pub page: &'a str,
    pub request_index: u64,
}

pub trait FlavorSource: Send + Sync {
    fn describe(&self, ctx: &FlavorContext<'_>) -> Result<String, FlavorError>;
}

#[derive(Debug, Clone)]
pub struct StaticFlavor(pub String);

impl Default for StaticFlavor {
    fn default() -> Self {
        Self(PLACEHOLDER.to_string())
    }
}

impl FlavorSource for StaticFlavor {
    fn describe(&self, _ctx: &FlavorContext<'_>) -> Result<String, FlavorError> {
        Ok(self.0.clone())
    }
}

/// Builds a label from the profile's own fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileFlavor;

impl FlavorSource for ProfileFlavor {
    fn describe(&self, ctx: &FlavorContext<'_>) -> Result<String, FlavorError> {
        let profile = ctx.profile;
        let mut label = profile.name.replace('_', " ");
        if !profile.age_range.is_empty() {
            label.push_str(&format!(" ({})", profile.age_range));
        }
        match profile.interests.first() {
            Some(interest) => Ok(format!("{} into {} opens {}", label, interest.replace('_', " "), ctx.page)),
            None => Ok(format!("{} opens {}", label, ctx.page)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flavor {
    pub text: String,
    pub fallback: bool,
}

pub fn describe_or_placeholder(source: &dyn FlavorSource, ctx: &FlavorContext<'_>) -> Flavor {
    match source.describe(ctx) {
        Ok(text) if !text.trim().is_empty() => Flavor { text, fallback: false },
        Ok(_) => Flavor {
            text: PLACEHOLDER.to_string(),
            fallback: true,
        },
        Err(e) => {
            debug!("Session {} flavor fallback: {}", ctx.session_id, e);
            Flavor {
                text: PLACEHOLDER.to_string(),
                fallback: true,
            }
        }
    }
}
