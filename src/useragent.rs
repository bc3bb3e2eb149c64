//! User-Agent strings sent to the portal

use rand::seq::SliceRandom;
use rand::Rng;

/// Source of User-Agent header values
pub trait UserAgentSource: Send + Sync {
    fn next(&self) -> String;
}

const PLATFORMS: &[&str] = &[
    "Windows NT 10.0; Win64; x64",
    "Macintosh; Intel Mac OS X 10_15_7",
    "X11; Linux x86_64",
    "X11; Ubuntu; Linux x86_64",
];

/// Desktop browser identities with a random version
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomUserAgent;

impl UserAgentSource for RandomUserAgent {
    fn next(&self) -> String {
        let mut rng = rand::thread_rng();
        let platform = PLATFORMS.choose(&mut rng).copied().unwrap_or(PLATFORMS[0]);

        if rng.gen_bool(0.5) {
            let version = rng.gen_range(115..=132);
            format!(
                "Mozilla/5.0 ({platform}; rv:{version}.0) Gecko/20100101 Firefox/{version}.0"
            )
        } else {
            let version = rng.gen_range(118..=131);
            format!(
                "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version}.0.0.0 Safari/537.36"
            )
        }
    }
}

/// Always the same value; used by tests and `--user-agent`-style overrides
#[derive(Debug, Clone)]
pub struct FixedUserAgent(pub String);

impl FixedUserAgent {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl UserAgentSource for FixedUserAgent {
    fn next(&self) -> String {
        self.0.clone()
    }
}
