//! Bot-challenge and CAPTCHA detection on raw HTML

use std::fmt;

/// Kind of challenge found on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    CloudflareTurnstile,
    CloudflareIuam,
    Recaptcha,
    Hcaptcha,
    Generic,
}

impl ChallengeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CloudflareTurnstile => "cloudflare_turnstile",
            Self::CloudflareIuam => "cloudflare_iuam",
            Self::Recaptcha => "recaptcha",
            Self::Hcaptcha => "hcaptcha",
            Self::Generic => "generic_captcha",
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signatures checked in order; all lowercase
const SIGNATURES: &[(ChallengeKind, &[&str])] = &[
    (
        ChallengeKind::CloudflareTurnstile,
        &["cf-turnstile-wrapper", "challenges.cloudflare.com/turnstile"],
    ),
    (
        ChallengeKind::CloudflareIuam,
        &[
            "checking your browser before accessing",
            "cf-browser-verification",
            "id=\"cf-content\"",
        ],
    ),
    (
        ChallengeKind::Recaptcha,
        &["google.com/recaptcha", "g-recaptcha", "recaptcha-v3-token"],
    ),
    (ChallengeKind::Hcaptcha, &["hcaptcha.com", "h-captcha"]),
    (
        ChallengeKind::Generic,
        &["captcha", "security challenge", "verify you are human"],
    ),
];

/// Markers of an interstitial that clears by itself after a few seconds
const INTERSTITIAL_MARKERS: &[&str] = &[
    "just a moment...",
    "checking your browser",
    "cf-browser-verification",
    "challenge-platform",
];

/// Returns the first challenge signature found in `html`
pub fn detect_captcha(html: &str) -> Option<ChallengeKind> {
    let lower = html.to_lowercase();
    SIGNATURES
        .iter()
        .find(|(_, needles)| needles.iter().any(|needle| lower.contains(needle)))
        .map(|(kind, _)| *kind)
}

/// Whether the page is still a transient challenge interstitial
pub fn is_challenge_pending(html: &str) -> bool {
    let lower = html.to_lowercase();
    INTERSTITIAL_MARKERS.iter().any(|marker| lower.contains(marker))
}
