//! Global server configuration initialized once at startup.
//!
//! These values are immutable after initialization and shared across all
//! request handlers. Reads before initialization see the defaults (insecure
//! cookies, no cookie domain, production error bodies, socket-address client
//! IPs), which is what in-process tests rely on.

use std::sync::OnceLock;

static SECURE_COOKIES: OnceLock<bool> = OnceLock::new();
static COOKIE_DOMAIN: OnceLock<Option<String>> = OnceLock::new();
static DEV_MODE: OnceLock<bool> = OnceLock::new();
static TRUST_FORWARDED_FOR: OnceLock<bool> = OnceLock::new();

/// First call wins; later calls are ignored.
pub fn init(
    secure_cookies: bool,
    cookie_domain: Option<String>,
    dev_mode: bool,
    trust_forwarded_for: bool,
) {
    SECURE_COOKIES.get_or_init(|| secure_cookies);
    COOKIE_DOMAIN.get_or_init(|| cookie_domain);
    DEV_MODE.get_or_init(|| dev_mode);
    TRUST_FORWARDED_FOR.get_or_init(|| trust_forwarded_for);
}

pub fn secure_cookies() -> bool {
    SECURE_COOKIES.get().copied().unwrap_or(false)
}

pub fn cookie_domain() -> Option<&'static str> {
    COOKIE_DOMAIN.get().and_then(|d| d.as_deref())
}

/// Whether internal error detail may be shown to callers.
pub fn dev_mode() -> bool {
    DEV_MODE.get().copied().unwrap_or(false)
}

/// Whether the client IP is taken from `X-Forwarded-For`.
pub fn trust_forwarded_for() -> bool {
    TRUST_FORWARDED_FOR.get().copied().unwrap_or(false)
}
