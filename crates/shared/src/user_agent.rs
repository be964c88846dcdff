//! User-agent classification for login attempts.
//!
//! Only a coarse device class and browser family are derived; the raw
//! user-agent string is stored alongside them.

use regex::Regex;

lazy_static::lazy_static! {
    static ref BOT_REGEX: Regex = Regex::new(r"(?i)bot|crawler|spider|curl|wget|python-requests|httpclient").unwrap();
    static ref TABLET_REGEX: Regex = Regex::new(r"(?i)ipad|tablet|kindle|silk|playbook").unwrap();
    static ref ANDROID_REGEX: Regex = Regex::new(r"(?i)android").unwrap();
    static ref MOBILE_REGEX: Regex = Regex::new(r"(?i)mobi|iphone|ipod|android|blackberry|windows phone").unwrap();
    static ref EDGE_REGEX: Regex = Regex::new(r"(?i)edg(e|a|ios)?/").unwrap();
    static ref OPERA_REGEX: Regex = Regex::new(r"(?i)opr/|opera").unwrap();
    static ref CHROME_REGEX: Regex = Regex::new(r"(?i)chrome/|crios/").unwrap();
    static ref FIREFOX_REGEX: Regex = Regex::new(r"(?i)firefox/|fxios/").unwrap();
    static ref SAFARI_REGEX: Regex = Regex::new(r"(?i)safari/").unwrap();
}

/// Classify the device class of a user agent.
///
/// Returns one of `bot`, `tablet`, `mobile`, `desktop` or `unknown`.
pub fn classify_device(user_agent: &str) -> &'static str {
    let ua = user_agent.trim();
    if ua.is_empty() {
        return "unknown";
    }
    if BOT_REGEX.is_match(ua) {
        "bot"
    } else if TABLET_REGEX.is_match(ua) || is_android_tablet(ua) {
        "tablet"
    } else if MOBILE_REGEX.is_match(ua) {
        "mobile"
    } else {
        "desktop"
    }
}

// Android tablets omit the "Mobile" token that Android phones send.
fn is_android_tablet(ua: &str) -> bool {
    ANDROID_REGEX.is_match(ua) && !ua.to_lowercase().contains("mobile")
}

/// Classify the browser family of a user agent.
///
/// Order matters: Edge and Opera also advertise Chrome, and Chrome advertises Safari.
pub fn classify_browser(user_agent: &str) -> &'static str {
    let ua = user_agent.trim();
    if ua.is_empty() {
        return "unknown";
    }
    if EDGE_REGEX.is_match(ua) {
        "edge"
    } else if OPERA_REGEX.is_match(ua) {
        "opera"
    } else if CHROME_REGEX.is_match(ua) {
        "chrome"
    } else if FIREFOX_REGEX.is_match(ua) {
        "firefox"
    } else if SAFARI_REGEX.is_match(ua) {
        "safari"
    } else {
        "other"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_DESKTOP: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const FIREFOX_LINUX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const EDGE_DESKTOP: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";
    const IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/604.1";

    #[test]
    fn test_classify_device() {
        assert_eq!(classify_device(CHROME_DESKTOP), "desktop");
        assert_eq!(classify_device(SAFARI_IPHONE), "mobile");
        assert_eq!(classify_device(IPAD), "tablet");
        assert_eq!(
            classify_device("Mozilla/5.0 (Linux; Android 14; SM-X710) Chrome/120.0 Safari/537.36"),
            "tablet"
        );
        assert_eq!(
            classify_device("Mozilla/5.0 (Linux; Android 14; Pixel 8) Chrome/120.0 Mobile Safari/537.36"),
            "mobile"
        );
        assert_eq!(classify_device("curl/8.4.0"), "bot");
        assert_eq!(classify_device(""), "unknown");
    }

    #[test]
    fn test_classify_browser() {
        assert_eq!(classify_browser(CHROME_DESKTOP), "chrome");
        assert_eq!(classify_browser(SAFARI_IPHONE), "safari");
        assert_eq!(classify_browser(FIREFOX_LINUX), "firefox");
        assert_eq!(classify_browser(EDGE_DESKTOP), "edge");
        assert_eq!(classify_browser("okhttp/4.12"), "other");
        assert_eq!(classify_browser("   "), "unknown");
    }
}
