//! # HTTP Session Manager
//!
//! Owns the one persistent, cookie-bearing [`reqwest::Client`] the whole
//! process scrapes through. The storefront hands out its session via cookies
//! after a CSRF-protected form login, so the manager covers three concerns:
//!
//! - **CSRF retrieval**: the login page embeds an anti-forgery token in an
//!   `input[name='CSRFToken']` field that must accompany the credential POST.
//! - **Credential submission**: a form POST against the Spring Security
//!   endpoint, with the token duplicated under two field names and
//!   `Origin`/`Referer` headers matching the login page, since the site
//!   rejects submissions without them.
//! - **Verification**: success is only believed after an account page fetch
//!   shows at least one profile marker; a redirect back to the login URL or
//!   a non-success status means the credentials did not take.
//!
//! Every public operation returns `bool` and never propagates: a network or
//! parse failure during login is indistinguishable, to callers, from a
//! rejected login. Cookies issued on success persist inside the shared
//! client, so one `Session` (behind an `Arc`) serves the whole process for
//! its lifetime; re-verification happens lazily before each batch via
//! [`Session::ensure_authenticated`], which only performs a full login when
//! the quick marker probe fails.

use std::sync::Mutex;

use anyhow::{Context, Result};
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, HeaderMap, HeaderValue, PRAGMA};
use scraper::{Html, Selector};
use tracing::{debug, error, info};

use crate::config::AppConfig;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36";

/// Last observed authentication state, for logging only; no call result is
/// ever cached off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
    /// A probe or login errored; the next batch must re-verify
    Unknown,
}

pub struct Session {
    client: Client,
    shop_url: String,
    base_url: String,
    username: String,
    password: String,
    state: Mutex<AuthState>,
}

impl Session {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,\
                 image/avif,image/webp,image/apng,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            shop_url: config.shop_url.clone(),
            base_url: config.base_url.clone(),
            username: config.user_name.clone(),
            password: config.password.clone(),
            state: Mutex::new(AuthState::Unauthenticated),
        })
    }

    /// Fetches an arbitrary page through the shared authenticated client.
    pub async fn get(&self, url: &str) -> reqwest::Result<reqwest::Response> {
        self.client.get(url).send().await
    }

    pub fn shop_url(&self) -> &str {
        &self.shop_url
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth_state(&self) -> AuthState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: AuthState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Quick probe, full login only if the probe fails.
    pub async fn ensure_authenticated(&self) -> bool {
        if self.is_logged_in().await {
            self.set_state(AuthState::Authenticated);
            return true;
        }
        info!("Not logged in, attempting login");
        self.login().await
    }

    /// Performs the full CSRF + credential + verification sequence.
    pub async fn login(&self) -> bool {
        match self.try_login().await {
            Ok(success) => success,
            Err(e) => {
                error!("Login error: {:#}", e);
                self.set_state(AuthState::Unknown);
                false
            }
        }
    }

    async fn try_login(&self) -> Result<bool> {
        let Some(csrf_token) = self.csrf_token().await else {
            self.set_state(AuthState::Unauthenticated);
            return Ok(false);
        };

        let login_post_url = format!("{}/ktw/th/THB/j_spring_security_check", self.shop_url);
        let login_page_url = format!("{}/ktw/th/THB/login", self.shop_url);

        // The form wants the token under both names
        let form = [
            ("j_username", self.username.as_str()),
            ("j_password", self.password.as_str()),
            ("CSRFToken", csrf_token.as_str()),
            ("_csrf", csrf_token.as_str()),
        ];

        let response = self
            .client
            .post(&login_post_url)
            .header("Origin", &self.shop_url)
            .header("Referer", &login_page_url)
            .form(&form)
            .send()
            .await
            .context("Login POST failed")?;
        debug!("Login response status: {}", response.status());

        let verified = self.verify_login().await;
        self.set_state(if verified {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        });
        Ok(verified)
    }

    /// Scrapes the CSRF token off the rendered login page.
    async fn csrf_token(&self) -> Option<String> {
        let login_page_url = format!("{}/ktw/th/THB/login", self.shop_url);
        let response = match self.get(&login_page_url).await {
            Ok(response) => response,
            Err(e) => {
                error!("Failed to fetch login page: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            error!("Failed to get login page: {}", response.status());
            return None;
        }

        let html = match response.text().await {
            Ok(html) => html,
            Err(e) => {
                error!("Failed to read login page body: {}", e);
                return None;
            }
        };

        let document = Html::parse_document(&html);
        let csrf_selector = Selector::parse("input[name='CSRFToken']").unwrap();
        let token = document
            .select(&csrf_selector)
            .next()
            .and_then(|input| input.value().attr("value"))
            .map(str::to_string);

        if token.is_none() {
            error!("CSRF token not found");
        }
        token
    }

    /// Confirms the session by fetching the profile page and checking for
    /// any one of several login markers.
    pub async fn verify_login(&self) -> bool {
        let account_url = format!("{}/ktw/th/THB/my-account/update-profile", self.shop_url);
        let response = match self.get(&account_url).await {
            Ok(response) => response,
            Err(e) => {
                error!("Verify login error: {}", e);
                return false;
            }
        };

        // Bounced back to the login form means the session is dead
        if response.url().path().contains("/login") {
            return false;
        }
        if !response.status().is_success() {
            return false;
        }

        let html = match response.text().await {
            Ok(html) => html,
            Err(e) => {
                error!("Verify login error: {}", e);
                return false;
            }
        };

        has_any_marker(
            &html,
            &[
                "form#updateProfileForm",
                "input#profile.email",
                "a[href*='logout']",
            ],
        )
    }

    /// Cheap logged-in probe against the storefront home page.
    pub async fn is_logged_in(&self) -> bool {
        let home_url = format!("{}/ktw/th/THB", self.shop_url);
        let response = match self.get(&home_url).await {
            Ok(response) => response,
            Err(e) => {
                error!("Error checking login status: {}", e);
                return false;
            }
        };

        if !response.status().is_success() {
            return false;
        }

        match response.text().await {
            Ok(html) => has_any_marker(
                &html,
                &[
                    "a[href='/ktw/th/THB/my-account/update-profile']",
                    "span.header__user-name",
                ],
            ),
            Err(e) => {
                error!("Error checking login status: {}", e);
                false
            }
        }
    }
}

/// True if any of the CSS selectors matches at least one element.
fn has_any_marker(html: &str, selectors: &[&str]) -> bool {
    let document = Html::parse_document(html);
    selectors.iter().any(|selector| {
        Selector::parse(selector)
            .ok()
            .and_then(|s| document.select(&s).next().map(|_| ()))
            .is_some()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE_PAGE: &str = r#"
        <html><body>
            <form id="updateProfileForm"><input type="text" name="firstName"></form>
        </body></html>
    "#;

    #[test]
    fn any_single_marker_is_sufficient() {
        let markers = [
            "form#updateProfileForm",
            "input#profile.email",
            "a[href*='logout']",
        ];
        assert!(has_any_marker(PROFILE_PAGE, &markers));
        assert!(has_any_marker(
            r#"<a href="/ktw/th/THB/logout">ออกจากระบบ</a>"#,
            &markers
        ));
        assert!(!has_any_marker(
            "<html><body><h1>เข้าสู่ระบบ</h1></body></html>",
            &markers
        ));
    }

    #[test]
    fn home_page_markers_detect_login() {
        let markers = [
            "a[href='/ktw/th/THB/my-account/update-profile']",
            "span.header__user-name",
        ];
        assert!(has_any_marker(
            r#"<span class="header__user-name">K. Somchai</span>"#,
            &markers
        ));
        assert!(!has_any_marker(r#"<a href="/ktw/th/THB/login">Login</a>"#, &markers));
    }

    #[test]
    fn new_session_starts_unauthenticated() {
        let session = Session::new(&AppConfig::default()).unwrap();
        assert_eq!(session.auth_state(), AuthState::Unauthenticated);
    }
}
