use anyhow::Context as _;

use crate::browser::{self, BrowserSession};
use crate::config::{Config, Credentials};

pub struct Authenticator<'a> {
    config: &'a Config,
}

impl<'a> Authenticator<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Submit the login form and dismiss the cookie banner.
    ///
    /// `true` only means the form was submitted without error; the site is not
    /// asked whether the credentials were accepted.
    pub async fn login<S>(&self, session: &mut S, credentials: &Credentials) -> bool
    where
        S: BrowserSession + ?Sized,
    {
        tracing::info!(site = %self.config.site.base_url, "starting authentication");
        match self.try_login(session, credentials).await {
            Ok(()) => {
                tracing::info!("login form submitted");
                true
            }
            Err(err) => {
                tracing::warn!("authentication failed: {err:#}");
                false
            }
        }
    }

    async fn try_login<S>(&self, session: &mut S, credentials: &Credentials) -> anyhow::Result<()>
    where
        S: BrowserSession + ?Sized,
    {
        let selectors = &self.config.selectors;
        let timeouts = &self.config.timeouts;

        session
            .goto(&self.config.site.base_url)
            .await
            .context("open site")?;

        let email = browser::wait_for_element(
            session,
            &selectors.login_email,
            timeouts.page_load(),
            timeouts.poll(),
        )
        .await
        .ok_or_else(|| anyhow::anyhow!("timed out waiting for the email field"))?;
        session
            .fill(&email, &credentials.email)
            .await
            .context("fill email")?;

        let password = browser::find_first(session, &selectors.login_password)
            .await?
            .ok_or_else(|| anyhow::anyhow!("password field not found"))?;
        session
            .fill(&password, &credentials.password)
            .await
            .context("fill password")?;

        let button = browser::find_first(session, &selectors.login_button)
            .await?
            .ok_or_else(|| anyhow::anyhow!("login button not found"))?;
        session.click(&button).await.context("click login")?;

        tokio::time::sleep(timeouts.post_click()).await;

        dismiss_cookie_banner(session, self.config).await;
        Ok(())
    }
}

/// Reject cookies if the consent banner is showing. Never fails.
pub async fn dismiss_cookie_banner<S>(session: &mut S, config: &Config)
where
    S: BrowserSession + ?Sized,
{
    let xpath = config.selectors.cookies_reject_xpath();
    let button = match browser::find_first(session, &xpath).await {
        Ok(Some(button)) => button,
        Ok(None) => return,
        Err(err) => {
            tracing::debug!(?err, "cookie banner lookup failed");
            return;
        }
    };

    let displayed = session
        .state(&button)
        .await
        .map(|state| state.displayed)
        .unwrap_or(false);
    if !displayed {
        return;
    }

    match session.click(&button).await {
        Ok(()) => tracing::info!("cookie banner dismissed"),
        Err(err) => tracing::warn!("could not dismiss cookie banner: {err:#}"),
    }
}
