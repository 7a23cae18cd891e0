use anyhow::{anyhow, Context};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;

use crate::config::MosaicConfig;
use crate::engine::extractor::StatusExtractor;
use crate::engine::session::SessionProvider;
use crate::models::CourseStatus;
use crate::utils::error::{AppError, Result};

const USER_FIELD: &str = r#"input[name="userid"]"#;
const PASSWORD_FIELD: &str = r#"input[name="pwd"]"#;
const SIGN_IN_BUTTON: &str = r#"input[type="submit"][value="Sign In"]"#;
const LOGGED_IN_MARKER: &str = "/EMPLOYEE/SA/";

const TERM_SELECT_ID: &str = "CLASS_SRCH_WRK2_STRM$35$";
const SUBJECT_INPUT_ID: &str = "SSR_CLSRCH_WRK_SUBJECT$0";
const CATALOG_INPUT_ID: &str = "SSR_CLSRCH_WRK_CATALOG_NBR$1";
const SEARCH_BUTTON_ID: &str = "CLASS_SRCH_WRK2_SSR_PB_CLASS_SRCH";
const STATUS_ICON: &str = r#"img[src*="STATUS"]"#;
const SECTION_STATUS_IMAGES: &str = r#"img[alt="Open"], img[alt="Closed"], img[alt="Wait List"]"#;

/// The results page always starts with one legend icon per status.
const LEGEND_ICONS: usize = 3;
const NO_RESULTS_TEXT: &str = "The search returns no results";

const RETRY_INTERVAL_MS: u64 = 1000;

/// A logged-in browser. Cloning shares the same Chrome process and tab.
#[derive(Clone)]
pub struct MosaicSession {
    browser: Arc<Browser>,
    tab: Arc<Tab>,
}

/// Launches Chrome and signs in to the student portal.
pub struct MosaicConnector {
    config: MosaicConfig,
}

impl MosaicConnector {
    pub fn new(config: MosaicConfig) -> Self {
        Self { config }
    }

    fn launch(config: &MosaicConfig) -> anyhow::Result<Browser> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(false) // Often needed in containerized environments
            // The session idles for the whole inter-sweep interval.
            .idle_browser_timeout(Duration::from_secs(24 * 60 * 60))
            .args(vec![
                std::ffi::OsStr::new("--no-sandbox"),
                std::ffi::OsStr::new("--disable-setuid-sandbox"),
                std::ffi::OsStr::new("--disable-dev-shm-usage"),
                std::ffi::OsStr::new("--disable-gpu"),
                std::ffi::OsStr::new("--disable-extensions"),
            ])
            .build()
            .map_err(|e| anyhow!("Failed to create launch options: {}", e))?;

        // Set Chrome path if provided
        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(PathBuf::from(chrome_path));
        }

        Browser::new(launch_options).context("Failed to launch browser")
    }

    fn login(config: &MosaicConfig, username: &str, password: &str) -> anyhow::Result<MosaicSession> {
        let browser = Self::launch(config)?;
        let tab = browser.new_tab().context("Failed to create tab")?;
        let timeout = Duration::from_secs(config.login_timeout_secs);
        tab.set_default_timeout(timeout);

        tab.navigate_to(&config.login_url)
            .context("Failed to open login page")?
            .wait_until_navigated()?;

        tab.wait_for_element(USER_FIELD)?.click()?;
        tab.type_str(username)?;
        tab.wait_for_element(PASSWORD_FIELD)?.click()?;
        tab.type_str(password)?;
        tab.wait_for_element(SIGN_IN_BUTTON)?.click()?;

        let deadline = Instant::now() + timeout;
        while !tab.get_url().contains(LOGGED_IN_MARKER) {
            if Instant::now() >= deadline {
                return Err(anyhow!("credentials rejected or portal did not load"));
            }
            std::thread::sleep(Duration::from_millis(250));
        }

        tab.set_default_timeout(Duration::from_secs(config.page_timeout_secs));
        Ok(MosaicSession {
            browser: Arc::new(browser),
            tab,
        })
    }
}

#[async_trait]
impl SessionProvider for MosaicConnector {
    type Session = MosaicSession;

    async fn open(&self) -> Result<MosaicSession> {
        let (username, password) = match (&self.config.username, &self.config.password) {
            (Some(u), Some(p)) => (u.clone(), p.clone()),
            _ => {
                return Err(AppError::Authentication(
                    "Mosaic username and password are not configured".to_string(),
                ))
            }
        };

        let config = self.config.clone();
        tokio::task::spawn_blocking(move || Self::login(&config, &username, &password))
            .await
            .map_err(|e| AppError::Internal(format!("login task failed: {}", e)))?
            .map_err(|e| AppError::Authentication(format!("{:#}", e)))
    }

    async fn close(&self, session: MosaicSession) {
        let result = tokio::task::spawn_blocking(move || {
            let closed = session.tab.close(true);
            // Dropping the last handle shuts Chrome down.
            drop(session.browser);
            closed
        })
        .await;

        match result {
            Ok(Ok(_)) => tracing::debug!("Browser session closed"),
            Ok(Err(e)) => tracing::warn!("Error closing browser tab: {}", e),
            Err(e) => tracing::warn!("Browser shutdown task failed: {}", e),
        }
    }
}

/// Per-status section counts from one search results page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionTally {
    pub open: usize,
    pub closed: usize,
    pub waitlist: usize,
}

impl SectionTally {
    pub fn total(&self) -> usize {
        self.open + self.closed + self.waitlist
    }

    /// Any open section makes the course open; failing that, any waitlist.
    pub fn status(&self) -> CourseStatus {
        if self.open > 0 {
            CourseStatus::Open
        } else if self.waitlist > 0 {
            CourseStatus::Waitlist
        } else {
            CourseStatus::Closed
        }
    }
}

/// What a class search left on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPage {
    Sections(SectionTally),
    /// A rendered results page (legend or "no results" notice) listing no sections.
    NoSections,
    /// Neither results nor a "no results" notice: the search never rendered.
    NotLoaded,
}

impl SearchPage {
    pub fn status(&self) -> Option<CourseStatus> {
        match self {
            SearchPage::Sections(tally) => Some(tally.status()),
            SearchPage::NoSections => Some(CourseStatus::NotFound),
            SearchPage::NotLoaded => None,
        }
    }
}

/// Count section status icons in a search page, skipping the legend.
pub fn read_search_page(html: &str) -> Result<SearchPage> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(SECTION_STATUS_IMAGES)
        .map_err(|e| AppError::Internal(format!("Invalid status selector: {:?}", e)))?;

    let icons: Vec<&str> = document
        .select(&selector)
        .filter_map(|img| img.value().attr("alt"))
        .collect();

    if icons.len() > LEGEND_ICONS {
        let mut tally = SectionTally::default();
        for alt in &icons[LEGEND_ICONS..] {
            match *alt {
                "Open" => tally.open += 1,
                "Closed" => tally.closed += 1,
                "Wait List" => tally.waitlist += 1,
                _ => {}
            }
        }
        return Ok(SearchPage::Sections(tally));
    }

    let no_results = document
        .root_element()
        .text()
        .collect::<String>()
        .contains(NO_RESULTS_TEXT);

    if icons.is_empty() && !no_results {
        Ok(SearchPage::NotLoaded)
    } else {
        Ok(SearchPage::NoSections)
    }
}

/// PeopleSoft sends an expired session back to the portal sign-in page.
pub fn is_sign_in_page(url: &str, login_url: &str) -> bool {
    url.contains("cmd=login") || (url.starts_with(login_url) && !url.contains(LOGGED_IN_MARKER))
}

/// Runs a class search on a logged-in session and reads the section icons.
pub struct MosaicExtractor {
    search_url: String,
    login_url: String,
    page_timeout: Duration,
    retries: usize,
}

impl MosaicExtractor {
    pub fn new(config: &MosaicConfig) -> Self {
        Self {
            search_url: config.search_url.clone(),
            login_url: config.login_url.clone(),
            page_timeout: Duration::from_secs(config.page_timeout_secs),
            retries: config.navigation_retries,
        }
    }

    fn search_script(subject: &str, course_number: &str, term: &str) -> Result<String> {
        let literal = |value: &str| {
            serde_json::to_string(value)
                .map_err(|e| AppError::Internal(format!("Failed to encode search value: {}", e)))
        };

        Ok(format!(
            r#"
            (function() {{
                const term = {term};
                const select = document.getElementById({term_id});
                if (!select) {{ return "missing-form"; }}
                let matched = false;
                for (let i = 0; i < select.options.length; i++) {{
                    if (select.options[i].text.indexOf(term) !== -1) {{
                        select.selectedIndex = i;
                        select.dispatchEvent(new Event("change", {{ bubbles: true }}));
                        matched = true;
                        break;
                    }}
                }}
                if (!matched) {{ return "missing-term"; }}
                document.getElementById({subject_id}).value = {subject};
                document.getElementById({catalog_id}).value = {course_number};
                document.getElementById({button_id}).click();
                return "submitted";
            }})()
            "#,
            term = literal(term)?,
            term_id = literal(TERM_SELECT_ID)?,
            subject_id = literal(SUBJECT_INPUT_ID)?,
            subject = literal(subject)?,
            catalog_id = literal(CATALOG_INPUT_ID)?,
            course_number = literal(course_number)?,
            button_id = literal(SEARCH_BUTTON_ID)?,
        ))
    }

    fn run_search(
        tab: &Tab,
        search_url: &str,
        login_url: &str,
        script: &str,
        wait: Duration,
    ) -> anyhow::Result<SearchPage> {
        tab.navigate_to(search_url)
            .context("Navigation failed")?
            .wait_until_navigated()
            .context("Page load failed")?;

        let outcome = tab
            .evaluate(script, false)
            .context("Search form script failed")?
            .value
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        match outcome.as_str() {
            "submitted" => {}
            "missing-term" => return Err(anyhow!("term is not offered in the search form")),
            other => {
                let url = tab.get_url();
                if is_sign_in_page(&url, login_url) {
                    tracing::warn!(%url, "Mosaic signed the session out; searches fail until the browser restarts");
                    return Err(anyhow!("signed out of Mosaic (redirected to {})", url));
                }
                return Err(anyhow!("search form not available ({})", other));
            }
        }

        if tab.wait_for_element_with_custom_timeout(STATUS_ICON, wait).is_err() {
            tracing::debug!("No status icons appeared within {:?}", wait);
        }

        let html = tab.get_content().context("Failed to get page content")?;
        match read_search_page(&html)? {
            SearchPage::NotLoaded => Err(anyhow!("search results did not load within {:?}", wait)),
            page => Ok(page),
        }
    }
}

#[async_trait]
impl StatusExtractor<MosaicSession> for MosaicExtractor {
    async fn extract(
        &self,
        session: &MosaicSession,
        subject: &str,
        course_number: &str,
        term: &str,
    ) -> Result<CourseStatus> {
        let script = Self::search_script(subject, course_number, term)?;
        let strategy = FixedInterval::from_millis(RETRY_INTERVAL_MS).take(self.retries);

        let page = Retry::spawn(strategy, || {
            let tab = session.tab.clone();
            let search_url = self.search_url.clone();
            let login_url = self.login_url.clone();
            let script = script.clone();
            let wait = self.page_timeout;
            async move {
                tokio::task::spawn_blocking(move || {
                    Self::run_search(&tab, &search_url, &login_url, &script, wait)
                })
                .await
                .map_err(|e| anyhow!("search task failed: {}", e))?
            }
        })
        .await
        .map_err(|e| AppError::extraction(subject, course_number, term, format!("{:#}", e)))?;

        if let SearchPage::Sections(t) = page {
            tracing::debug!(
                course = %format!("{} {}", subject, course_number),
                open = t.open,
                closed = t.closed,
                waitlist = t.waitlist,
                "Found {} section(s)",
                t.total()
            );
        }

        page.status().ok_or_else(|| {
            AppError::extraction(subject, course_number, term, "search results did not load")
        })
    }
}
