//! DLsite scraping-target health monitoring.
//!
//! The monitor fetches a DLsite listing page, probes the CSS selectors the
//! scraper depends on and turns the hit ratio into a risk level. Reports that
//! look like a markup change are fed into the error handler so they show up in
//! the same counters and logs as scraping failures.

use crate::classifier::SourceError;
use crate::context::ErrorContext;
use crate::error::{SuzuminaError, SuzuminaResult};
use crate::handler::ErrorHandler;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const DEFAULT_TARGET_URL: &str =
    "https://www.dlsite.com/maniax/fsr/=/keyword_creater/%22%E6%B6%BC%E8%8A%B1%E3%81%BF%E3%81%AA%E3%81%9B%22/";

const MONITOR_FUNCTION: &str = "dlsiteHealthMonitor";

/// Shortest period `spawn` will tick at.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// A CSS selector the scraper relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorProbe {
    pub name: String,
    pub selector: String,
    /// A missing required selector makes the page unusable on its own.
    pub required: bool,
}

impl SelectorProbe {
    pub fn required<N: Into<String>, S: Into<String>>(name: N, selector: S) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            required: true,
        }
    }

    pub fn optional<N: Into<String>, S: Into<String>>(name: N, selector: S) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            required: false,
        }
    }
}

/// Selectors used when parsing DLsite search result pages.
pub fn default_probes() -> Vec<SelectorProbe> {
    vec![
        SelectorProbe::required("result_list", "#search_result_img_box"),
        SelectorProbe::required("work_item", "li.search_result_img_box_inner"),
        SelectorProbe::required("work_title", ".work_name a"),
        SelectorProbe::optional("circle", ".maker_name a"),
        SelectorProbe::optional("price", ".work_price"),
        SelectorProbe::optional("thumbnail", ".work_thumb img"),
        SelectorProbe::optional("category", ".work_category"),
        SelectorProbe::optional("rating", ".star_rating"),
    ]
}

#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    pub target_url: String,
    pub probes: Vec<SelectorProbe>,
    /// Period between checks when spawned. Raised to `MIN_INTERVAL` if shorter.
    pub interval: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    /// Number of reports kept in memory.
    pub history_limit: usize,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            probes: default_probes(),
            interval: Duration::from_secs(60 * 60),
            request_timeout: Duration::from_secs(30),
            user_agent: format!("suzumina-health-monitor/{}", env!("CARGO_PKG_VERSION")),
            history_limit: 24,
        }
    }
}

impl HealthMonitorConfig {
    pub fn with_target_url<S: Into<String>>(mut self, url: S) -> Self {
        self.target_url = url.into();
        self
    }

    pub fn with_probes(mut self, probes: Vec<SelectorProbe>) -> Self {
        self.probes = probes;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}

/// How likely the scraper is to break against the current markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// Risk for a given hit ratio (0-100).
pub fn classify_risk(success_rate: f64, missing_required: usize) -> RiskLevel {
    if missing_required > 0 || success_rate < 50.0 {
        RiskLevel::Critical
    } else if success_rate < 70.0 {
        RiskLevel::High
    } else if success_rate < 90.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub name: String,
    pub selector: String,
    pub required: bool,
    pub match_count: usize,
}

impl ProbeResult {
    pub fn found(&self) -> bool {
        self.match_count > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub target_url: String,
    pub checked_at: DateTime<Utc>,
    pub probes: Vec<ProbeResult>,
    /// Percentage of probes that matched at least once.
    pub success_rate: f64,
    pub risk: RiskLevel,
    pub missing_required: Vec<String>,
    pub recommendations: Vec<String>,
    /// Set when the page could not be fetched or analysed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    fn failed(target_url: &str, error: &SuzuminaError) -> Self {
        Self {
            target_url: target_url.to_string(),
            checked_at: Utc::now(),
            probes: Vec::new(),
            success_rate: 0.0,
            risk: RiskLevel::Critical,
            missing_required: Vec::new(),
            recommendations: vec![
                "Check that DLsite is reachable from the function".to_string(),
                "Verify the monitor configuration".to_string(),
            ],
            error: Some(error.to_string()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.risk <= RiskLevel::Medium
    }

    pub fn missing(&self) -> Vec<&str> {
        self.probes
            .iter()
            .filter(|probe| !probe.found())
            .map(|probe| probe.name.as_str())
            .collect()
    }

    pub fn to_json(&self) -> SuzuminaResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Probe `html` with every selector and score the result.
///
/// # Errors
/// Returns `SuzuminaError::Selector` for a selector that does not parse and
/// `SuzuminaError::Configuration` when no probes are given.
pub fn analyze(target_url: &str, html: &str, probes: &[SelectorProbe]) -> SuzuminaResult<HealthReport> {
    if probes.is_empty() {
        return Err(SuzuminaError::configuration(
            "probes",
            "at least one selector probe is required",
        ));
    }

    let compiled = probes
        .iter()
        .map(|probe| {
            Selector::parse(&probe.selector)
                .map(|selector| (probe, selector))
                .map_err(|e| SuzuminaError::selector(&probe.selector, format!("{e:?}")))
        })
        .collect::<SuzuminaResult<Vec<_>>>()?;

    let document = Html::parse_document(html);
    let results: Vec<ProbeResult> = compiled
        .iter()
        .map(|(probe, selector)| ProbeResult {
            name: probe.name.clone(),
            selector: probe.selector.clone(),
            required: probe.required,
            match_count: document.select(selector).count(),
        })
        .collect();

    let found = results.iter().filter(|r| r.found()).count();
    let success_rate = found as f64 / results.len() as f64 * 100.0;
    let missing_required: Vec<String> = results
        .iter()
        .filter(|r| r.required && !r.found())
        .map(|r| r.name.clone())
        .collect();
    let risk = classify_risk(success_rate, missing_required.len());

    let mut recommendations = Vec::new();
    if !missing_required.is_empty() {
        recommendations.push(format!(
            "Required selectors missing ({}); the scraper will fail",
            missing_required.join(", ")
        ));
    }
    for result in results.iter().filter(|r| !r.found() && !r.required) {
        recommendations.push(format!(
            "Selector '{}' for {} matched nothing; update it",
            result.selector, result.name
        ));
    }

    Ok(HealthReport {
        target_url: target_url.to_string(),
        checked_at: Utc::now(),
        probes: results,
        success_rate,
        risk,
        missing_required,
        recommendations,
        error: None,
    })
}

/// Fetches the page under test.
#[async_trait]
pub trait PageFetcher: fmt::Debug + Send + Sync {
    async fn fetch(&self, url: &str) -> SuzuminaResult<String>;
}

/// `reqwest` backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// # Errors
    /// Returns `SuzuminaError::Initialization` if the HTTP client cannot be built.
    pub fn new(config: &HealthMonitorConfig) -> SuzuminaResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| SuzuminaError::initialization(format!("HTTP client: {err}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> SuzuminaResult<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| SuzuminaError::http(url, err.status().map(|s| s.as_u16()), err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SuzuminaError::http(
                url,
                Some(status.as_u16()),
                format!("unexpected status {status}"),
            ));
        }

        response
            .text()
            .await
            .map_err(|err| SuzuminaError::http(url, Some(status.as_u16()), err.to_string()))
    }
}

/// Periodically checks DLsite markup and keeps the recent reports.
#[derive(Debug)]
pub struct HealthMonitor {
    config: HealthMonitorConfig,
    fetcher: Arc<dyn PageFetcher>,
    handler: Option<Arc<ErrorHandler>>,
    history: Mutex<VecDeque<HealthReport>>,
}

impl HealthMonitor {
    pub fn new(config: HealthMonitorConfig, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            config,
            fetcher,
            handler: None,
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Monitor backed by `HttpFetcher`.
    pub fn with_http(config: HealthMonitorConfig) -> SuzuminaResult<Self> {
        let fetcher = HttpFetcher::new(&config)?;
        Ok(Self::new(config, Arc::new(fetcher)))
    }

    /// Report unhealthy checks through `handler`.
    pub fn with_handler(mut self, handler: Arc<ErrorHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn config(&self) -> &HealthMonitorConfig {
        &self.config
    }

    /// Run one check.
    pub async fn check(&self) -> HealthReport {
        let url = self.config.target_url.as_str();
        let outcome = match self.fetcher.fetch(url).await {
            Ok(html) => analyze(url, &html, &self.config.probes),
            Err(err) => Err(err),
        };

        let report = match outcome {
            Ok(report) => {
                if report.risk >= RiskLevel::High {
                    let source = SourceError::new(format!(
                        "DLsite structure check failed: {} of {} selectors missing",
                        report.missing().len(),
                        report.probes.len()
                    ))
                    .with_name("ScrapingError");
                    self.report(source, &report).await;
                }
                report
            }
            Err(err) => {
                let report = HealthReport::failed(url, &err);
                self.report(err.into(), &report).await;
                report
            }
        };

        tracing::info!(
            target_url = %report.target_url,
            success_rate = report.success_rate,
            risk = %report.risk,
            "dlsite health check finished"
        );
        self.record(report.clone());
        report
    }

    async fn report(&self, source: SourceError, report: &HealthReport) {
        let Some(handler) = &self.handler else {
            tracing::warn!(risk = %report.risk, "{}", source.message);
            return;
        };
        let context = ErrorContext::new(MONITOR_FUNCTION, "check")
            .with_info("targetUrl", serde_json::json!(report.target_url))
            .with_info("successRate", serde_json::json!(report.success_rate))
            .with_info("risk", serde_json::json!(report.risk))
            .with_info("missingRequired", serde_json::json!(report.missing_required));
        handler.handle_error(source, context).await;
    }

    fn record(&self, report: HealthReport) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push_back(report);
        while history.len() > self.config.history_limit.max(1) {
            history.pop_front();
        }
    }

    pub fn latest(&self) -> Option<HealthReport> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .cloned()
    }

    /// Recent reports, oldest first.
    pub fn history(&self) -> Vec<HealthReport> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Run `check` every `interval`, starting immediately. Abort the handle to stop.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.config.interval.max(MIN_INTERVAL);
        if period != self.config.interval {
            tracing::warn!(
                configured_ms = self.config.interval.as_millis() as u64,
                period_secs = period.as_secs(),
                "health monitor interval too short, using minimum"
            );
        }
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.check().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ErrorKind;
    use crate::settings::HandlerSettings;

    const HEALTHY_PAGE: &str = r#"
        <html><body>
          <ul id="search_result_img_box">
            <li class="search_result_img_box_inner">
              <div class="work_thumb"><img src="/thumb.jpg"></div>
              <div class="work_name"><a href="/work/RJ01234567.html">作品</a></div>
              <div class="maker_name"><a href="/circle/RG00001.html">サークル</a></div>
              <div class="work_price">1,320円</div>
              <div class="work_category">ボイス・ASMR</div>
              <div class="star_rating">4.8</div>
            </li>
          </ul>
        </body></html>
    "#;

    const CHANGED_PAGE: &str = r#"
        <html><body>
          <ul id="search_result_img_box">
            <li class="search_result_img_box_inner">
              <div class="product-title"><a href="/work/RJ01234567.html">作品</a></div>
              <div class="work_price">1,320円</div>
            </li>
          </ul>
        </body></html>
    "#;

    #[derive(Debug)]
    struct StaticFetcher(SuzuminaResult<String>);

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, _url: &str) -> SuzuminaResult<String> {
            self.0.clone()
        }
    }

    fn monitor(page: SuzuminaResult<String>) -> HealthMonitor {
        HealthMonitor::new(HealthMonitorConfig::default(), Arc::new(StaticFetcher(page)))
    }

    #[test]
    fn test_risk_thresholds() {
        assert_eq!(classify_risk(100.0, 0), RiskLevel::Low);
        assert_eq!(classify_risk(90.0, 0), RiskLevel::Low);
        assert_eq!(classify_risk(89.9, 0), RiskLevel::Medium);
        assert_eq!(classify_risk(70.0, 0), RiskLevel::Medium);
        assert_eq!(classify_risk(69.9, 0), RiskLevel::High);
        assert_eq!(classify_risk(50.0, 0), RiskLevel::High);
        assert_eq!(classify_risk(49.9, 0), RiskLevel::Critical);
        assert_eq!(classify_risk(100.0, 1), RiskLevel::Critical);
    }

    #[test]
    fn test_healthy_page_should_match_every_probe() {
        let report = analyze("https://example.test", HEALTHY_PAGE, &default_probes()).unwrap();

        assert_eq!(report.success_rate, 100.0);
        assert_eq!(report.risk, RiskLevel::Low);
        assert!(report.is_healthy());
        assert!(report.missing().is_empty());
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn test_changed_page_should_be_critical() {
        // Given: markup where the title class was renamed
        let report = analyze("https://example.test", CHANGED_PAGE, &default_probes()).unwrap();

        // Then: the required title probe is missing
        assert_eq!(report.missing_required, vec!["work_title".to_string()]);
        assert_eq!(report.risk, RiskLevel::Critical);
        assert!(!report.is_healthy());
        // result_list, work_item and price matched
        assert_eq!(report.success_rate, 3.0 / 8.0 * 100.0);
    }

    #[test]
    fn test_optional_misses_should_degrade_risk() {
        let probes = vec![
            SelectorProbe::required("list", "#search_result_img_box"),
            SelectorProbe::optional("title", ".work_name a"),
            SelectorProbe::optional("missing-a", ".nope"),
        ];
        let report = analyze("https://example.test", HEALTHY_PAGE, &probes).unwrap();

        // two of three matched
        assert_eq!(report.risk, RiskLevel::High);
        assert_eq!(report.recommendations.len(), 1);
    }

    #[test]
    fn test_invalid_selector_should_error() {
        let probes = vec![SelectorProbe::required("broken", "div[")];
        let err = analyze("https://example.test", HEALTHY_PAGE, &probes).unwrap_err();

        assert!(matches!(err, SuzuminaError::Selector { ref selector, .. } if selector == "div["));
    }

    #[test]
    fn test_empty_probes_should_error() {
        let err = analyze("https://example.test", HEALTHY_PAGE, &[]).unwrap_err();
        assert!(matches!(err, SuzuminaError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_check_should_record_history() {
        let monitor = HealthMonitor::new(
            HealthMonitorConfig::default().with_history_limit(2),
            Arc::new(StaticFetcher(Ok(HEALTHY_PAGE.to_string()))),
        );

        for _ in 0..3 {
            monitor.check().await;
        }

        assert_eq!(monitor.history().len(), 2);
        assert_eq!(monitor.latest().unwrap().risk, RiskLevel::Low);
    }

    #[tokio::test]
    async fn test_structure_change_should_reach_handler() {
        // Given: a monitor wired to a handler
        let handler = Arc::new(ErrorHandler::new(HandlerSettings::default()));
        let monitor = monitor(Ok(CHANGED_PAGE.to_string())).with_handler(handler.clone());

        // When: the markup has changed
        let report = monitor.check().await;

        // Then: the handler counted a structure change
        assert_eq!(report.risk, RiskLevel::Critical);
        assert_eq!(
            handler.error_count(ErrorKind::DlsiteStructureChanged, MONITOR_FUNCTION),
            1
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_should_be_critical_and_reported() {
        let handler = Arc::new(ErrorHandler::new(HandlerSettings::default()));
        let failure = SuzuminaError::http(DEFAULT_TARGET_URL, Some(503), "unexpected status 503");
        let monitor = monitor(Err(failure)).with_handler(handler.clone());

        let report = monitor.check().await;

        assert_eq!(report.risk, RiskLevel::Critical);
        assert!(report.error.unwrap().contains("503"));
        assert_eq!(handler.error_count(ErrorKind::DlsiteScraping, MONITOR_FUNCTION), 1);
    }

    #[tokio::test]
    async fn test_healthy_check_should_not_reach_handler() {
        let handler = Arc::new(ErrorHandler::new(HandlerSettings::default()));
        let monitor = monitor(Ok(HEALTHY_PAGE.to_string())).with_handler(handler.clone());

        monitor.check().await;

        assert_eq!(handler.statistics().total_errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_should_check_on_every_tick() {
        let monitor = Arc::new(HealthMonitor::new(
            HealthMonitorConfig::default().with_interval(Duration::from_secs(10)),
            Arc::new(StaticFetcher(Ok(HEALTHY_PAGE.to_string()))),
        ));

        let task = monitor.clone().spawn();
        tokio::time::sleep(Duration::from_secs(25)).await;
        task.abort();

        assert!(monitor.history().len() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_should_run_at_minimum_period() {
        // Given: a monitor configured with a zero interval
        let monitor = Arc::new(HealthMonitor::new(
            HealthMonitorConfig::default().with_interval(Duration::ZERO),
            Arc::new(StaticFetcher(Ok(HEALTHY_PAGE.to_string()))),
        ));

        // When: it is spawned
        let task = monitor.clone().spawn();
        tokio::time::sleep(MIN_INTERVAL * 2 + Duration::from_millis(500)).await;

        // Then: the loop keeps running at the minimum period
        assert!(!task.is_finished());
        task.abort();
        assert!(monitor.history().len() >= 2);
    }

    #[test]
    fn test_report_json() {
        let report = analyze("https://example.test", HEALTHY_PAGE, &default_probes()).unwrap();
        let json = report.to_json().unwrap();

        assert!(json.contains("\"successRate\": 100.0"));
        assert!(json.contains("\"risk\": \"LOW\""));
        assert!(!json.contains("\"error\""));
    }
}
