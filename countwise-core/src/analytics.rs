//! The analytics facade
//!
//! [`Analytics`] ties together the counter store, the enablement gate, the
//! endpoint URL and report queries. The gate is read once at construction:
//! an instance never observes later changes to the stored flag.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::config::AnalyticsConfig;
use crate::error::{Error, Result};
use crate::report::{
    build_report_url, run_query, AnalyticsListener, CancellationToken, HttpTransport,
    QueryHandle, QueryOutcome, Transport,
};
use crate::store::Store;
use crate::types::{
    StoredValue, DISABLED_SENTINEL, DISABLED_SENTINEL_FLOAT, KEY_INSTALLATION_ID,
    KEY_PLATFORM_VERSION,
};

/// Settings key holding the enablement flag
pub const KEY_ENABLE_ANALYTICS: &str = "_ALLOW_ANALYTICS_SEND_USAGE_STATISTICS";

/// Settings key holding the set-once endpoint URL
pub const KEY_ANALYTICS_URL: &str = "analytics.url";

/// Usage counters with opt-in reporting.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use countwise_core::{Analytics, AnalyticsConfig, Store};
///
/// let store = Arc::new(Store::open("/tmp/countwise").expect("failed to open store"));
/// let config = AnalyticsConfig::with_default_url("https://stats.example.com/q");
/// let analytics = Analytics::new(store, config).expect("invalid config");
///
/// analytics.increment("app_opened").expect("store failure");
/// ```
pub struct Analytics {
    store: Arc<Store>,
    config: AnalyticsConfig,
    enabled: bool,
    transport: Arc<dyn Transport>,
    runtime: Option<Handle>,
}

impl std::fmt::Debug for Analytics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analytics")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl Analytics {
    /// Create an instance over `store`.
    ///
    /// Returns an error if the configuration is invalid or the enablement
    /// flag cannot be read. A missing default URL is only reported once a
    /// URL is needed.
    pub fn new(store: Arc<Store>, config: AnalyticsConfig) -> Result<Self> {
        config.validate()?;

        let transport = HttpTransport::new(config.timeout_secs.map(Duration::from_secs))?;
        let enabled = read_enable_flag(&store, config.force_enabled)?;

        tracing::debug!(enabled, dir = %store.dir().display(), "Analytics created");

        Ok(Self {
            store,
            config,
            enabled,
            transport: Arc::new(transport),
            runtime: None,
        })
    }

    /// Replace the HTTP transport used by queries
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Run queries on `runtime` instead of the caller's current runtime
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// The storage handle
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    // ============================================
    // Enablement gate
    // ============================================

    /// Whether this instance collects and reports (fixed at construction)
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Read the stored enablement flag, including the debug override
    pub fn enable_analytics(&self) -> Result<bool> {
        read_enable_flag(&self.store, self.config.force_enabled)
    }

    /// Persist the user's choice to allow or decline analytics.
    ///
    /// Takes effect for instances created afterwards.
    pub fn set_enable_analytics(&self, enable: bool) -> Result<()> {
        self.store
            .put_setting(KEY_ENABLE_ANALYTICS, if enable { "true" } else { "false" })?;
        tracing::info!(enable, "Analytics preference stored");
        Ok(())
    }

    // ============================================
    // Integer counters
    // ============================================

    pub fn increment(&self, key: &str) -> Result<i64> {
        self.increment_by(key, 1)
    }

    /// Add `value` to the counter `key`. Returns the new value, or
    /// [`DISABLED_SENTINEL`] without touching storage when disabled.
    pub fn increment_by(&self, key: &str, value: i64) -> Result<i64> {
        if !self.enabled {
            return Ok(DISABLED_SENTINEL);
        }
        let stored = self.store.add_int(key, value)?;
        tracing::trace!(key, value, stored, "Counter updated");
        Ok(stored)
    }

    pub fn decrement(&self, key: &str) -> Result<i64> {
        self.increment_by(key, -1)
    }

    pub fn decrement_by(&self, key: &str, value: i64) -> Result<i64> {
        self.increment_by(key, value.wrapping_neg())
    }

    // ============================================
    // Float counters
    // ============================================

    pub fn increment_float(&self, key: &str) -> Result<f64> {
        self.increment_float_by(key, 1.0)
    }

    /// Float flavour of [`increment_by`](Self::increment_by); returns
    /// [`DISABLED_SENTINEL_FLOAT`] when disabled.
    pub fn increment_float_by(&self, key: &str, value: f64) -> Result<f64> {
        if !self.enabled {
            return Ok(DISABLED_SENTINEL_FLOAT);
        }
        let stored = self.store.add_float(key, value)?;
        tracing::trace!(key, value, stored, "Float counter updated");
        Ok(stored)
    }

    pub fn decrement_float(&self, key: &str) -> Result<f64> {
        self.increment_float_by(key, -1.0)
    }

    pub fn decrement_float_by(&self, key: &str, value: f64) -> Result<f64> {
        self.increment_float_by(key, -value)
    }

    // ============================================
    // Flags and strings
    // ============================================

    /// Store a boolean entry. No-op when disabled.
    pub fn set_flag(&self, key: &str, enabled: bool) -> Result<()> {
        if self.enabled {
            self.store.set_value(key, StoredValue::Bool(enabled))?;
        }
        Ok(())
    }

    /// Store a string entry. No-op when disabled.
    pub fn put_string(&self, key: &str, value: &str) -> Result<()> {
        if self.enabled {
            self.store
                .set_value(key, StoredValue::Text(value.to_string()))?;
        }
        Ok(())
    }

    /// Flush pending writes to disk. No-op when disabled.
    pub fn save(&self) -> Result<()> {
        if self.enabled {
            self.store.checkpoint()?;
        }
        Ok(())
    }

    /// Every stored entry as strings, plus the installation id and platform
    /// version. Empty when disabled.
    pub fn get_all(&self) -> Result<BTreeMap<String, String>> {
        let mut result = BTreeMap::new();
        if !self.enabled {
            return Ok(result);
        }

        for (key, value) in self.store.all_values()? {
            result.insert(key, value.render());
        }
        result.insert(KEY_INSTALLATION_ID.to_string(), self.installation_id()?);
        result.insert(
            KEY_PLATFORM_VERSION.to_string(),
            self.config.platform_version.clone(),
        );
        Ok(result)
    }

    // ============================================
    // Endpoint URL and identity
    // ============================================

    /// Store `url` as the report endpoint unless one is already stored.
    ///
    /// Returns true if `url` was stored.
    pub fn set_url_once(&self, url: &str) -> Result<bool> {
        reqwest::Url::parse(url)
            .map_err(|e| Error::Config(format!("invalid report URL {:?}: {}", url, e)))?;

        let stored = self.store.put_setting_if_absent(KEY_ANALYTICS_URL, url)?;
        if stored {
            tracing::info!(url, "Report URL stored");
        }
        Ok(stored)
    }

    /// The effective report endpoint: the stored URL when it parses, the
    /// configured default otherwise.
    pub fn url(&self) -> Result<String> {
        if let Some(url) = self.store.get_setting(KEY_ANALYTICS_URL)? {
            if reqwest::Url::parse(&url).is_ok() {
                return Ok(url);
            }
            tracing::warn!(url = %url, "Stored report URL is invalid, using default");
        }

        self.config
            .default_url
            .clone()
            .ok_or_else(|| Error::Config("analytics.default_url is required".to_string()))
    }

    /// Installation id, created on first access
    pub fn installation_id(&self) -> Result<String> {
        self.store.installation_id()
    }

    // ============================================
    // Queries
    // ============================================

    pub fn query(&self) -> Result<QueryHandle> {
        self.query_with(None, None)
    }

    pub fn query_with_listener<L>(&self, listener: L) -> Result<QueryHandle>
    where
        L: AnalyticsListener + 'static,
    {
        let listener: Box<dyn AnalyticsListener> = Box::new(listener);
        self.query_with(Some(listener), None)
    }

    pub fn query_with_params(&self, params: &HashMap<String, String>) -> Result<QueryHandle> {
        self.query_with(None, Some(params))
    }

    /// Send a report in the background.
    ///
    /// `params` are added to the stored entries and win on key collision.
    /// Storage failures while building the request are returned; network
    /// failures end up in the handle's [`QueryOutcome`] and skip `listener`.
    pub fn query_with(
        &self,
        listener: Option<Box<dyn AnalyticsListener>>,
        params: Option<&HashMap<String, String>>,
    ) -> Result<QueryHandle> {
        if !self.enabled {
            tracing::warn!("Analytics are not enabled for this device");
            return Ok(QueryHandle::ready(QueryOutcome::Disabled));
        }

        let url = self.report_url(params)?;

        let runtime = match self.runtime.clone().or_else(|| Handle::try_current().ok()) {
            Some(runtime) => runtime,
            None => {
                return Err(Error::Report(
                    "no tokio runtime available to run the query".to_string(),
                ))
            }
        };

        let cancel = CancellationToken::new();
        let task = runtime.spawn(run_query(
            Arc::clone(&self.transport),
            url,
            listener,
            cancel.clone(),
        ));

        Ok(QueryHandle::running(task, cancel))
    }

    /// Send a report on the current task and wait for the outcome.
    pub async fn report(
        &self,
        params: Option<&HashMap<String, String>>,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome> {
        if !self.enabled {
            tracing::warn!("Analytics are not enabled for this device");
            return Ok(QueryOutcome::Disabled);
        }

        let url = self.report_url(params)?;
        Ok(run_query(Arc::clone(&self.transport), url, None, cancel.clone()).await)
    }

    /// Full request URL: stored entries overlaid with `params`
    pub fn report_url(&self, params: Option<&HashMap<String, String>>) -> Result<String> {
        let mut analytics = self.get_all()?;
        if let Some(params) = params {
            for (key, value) in params {
                analytics.insert(key.clone(), value.clone());
            }
        }
        build_report_url(&self.url()?, &analytics)
    }
}

fn read_enable_flag(store: &Store, force_enabled: bool) -> Result<bool> {
    let stored = store
        .get_setting(KEY_ENABLE_ANALYTICS)?
        .map(|v| v == "true")
        .unwrap_or(false);
    Ok(stored || force_enabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const URL: &str = "https://stats.example.com/q";

    fn setup(enabled: bool) -> (TempDir, Analytics) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path()).unwrap());
        if enabled {
            store.put_setting(KEY_ENABLE_ANALYTICS, "true").unwrap();
        }
        let analytics = Analytics::new(store, AnalyticsConfig::with_default_url(URL)).unwrap();
        (dir, analytics)
    }

    #[test]
    fn test_missing_default_url_fails_lazily() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path()).unwrap());
        store.put_setting(KEY_ENABLE_ANALYTICS, "true").unwrap();
        let analytics = Analytics::new(store, AnalyticsConfig::default()).unwrap();

        assert_eq!(analytics.increment("k").unwrap(), 1);
        assert!(!analytics.installation_id().unwrap().is_empty());
        assert!(matches!(analytics.url(), Err(Error::Config(_))));
        assert!(matches!(analytics.report_url(None), Err(Error::Config(_))));

        assert!(analytics.set_url_once("https://a.example.com").unwrap());
        assert_eq!(analytics.url().unwrap(), "https://a.example.com");
    }

    #[test]
    fn test_decrement_undoes_increment_near_max() {
        let (_dir, analytics) = setup(true);
        analytics.increment_by("k", i64::MAX - 1).unwrap();

        analytics.increment_by("k", 5).unwrap();
        assert_eq!(analytics.decrement_by("k", 5).unwrap(), i64::MAX - 1);

        analytics.decrement_by("k", i64::MIN).unwrap();
        assert_eq!(analytics.increment_by("k", i64::MIN).unwrap(), i64::MAX - 1);
    }

    #[test]
    fn test_disabled_by_default() {
        let (_dir, analytics) = setup(false);
        assert!(!analytics.is_enabled());
        assert!(!analytics.enable_analytics().unwrap());
    }

    #[test]
    fn test_force_enabled_overrides_stored_flag() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path()).unwrap());
        let config = AnalyticsConfig {
            force_enabled: true,
            ..AnalyticsConfig::with_default_url(URL)
        };
        let analytics = Analytics::new(store, config).unwrap();
        assert!(analytics.is_enabled());
        assert_eq!(analytics.increment("k").unwrap(), 1);
    }

    #[test]
    fn test_gate_cached_at_construction() {
        let (_dir, analytics) = setup(false);
        analytics.set_enable_analytics(true).unwrap();

        assert!(analytics.enable_analytics().unwrap());
        assert!(!analytics.is_enabled());
        assert_eq!(analytics.increment("k").unwrap(), DISABLED_SENTINEL);
    }

    #[test]
    fn test_float_counters() {
        let (_dir, analytics) = setup(true);
        assert_eq!(analytics.increment_float("f").unwrap(), 1.0);
        assert_eq!(analytics.increment_float_by("f", 0.5).unwrap(), 1.5);
        assert_eq!(analytics.decrement_float("f").unwrap(), 0.5);
        assert_eq!(analytics.decrement_float_by("f", 0.5).unwrap(), 0.0);
    }

    #[test]
    fn test_disabled_float_sentinel() {
        let (_dir, analytics) = setup(false);
        assert_eq!(
            analytics.increment_float_by("f", 2.0).unwrap(),
            DISABLED_SENTINEL_FLOAT
        );
        assert_eq!(analytics.decrement_float("f").unwrap(), DISABLED_SENTINEL_FLOAT);
    }

    #[test]
    fn test_flags_and_strings_in_get_all() {
        let (_dir, analytics) = setup(true);
        analytics.set_flag("dark_mode", true).unwrap();
        analytics.put_string("theme", "solarized").unwrap();

        let all = analytics.get_all().unwrap();
        assert_eq!(all.get("dark_mode").map(String::as_str), Some("true"));
        assert_eq!(all.get("theme").map(String::as_str), Some("solarized"));
        assert_eq!(
            all.get(KEY_PLATFORM_VERSION).map(String::as_str),
            Some(std::env::consts::OS)
        );
    }

    #[test]
    fn test_url_defaults_until_set_once() {
        let (_dir, analytics) = setup(false);
        assert_eq!(analytics.url().unwrap(), URL);

        assert!(analytics.set_url_once("https://a.example.com").unwrap());
        assert_eq!(analytics.url().unwrap(), "https://a.example.com");
    }

    #[test]
    fn test_set_url_once_rejects_invalid_url() {
        let (_dir, analytics) = setup(true);
        assert!(analytics.set_url_once("not a url").is_err());
        assert!(analytics.set_url_once("https://ok.example.com").unwrap());
    }

    #[test]
    fn test_invalid_stored_url_falls_back_to_default() {
        let (_dir, analytics) = setup(true);
        analytics
            .store()
            .put_setting(KEY_ANALYTICS_URL, "garbage")
            .unwrap();
        assert_eq!(analytics.url().unwrap(), URL);
    }

    #[test]
    fn test_save_flushes_when_enabled() {
        let (dir, analytics) = setup(true);
        analytics.increment_by("k", 3).unwrap();
        analytics.save().unwrap();

        let reopened = Store::open(dir.path()).unwrap();
        assert_eq!(reopened.get_value("k").unwrap(), Some(StoredValue::Int(3)));
    }

    #[test]
    fn test_query_without_runtime_is_an_error() {
        let (_dir, analytics) = setup(true);
        assert!(matches!(analytics.query(), Err(Error::Report(_))));
    }
}
