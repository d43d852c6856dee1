//! Testing utilities for the provider.
//!
//! [`ProviderTester`] drives a [`ProviderService`] the way an orchestrator
//! would, without any plugin transport. [`FakeBackend`] stands in for the
//! Sysdig API, and the `assert_*` helpers check plans, diagnostics and
//! state.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sysdig_provider::testing::{assert_state_attr, FakeBackend, ProviderTester};
//! use sysdig_provider::SysdigProvider;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_list() {
//!     let backend = Arc::new(FakeBackend::new());
//!     let tester = ProviderTester::new(SysdigProvider::with_api(backend));
//!
//!     let state = tester
//!         .lifecycle_create("sysdig_secure_list", json!({"name": "shells", "items": ["bash"]}))
//!         .await
//!         .unwrap();
//!     assert_state_attr(&state, "items.#", json!(1));
//! }
//! ```

mod fake_backend;

pub use fake_backend::FakeBackend;

use serde_json::Value;

use crate::config::{EnvLookup, ProcessEnv};
use crate::error::ProviderError;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult, RefreshResult};

/// A test harness for provider implementations.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Get the list of data source type names.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate provider configuration.
    ///
    /// Returns `Err` with the diagnostics if there are errors.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider.
    ///
    /// Returns `Err` with the diagnostics if there are errors.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider.plan(resource_type, None, proposed_state).await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), proposed_state)
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null)
            .await
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource. `None` when it is gone.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Read a resource and report drift against `current_state`.
    pub async fn refresh(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<RefreshResult, ProviderError> {
        self.provider.refresh(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Import a resource and return the state of the single imported entity.
    pub async fn import_state(&self, resource_type: &str, id: &str) -> Result<Value, ProviderError> {
        self.import_resource(resource_type, id)
            .await?
            .into_iter()
            .next()
            .map(|imported| imported.state)
            .ok_or_else(|| {
                ProviderError::Internal(format!("import of {} {} returned nothing", resource_type, id))
            })
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source configuration.
    pub async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_data_source_config(data_source_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Read data from a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .read_data_source(data_source_type, config)
            .await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run a full create lifecycle: plan → create → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self.plan_create(resource_type, config).await?;
        let created_state = self
            .create(resource_type, plan_result.planned_state)
            .await?;
        self.read_existing(resource_type, created_state).await
    }

    /// Run a full update lifecycle: plan → update → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated_state = self
            .update(resource_type, prior_state, plan_result.planned_state)
            .await?;
        self.read_existing(resource_type, updated_state).await
    }

    /// Run a full delete lifecycle: plan → delete.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        let _ = self
            .plan_delete(resource_type, current_state.clone())
            .await?;
        self.delete(resource_type, current_state).await
    }

    /// Run a full CRUD lifecycle: create → read → update → read → delete.
    ///
    /// Returns the state after the update (before delete).
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created_state = self.lifecycle_create(resource_type, initial_config).await?;
        let updated_state = self
            .lifecycle_update(resource_type, created_state, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated_state.clone())
            .await?;
        Ok(updated_state)
    }

    async fn read_existing(&self, resource_type: &str, state: Value) -> Result<Value, ProviderError> {
        self.read(resource_type, state).await?.ok_or_else(|| {
            ProviderError::NotFound(format!("{} disappeared right after apply", resource_type))
        })
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

/// Check diagnostics and return an error if there are any errors.
fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics
        .into_iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Environment Gating
// =========================================================================

/// Whether every variable in `vars` is set.
///
/// Live tests call this first and return early when it is `false`.
pub fn precheck_env(vars: &[&str]) -> bool {
    precheck_env_with(&ProcessEnv, vars)
}

/// [`precheck_env`] against an explicit environment.
pub fn precheck_env_with(env: &dyn EnvLookup, vars: &[&str]) -> bool {
    let missing: Vec<&str> = vars.iter().copied().filter(|v| env.get(v).is_none()).collect();
    if !missing.is_empty() {
        tracing::info!(?missing, "Skipping: environment not set");
    }
    missing.is_empty()
}

// =========================================================================
// State Helpers
// =========================================================================

/// Look up a dotted attribute path in state.
///
/// Numeric segments index lists, other segments index objects, and a final
/// `#` (lists) or `%` (maps) yields the element count. A `null` value reads
/// as absent, and the count of an absent collection is `0`.
pub fn state_attr(state: &Value, path: &str) -> Option<Value> {
    let mut current = state;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let is_last = segments.peek().is_none();
        if is_last && (segment == "#" || segment == "%") {
            let count = match current {
                Value::Array(items) => items.len(),
                Value::Object(obj) => obj.len(),
                _ => 0,
            };
            return Some(Value::from(count));
        }
        let next = match current {
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            Value::Object(obj) => obj.get(segment),
            _ => None,
        };
        current = match next {
            Some(value) => value,
            // Counting a missing collection reads as zero.
            None if matches!(segments.peek(), Some(&"#") | Some(&"%")) => {
                return Some(Value::from(0));
            },
            None => return None,
        };
    }
    (!current.is_null()).then(|| current.clone())
}

/// Assert that a state attribute has the expected value.
///
/// Numbers are compared by value, so `5` matches `5.0`.
///
/// # Panics
///
/// Panics if the attribute is absent or differs.
pub fn assert_state_attr(state: &Value, path: &str, expected: Value) {
    let actual = state_attr(state, path);
    assert!(
        actual.as_ref().is_some_and(|a| values_match(a, &expected)),
        "Expected attribute '{}' to be {}, got {:?}",
        path,
        expected,
        actual
    );
}

/// Assert that a state attribute is absent, `null` or empty.
///
/// # Panics
///
/// Panics if the attribute has a non-empty value.
pub fn assert_state_attr_unset(state: &Value, path: &str) {
    let actual = state_attr(state, path);
    assert!(
        actual.as_ref().map_or(true, is_empty),
        "Expected attribute '{}' to be unset, got {:?}",
        path,
        actual
    );
}

/// Assert that importing a resource reproduces the state it was created with.
///
/// Every top-level attribute of `created` other than those in `ignore` must
/// match `imported`. Absent, `null` and empty collections are equivalent.
///
/// # Panics
///
/// Panics listing every attribute that differs.
pub fn assert_import_state_verify(created: &Value, imported: &Value, ignore: &[&str]) {
    let empty = serde_json::Map::new();
    let created_obj = created.as_object().unwrap_or(&empty);
    let imported_obj = imported.as_object().unwrap_or(&empty);

    let mut keys: Vec<&String> = created_obj.keys().chain(imported_obj.keys()).collect();
    keys.sort();
    keys.dedup();

    let mismatches: Vec<String> = keys
        .into_iter()
        .filter(|k| !ignore.contains(&k.as_str()))
        .filter_map(|k| {
            let a = created_obj.get(k.as_str()).unwrap_or(&Value::Null);
            let b = imported_obj.get(k.as_str()).unwrap_or(&Value::Null);
            let same = (is_empty(a) && is_empty(b)) || values_match(a, b);
            (!same).then(|| format!("{}: created {} imported {}", k, a, b))
        })
        .collect();

    assert!(
        mismatches.is_empty(),
        "Imported state differs from created state:\n  {}",
        mismatches.join("\n  ")
    );
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(obj) => obj.is_empty(),
        _ => false,
    }
}

fn values_match(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_match(x, y))
        },
        (Value::Object(x), Value::Object(y)) => {
            let keys = x.keys().chain(y.keys());
            keys.into_iter().all(|k| {
                let x = x.get(k).unwrap_or(&Value::Null);
                let y = y.get(k).unwrap_or(&Value::Null);
                (is_empty(x) && is_empty(y)) || values_match(x, y)
            })
        },
        _ => a == b,
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan result indicates the resource will be created.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(
        !plan.requires_replace,
        "Expected plan to create, not replace"
    );
}

/// Assert that a plan result indicates no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan result indicates changes are needed.
///
/// # Panics
///
/// Panics if the plan has no changes.
pub fn assert_plan_has_changes(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes, but got no changes"
    );
}

/// Assert that a plan requires resource replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan does not require resource replacement.
///
/// # Panics
///
/// Panics if the plan requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan has a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        has_change,
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan does not have a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan has a change for the given path.
pub fn assert_plan_does_not_change_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        !has_change,
        "Expected plan to not change attribute '{}', but it was changed",
        path
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain at least one error.
///
/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    let has_errors = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error));

    assert!(has_errors, "Expected at least one error, but got none");
}

/// Assert that diagnostics contain an error with the given summary substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error) && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use crate::provider::SysdigProvider;
    use serde_json::json;

    fn tester() -> ProviderTester<SysdigProvider> {
        ProviderTester::new(SysdigProvider::with_api(Arc::new(FakeBackend::new())))
    }

    #[tokio::test]
    async fn test_tester_resource_types() {
        let types = tester().resource_types();
        assert!(types.contains(&"sysdig_secure_list".to_string()));
        assert!(types.contains(&"sysdig_monitor_team".to_string()));
    }

    #[tokio::test]
    async fn test_tester_plan_create() {
        let plan = tester()
            .plan_create("sysdig_secure_macro", json!({"name": "m", "condition": "evt.type = open"}))
            .await
            .unwrap();

        assert_plan_creates(&plan);
        assert_plan_changes_attribute(&plan, "condition");
        assert_eq!(plan.planned_state["append"], false);
    }

    #[tokio::test]
    async fn test_tester_plan_update() {
        let tester = tester();
        let prior = json!({"id": "7", "name": "m", "condition": "a", "append": false, "version": 1});

        let plan = tester
            .plan_update("sysdig_secure_macro", prior.clone(), json!({"name": "m", "condition": "b"}))
            .await
            .unwrap();
        assert_plan_changes_attribute(&plan, "condition");
        assert_plan_updates_in_place(&plan);
        assert_plan_does_not_change_attribute(&plan, "version");

        let plan = tester
            .plan_update("sysdig_secure_macro", prior.clone(), json!({"name": "m2", "condition": "a"}))
            .await
            .unwrap();
        assert_plan_replaces(&plan);

        let plan = tester
            .plan_update("sysdig_secure_macro", prior, json!({"name": "m", "condition": "a"}))
            .await
            .unwrap();
        assert_plan_no_changes(&plan);
    }

    #[tokio::test]
    async fn test_tester_lifecycle_crud() {
        let state = tester()
            .lifecycle_crud(
                "sysdig_secure_macro",
                json!({"name": "m", "condition": "evt.type = open"}),
                json!({"name": "m", "condition": "evt.type = openat"}),
            )
            .await
            .unwrap();

        assert_state_attr(&state, "condition", json!("evt.type = openat"));
        assert_state_attr(&state, "version", json!(2));
    }

    #[tokio::test]
    async fn test_configure_reports_diagnostics() {
        let err = tester()
            .configure(json!({"sysdig_secure_url": "not a url", "sysdig_secure_api_token": "t"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid URL for sysdig_secure_url"));
    }

    #[test]
    fn test_state_attr_paths() {
        let state = json!({
            "name": "z",
            "labels": {"env": "prod"},
            "scope": [{"target_type": "aws", "expression": []}],
            "description": null
        });
        assert_eq!(state_attr(&state, "scope.#"), Some(json!(1)));
        assert_eq!(state_attr(&state, "scope.0.target_type"), Some(json!("aws")));
        assert_eq!(state_attr(&state, "scope.0.expression.#"), Some(json!(0)));
        assert_eq!(state_attr(&state, "labels.%"), Some(json!(1)));
        assert_eq!(state_attr(&state, "labels.env"), Some(json!("prod")));
        assert_eq!(state_attr(&state, "missing.#"), Some(json!(0)));
        assert_eq!(state_attr(&state, "description"), None);
        assert_eq!(state_attr(&state, "scope.3.target_type"), None);
        assert_state_attr_unset(&state, "description");
        assert_state_attr_unset(&state, "scope.0.expression");
    }

    #[test]
    fn test_import_state_verify() {
        let created = json!({"id": "1", "name": "a", "threshold": 5, "tags": [], "send_test_notification": true});
        let imported = json!({"id": "1", "name": "a", "threshold": 5.0, "tags": null});
        assert_import_state_verify(&created, &imported, &["send_test_notification"]);
    }

    #[test]
    #[should_panic(expected = "name: created")]
    fn test_import_state_verify_mismatch() {
        assert_import_state_verify(&json!({"name": "a"}), &json!({"name": "b"}), &[]);
    }

    #[test]
    fn test_precheck_env() {
        let env: BTreeMap<String, String> =
            [("SYSDIG_SECURE_API_TOKEN".to_string(), "t".to_string())].into_iter().collect();
        assert!(precheck_env_with(&env, &["SYSDIG_SECURE_API_TOKEN"]));
        assert!(!precheck_env_with(&env, &["SYSDIG_SECURE_API_TOKEN", "SYSDIG_MONITOR_API_TOKEN"]));
    }

    #[test]
    fn test_assert_no_errors() {
        let diagnostics = vec![Diagnostic::warning("Just a warning")];
        assert_no_errors(&diagnostics);
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_fails() {
        let diagnostics = vec![Diagnostic::error("An error")];
        assert_no_errors(&diagnostics);
    }

    #[test]
    fn test_assert_error_contains() {
        let diagnostics = vec![Diagnostic::error("\"rules\" cannot be used together with \"expression\"")];
        assert_has_errors(&diagnostics);
        assert_error_contains(&diagnostics, "cannot be used together with");
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![
            Diagnostic::error("First error").with_attribute("field1"),
            Diagnostic::error("Second error").with_detail("More info"),
        ]);

        let display = format!("{}", err);
        assert!(display.contains("First error"));
        assert!(display.contains("Second error"));
        assert!(display.contains("field1"));
        assert!(display.contains("More info"));
    }
}
