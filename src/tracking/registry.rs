//! Registry of entity kinds enabled for tracking.

use super::entity::Trackable;
use super::observed::Observed;
use crate::error::{EngineError, Result};
use crate::signatures::SignatureCatalog;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Bookkeeping fields never diffed regardless of profile.
const ALWAYS_EXCLUDED: &[&str] = &["stream", "dashboard", "modified"];

/// Per-kind tracking settings.
#[derive(Clone, Debug)]
pub struct TrackingProfile {
    kind: String,
    excluded: BTreeSet<String>,
    labels: HashMap<String, String>,
}

impl TrackingProfile {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            excluded: ALWAYS_EXCLUDED.iter().map(|f| f.to_string()).collect(),
            labels: HashMap::new(),
        }
    }

    /// Exclude a field from diffs.
    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.excluded.insert(field.into());
        self
    }

    /// Human label used as the diff key for a field.
    pub fn label(mut self, field: impl Into<String>, label: impl Into<String>) -> Self {
        self.labels.insert(field.into(), label.into());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn excludes(&self, field: &str) -> bool {
        self.excluded.contains(field)
    }

    /// Explicit label, or the field name with underscores as spaces.
    pub fn label_for(&self, field: &str) -> String {
        match self.labels.get(field) {
            Some(label) => label.clone(),
            None => field.replace('_', " "),
        }
    }

    pub fn created_signature(&self) -> String {
        format!("{}-created", self.kind)
    }

    pub fn changed_signature(&self) -> String {
        format!("{}-changed", self.kind)
    }

    pub fn deleted_signature(&self) -> String {
        format!("{}-deleted", self.kind)
    }
}

/// Registry of tracked kinds, populated once at start-up.
pub struct TrackingRegistry {
    profiles: RwLock<HashMap<String, Arc<TrackingProfile>>>,
    signatures: Arc<SignatureCatalog>,
}

impl TrackingRegistry {
    pub fn new(signatures: Arc<SignatureCatalog>) -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
            signatures,
        }
    }

    /// Enable tracking for a kind and register its lifecycle signatures.
    ///
    /// Enabling a kind again replaces its profile.
    pub fn enable(&self, profile: TrackingProfile) {
        let title = capitalize(&profile.kind.replace(['_', '-'], " "));
        self.signatures
            .register(profile.created_signature(), format!("{} created", title));
        self.signatures
            .register(profile.changed_signature(), format!("{} changed", title));
        self.signatures
            .register(profile.deleted_signature(), format!("{} deleted", title));

        tracing::debug!(kind = %profile.kind, "tracking enabled");
        self.profiles
            .write()
            .insert(profile.kind.clone(), Arc::new(profile));
    }

    pub fn is_enabled(&self, kind: &str) -> bool {
        self.profiles.read().contains_key(kind)
    }

    /// Profile for a kind.
    pub fn profile(&self, kind: &str) -> Result<Arc<TrackingProfile>> {
        self.profiles
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| EngineError::KindNotTracked(kind.to_string()))
    }

    /// Wrap an entity in a change tracker.
    pub fn attach<E: Trackable>(&self, entity: E) -> Result<Observed<E>> {
        let profile = self.profile(entity.kind())?;
        Ok(Observed::new(entity, profile))
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<_> = self.profiles.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Invoice {
        id: Option<u64>,
    }

    impl Trackable for Invoice {
        fn kind(&self) -> &str {
            "sales_invoice"
        }

        fn entity_id(&self) -> Option<u64> {
            self.id
        }

        fn display_name(&self) -> String {
            "INV".into()
        }
    }

    #[test]
    fn test_enable_registers_signatures() {
        let catalog = Arc::new(SignatureCatalog::new());
        let registry = TrackingRegistry::new(Arc::clone(&catalog));
        registry.enable(TrackingProfile::new("sales_invoice"));

        assert!(registry.is_enabled("sales_invoice"));
        registry.enable(TrackingProfile::new("ticket"));
        registry.enable(TrackingProfile::new("sales_invoice").exclude("notes"));
        assert_eq!(registry.kinds(), vec!["sales_invoice".to_string(), "ticket".to_string()]);
        let sig = catalog.get("sales_invoice-changed").unwrap();
        assert_eq!(sig.title, "Sales invoice changed");
    }

    #[test]
    fn test_attach_unknown_kind_fails() {
        let registry = TrackingRegistry::new(Arc::new(SignatureCatalog::new()));
        let result = registry.attach(Invoice { id: Some(1) });
        assert!(matches!(result, Err(EngineError::KindNotTracked(k)) if k == "sales_invoice"));
    }

    #[test]
    fn test_default_exclusions_and_labels() {
        let profile = TrackingProfile::new("ticket").exclude("secret");
        assert!(profile.excludes("stream"));
        assert!(profile.excludes("dashboard"));
        assert!(profile.excludes("secret"));
        assert!(!profile.excludes("status"));
        assert_eq!(profile.label_for("due_date"), "due date");
    }
}
