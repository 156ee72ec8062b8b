//! Registry of event types known to this node.
//!
//! Event types arrive from the administrative surface; the registry enforces the
//! definition invariants once, at registration, so the per-event pipeline can trust
//! them. Live-reloadable: readers always see the current list.

use crate::core::{EventType, EVENT_UUID_FIELD};
use std::fmt;
use std::sync::{Arc, RwLock};

#[derive(Debug)]
pub enum EventTypeError {
    NotFound(String),
    AlreadyExists(String),
    InvalidDefinition(String),
}

impl fmt::Display for EventTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTypeError::NotFound(name) => write!(f, "EventType not found: {}", name),
            EventTypeError::AlreadyExists(name) => {
                write!(f, "Existing EventType found with same name: {}", name)
            }
            EventTypeError::InvalidDefinition(msg) => {
                write!(f, "Invalid EventType definition: {}", msg)
            }
        }
    }
}

impl std::error::Error for EventTypeError {}

#[derive(Clone)]
pub struct EventTypeRegistry {
    types: Arc<RwLock<Vec<EventType>>>,
}

impl EventTypeRegistry {
    pub fn new() -> Self {
        EventTypeRegistry { types: Arc::new(RwLock::new(Vec::new())) }
    }

    /// Register a new event type, enforcing the definition invariants:
    /// unique name (case-insensitive), and when `minimize` is set, a minimal mapping
    /// document carrying the UUID placeholder in both mapping documents.
    pub fn register(&self, event_type: EventType) -> Result<(), EventTypeError> {
        check_definition(&event_type)?;
        let mut types = self.types.write().unwrap();
        if types.iter().any(|t| t.name.eq_ignore_ascii_case(&event_type.name)) {
            return Err(EventTypeError::AlreadyExists(event_type.name));
        }
        types.push(event_type);
        Ok(())
    }

    /// Replace an existing event type definition. The same invariants apply.
    pub fn update(&self, event_type: EventType) -> Result<(), EventTypeError> {
        check_definition(&event_type)?;
        let mut types = self.types.write().unwrap();
        match types.iter_mut().find(|t| t.name == event_type.name) {
            Some(existing) => {
                *existing = event_type;
                Ok(())
            }
            None => Err(EventTypeError::NotFound(event_type.name)),
        }
    }

    pub fn remove(&self, name: &str) -> Result<(), EventTypeError> {
        let mut types = self.types.write().unwrap();
        let before = types.len();
        types.retain(|t| t.name != name);
        if types.len() == before {
            return Err(EventTypeError::NotFound(name.to_string()));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<EventType> {
        self.types.read().unwrap().iter().find(|t| t.name == name).cloned()
    }

    pub fn list(&self) -> Vec<EventType> {
        self.types.read().unwrap().clone()
    }

    /// Shape documents of every registered type, the union the enricher validates against.
    pub fn shape_docs(&self) -> Vec<String> {
        self.types.read().unwrap().iter().filter_map(|t| t.shape.clone()).collect()
    }
}

fn check_definition(event_type: &EventType) -> Result<(), EventTypeError> {
    if event_type.name.trim().is_empty() {
        return Err(EventTypeError::InvalidDefinition("EventType name must not be empty".into()));
    }
    if event_type.minimize {
        let minimal = event_type.minimal_mapping.as_deref().ok_or_else(|| {
            EventTypeError::InvalidDefinition(
                "EventType requires a minimal mapping document if minimize is set".into(),
            )
        })?;
        if !event_type.mapping.contains(EVENT_UUID_FIELD) || !minimal.contains(EVENT_UUID_FIELD) {
            return Err(EventTypeError::InvalidDefinition(
                "EventType requires the UUID placeholder in both mapping documents if minimize is enabled"
                    .into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_type(name: &str) -> EventType {
        EventType::new(name, r#"{"entities":[]}"#)
    }

    #[test]
    fn duplicate_names_rejected_case_insensitive() {
        let registry = EventTypeRegistry::new();
        registry.register(minimal_type("federated.Arrival")).unwrap();
        let err = registry.register(minimal_type("federated.arrival")).unwrap_err();
        assert!(matches!(err, EventTypeError::AlreadyExists(_)));
    }

    #[test]
    fn minimize_requires_minimal_mapping_with_placeholder() {
        let registry = EventTypeRegistry::new();
        let mut t = minimal_type("federated.load");
        t.minimize = true;
        assert!(matches!(
            registry.register(t.clone()),
            Err(EventTypeError::InvalidDefinition(_))
        ));

        t.minimal_mapping = Some(r#"{"entities":[]}"#.to_string());
        // Neither document references the UUID placeholder yet.
        assert!(matches!(
            registry.register(t.clone()),
            Err(EventTypeError::InvalidDefinition(_))
        ));

        t.mapping = r#"{"entities":[{"node":"_:0","properties":[{"field":"UUID","predicate":"http://ex/id"}]}]}"#.to_string();
        t.minimal_mapping = Some(t.mapping.clone());
        assert!(registry.register(t).is_ok());
    }

    #[test]
    fn update_replaces_and_remove_deletes() {
        let registry = EventTypeRegistry::new();
        registry.register(minimal_type("federated.discharge")).unwrap();

        let mut updated = minimal_type("federated.discharge");
        updated.retention_days = Some(7);
        registry.update(updated).unwrap();
        assert_eq!(registry.get("federated.discharge").unwrap().retention_days, Some(7));

        registry.remove("federated.discharge").unwrap();
        assert!(registry.get("federated.discharge").is_none());
        assert!(matches!(
            registry.remove("federated.discharge"),
            Err(EventTypeError::NotFound(_))
        ));
    }
}
