//! Test Data Factory
//!
//! Builds ontologies for the end-to-end tests:
//! - The minimal Animal/Dog/R1 submission
//! - Generated ontologies of a configurable shape
//! - Request bodies in the shapes the UI and scripts send

use clairvoyance_core::{Ontology, Subclass, Superclass};
use serde_json::{Value, json};

/// Factory for ontology test data
pub struct OntologyFactory;

/// Shape of a generated ontology
#[derive(Debug, Clone)]
pub struct ShapeConfig {
    pub superclasses: usize,
    pub subclasses_per_superclass: usize,
    pub rules: usize,
    /// Attach attributes and relationships to every class
    pub with_details: bool,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            superclasses: 3,
            subclasses_per_superclass: 2,
            rules: 4,
            with_details: false,
        }
    }
}

impl OntologyFactory {
    /// One superclass "Animal" with subclass "Dog" and rule "R1"
    pub fn animals() -> Ontology {
        Ontology {
            superclasses: vec![Superclass {
                name: "Animal".to_string(),
                subclasses: vec![Subclass {
                    name: "Dog".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            rules: vec!["R1".to_string()],
        }
    }

    /// Generated ontology with predictable names ("Class 0", "Class 0.1", "Rule 2")
    pub fn with_shape(config: &ShapeConfig) -> Ontology {
        let details = |name: &str| {
            if config.with_details {
                (
                    vec![json!({ "name": "label", "type": "string", "owner": name })],
                    vec![json!({ "type": "relatedTo", "target": "Class 0" })],
                )
            } else {
                (Vec::new(), Vec::new())
            }
        };

        let superclasses = (0..config.superclasses)
            .map(|i| {
                let name = format!("Class {}", i);
                let (attributes, relationships) = details(&name);
                Superclass {
                    id: None,
                    description: Some(format!("Generated superclass {}", i)),
                    attributes,
                    relationships,
                    subclasses: (0..config.subclasses_per_superclass)
                        .map(|j| {
                            let sub_name = format!("Class {}.{}", i, j);
                            let (attributes, relationships) = details(&sub_name);
                            Subclass {
                                id: None,
                                name: sub_name,
                                description: None,
                                attributes,
                                relationships,
                            }
                        })
                        .collect(),
                    name,
                }
            })
            .collect();

        Ontology {
            superclasses,
            rules: (0..config.rules).map(|k| format!("Rule {}", k)).collect(),
        }
    }

    /// Copy of `ontology` without store-assigned ids, for comparing with input
    pub fn strip_ids(ontology: &Ontology) -> Ontology {
        let mut stripped = ontology.clone();
        for superclass in &mut stripped.superclasses {
            superclass.id = None;
            for subclass in &mut superclass.subclasses {
                subclass.id = None;
            }
        }
        stripped
    }

    /// Body the UI posts: the ontology wrapped in an `ontology` key
    pub fn ui_payload(ontology: &Ontology) -> Value {
        json!({ "ontology": ontology })
    }

    /// Body scripts post: the bare ontology
    pub fn bare_payload(ontology: &Ontology) -> Value {
        serde_json::to_value(ontology).unwrap_or(Value::Null)
    }
}
